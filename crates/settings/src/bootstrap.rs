//! One-shot identity and configuration bootstrap
//!
//! Run by an operator when provisioning a new relay. Unlike everything on
//! the request path, [`generate_bootstrap_config`] terminates the process on
//! failure.

use std::path::Path;

use chanrelay_crypto::{decode_key, encode_key, RelayKeypair};
use tracing::{error, info};

use crate::{Result, Settings, SettingsError};

/// Generate a fresh relay key pair from the OS random source
pub fn generate_identity() -> RelayKeypair {
    RelayKeypair::generate()
}

/// Create a configuration document with a new identity and write it to
/// `output` with owner-only permissions.
///
/// `backend_public_key` is standard base64 and may be empty when the
/// backend's key is not known yet.
pub fn try_generate_bootstrap_config(
    output: &Path,
    server_id: &str,
    backend_public_key: &str,
) -> Result<Settings> {
    let server_id: i64 = server_id
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidServerId(server_id.to_string()))?;

    let keypair = generate_identity();
    let mut settings = Settings {
        server_id,
        our_public_key: encode_key(&keypair.public_key_bytes()),
        our_private_key: encode_key(&keypair.secret_key_bytes()),
        ..Default::default()
    };

    let backend_public_key = backend_public_key.trim();
    if !backend_public_key.is_empty() {
        let key = decode_key(backend_public_key).map_err(|source| SettingsError::InvalidKey {
            field: "backend_public_key",
            source,
        })?;
        settings.backend_public_key = encode_key(&key);
    }

    settings.save_to(output)?;
    info!(
        server_id,
        public_key = %settings.our_public_key,
        "Generated relay identity"
    );
    Ok(settings)
}

/// Operator entry point: like [`try_generate_bootstrap_config`], but exits
/// the process with status 1 on any failure.
pub fn generate_bootstrap_config(
    output: &Path,
    server_id: &str,
    backend_public_key: &str,
) -> Settings {
    match try_generate_bootstrap_config(output, server_id, backend_public_key) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            eprintln!("bootstrap failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanrelay_crypto::KEY_LEN;

    #[test]
    fn test_bootstrap_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let backend = RelayKeypair::generate();

        let written =
            try_generate_bootstrap_config(&path, "42", &encode_key(&backend.public_key_bytes()))
                .unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded, written);
        assert_eq!(loaded.server_id, 42);
        assert_eq!(loaded.backend_public_key().unwrap(), backend.public_key_bytes());
        assert_eq!(
            loaded.relay_keypair().unwrap().public_key_bytes().len(),
            KEY_LEN
        );
    }

    #[test]
    fn test_bootstrap_without_backend_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let settings = try_generate_bootstrap_config(&path, "1", "").unwrap();

        assert!(settings.backend_public_key.is_empty());
        assert!(settings.relay_keypair().is_ok());
    }

    #[test]
    fn test_bootstrap_generates_new_identity_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let a = try_generate_bootstrap_config(&dir.path().join("a.json"), "1", "").unwrap();
        let b = try_generate_bootstrap_config(&dir.path().join("b.json"), "1", "").unwrap();
        assert_ne!(a.our_private_key, b.our_private_key);
    }

    #[cfg(unix)]
    #[test]
    fn test_bootstrap_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        try_generate_bootstrap_config(&path, "1", "").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // ==================== NEGATIVE TESTS ====================

    #[test]
    fn test_bootstrap_bad_server_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let result = try_generate_bootstrap_config(&path, "relay-one", "");

        assert!(matches!(result, Err(SettingsError::InvalidServerId(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_bootstrap_bad_backend_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let result = try_generate_bootstrap_config(&path, "1", "AAAA");

        assert!(matches!(
            result,
            Err(SettingsError::InvalidKey { field: "backend_public_key", .. })
        ));
        assert!(!path.exists());
    }
}
