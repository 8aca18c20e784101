//! Configuration document

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chanrelay_crypto::{decode_key, RelayKeypair, KEY_LEN};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, SettingsError};

/// Relay configuration, stored as pretty-printed JSON.
///
/// Keys are standard base64. The file holds the relay's private key and is
/// written readable by the owner only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Plain WebSocket listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// TLS WebSocket listen address
    #[serde(default = "default_ssl_listen_addr")]
    pub ssl_listen_addr: String,

    /// Base URL of the backend RPC endpoints
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Numeric identifier the backend knows this relay by
    #[serde(default)]
    pub server_id: i64,

    #[serde(default)]
    pub our_public_key: String,

    #[serde(default)]
    pub our_private_key: String,

    /// Empty until the backend's key has been configured
    #[serde(default)]
    pub backend_public_key: String,

    /// Per-call HTTP timeout towards the backend
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// How often expired response cache entries are reclaimed
    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    /// Upper bound applied to backend-declared cache durations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cache_ttl_secs: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_ssl_listen_addr() -> String {
    "0.0.0.0:443".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:8002/backend".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    120
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ssl_listen_addr: default_ssl_listen_addr(),
            backend_url: default_backend_url(),
            server_id: 0,
            our_public_key: String::new(),
            our_private_key: String::new(),
            backend_public_key: String::new(),
            request_timeout_secs: default_timeout(),
            cache_sweep_interval_secs: default_sweep_interval(),
            max_cache_ttl_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from a file. A relay cannot run without its keys, so a
    /// missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to a file with owner-only permissions
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = self.to_json()?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(SettingsError::WriteError)?;
        file.write_all(content.as_bytes())
            .map_err(SettingsError::WriteError)?;

        // `mode` only applies on creation; tighten a pre-existing file too
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(SettingsError::WriteError)?;
        }

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Pretty-printed JSON form of the document
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)
    }

    /// The relay's key pair, rebuilt from the stored private key.
    ///
    /// The stored public key must match the private key.
    pub fn relay_keypair(&self) -> Result<RelayKeypair> {
        let secret = required_key(&self.our_private_key, "our_private_key")?;
        let keypair = RelayKeypair::from_secret_bytes(&secret);

        if !self.our_public_key.is_empty() {
            let public = required_key(&self.our_public_key, "our_public_key")?;
            if public != keypair.public_key_bytes() {
                return Err(SettingsError::KeyMismatch);
            }
        }

        Ok(keypair)
    }

    /// The backend's public key
    pub fn backend_public_key(&self) -> Result<[u8; KEY_LEN]> {
        required_key(&self.backend_public_key, "backend_public_key")
    }
}

fn required_key(encoded: &str, field: &'static str) -> Result<[u8; KEY_LEN]> {
    if encoded.is_empty() {
        return Err(SettingsError::MissingKey(field));
    }
    decode_key(encoded).map_err(|source| SettingsError::InvalidKey { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanrelay_crypto::encode_key;

    fn settings_with_keys() -> (Settings, RelayKeypair, RelayKeypair) {
        let relay = RelayKeypair::generate();
        let backend = RelayKeypair::generate();
        let settings = Settings {
            server_id: 3,
            our_public_key: encode_key(&relay.public_key_bytes()),
            our_private_key: encode_key(&relay.secret_key_bytes()),
            backend_public_key: encode_key(&backend.public_key_bytes()),
            ..Default::default()
        };
        (settings, relay, backend)
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.listen_addr, "0.0.0.0:8001");
        assert_eq!(settings.ssl_listen_addr, "0.0.0.0:443");
        assert_eq!(settings.request_timeout_secs, 60);
        assert_eq!(settings.cache_sweep_interval_secs, 120);
        assert!(settings.max_cache_ttl_secs.is_none());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: Settings = serde_json::from_str(r#"{"server_id": 9}"#).unwrap();
        assert_eq!(parsed.server_id, 9);
        assert_eq!(parsed.backend_url, "http://localhost:8002/backend");
        assert_eq!(parsed.request_timeout_secs, 60);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let (settings, _, _) = settings_with_keys();

        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded, settings);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        Settings::default().save_to(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_keys_decode() {
        let (settings, relay, backend) = settings_with_keys();
        assert_eq!(
            settings.relay_keypair().unwrap().public_key_bytes(),
            relay.public_key_bytes()
        );
        assert_eq!(
            settings.backend_public_key().unwrap(),
            backend.public_key_bytes()
        );
    }

    // ==================== NEGATIVE TESTS ====================

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load_from(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SettingsError::ReadError { .. })));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_backend_key() {
        let settings = Settings::default();
        assert!(matches!(
            settings.backend_public_key(),
            Err(SettingsError::MissingKey("backend_public_key"))
        ));
    }

    #[test]
    fn test_short_private_key() {
        let settings = Settings {
            our_private_key: encode_key(&[1u8; 32])[..20].to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.relay_keypair(),
            Err(SettingsError::InvalidKey { field: "our_private_key", .. })
        ));
    }

    #[test]
    fn test_mismatched_public_key() {
        let (mut settings, _, _) = settings_with_keys();
        settings.our_public_key = encode_key(&RelayKeypair::generate().public_key_bytes());
        assert!(matches!(
            settings.relay_keypair(),
            Err(SettingsError::KeyMismatch)
        ));
    }
}
