//! Channel relay operator tool
//!
//! Provisions relay identities and drives the backend gateway by hand.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use chanrelay_backend::BackendClient;
use chanrelay_core::{parse_client_message, AuthInfo, FrameKind};
use chanrelay_logging::LogLevel;
use chanrelay_settings::{generate_bootstrap_config, Settings};

/// Channel relay - encrypted backend gateway tooling
#[derive(Parser)]
#[command(name = "chanrelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Relay configuration file
    #[arg(long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a relay identity and write a new configuration file
    Keygen {
        /// Where to write the configuration
        output: PathBuf,

        /// Numeric id the backend knows this relay by
        server_id: String,

        /// Backend public key (standard base64)
        #[arg(default_value = "")]
        backend_public_key: String,
    },

    /// Parse a client message envelope and print it
    Parse {
        /// Raw message, e.g. `12 sub "room.alice"`
        line: String,

        /// Treat the input as a binary frame
        #[arg(long)]
        binary: bool,
    },

    #[command(flatten)]
    Backend(BackendCommand),
}

/// Commands that talk to the backend
#[derive(Subcommand)]
enum BackendCommand {
    /// Run a remote command on the backend
    Call {
        /// Command name
        command: String,

        /// Opaque payload forwarded as clientData
        #[arg(default_value = "")]
        payload: String,

        /// Username the command is issued for
        #[arg(short, long, default_value = "")]
        username: String,

        /// Mark the username as validated
        #[arg(short, long)]
        authenticated: bool,

        /// Answer from the response cache when possible
        #[arg(long)]
        cached: bool,
    },

    /// Notify the backend about topic subscriptions
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Submit aggregated statistics (key=value pairs)
    Stats {
        #[arg(required = true, value_parser = parse_stat_field)]
        fields: Vec<(String, String)>,
    },

    /// Tell the backend this relay has started
    Announce,
}

#[derive(Subcommand)]
enum TopicAction {
    /// A topic gained its first subscriber
    Add { topic: String },
    /// Topics lost their last subscriber
    Cleanup {
        #[arg(required = true)]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chanrelay_logging::init(LogLevel::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Keygen {
            output,
            server_id,
            backend_public_key,
        } => {
            keygen(&output, &server_id, &backend_public_key);
        }
        Commands::Parse { line, binary } => {
            parse(&line, binary)?;
        }
        Commands::Backend(command) => {
            let client = connect(&cli.config)?;
            run_backend_command(&client, command).await?;
            print_health(&client)?;
        }
    }

    Ok(())
}

// ============================================================================
// Provisioning
// ============================================================================

fn keygen(output: &Path, server_id: &str, backend_public_key: &str) {
    let settings = generate_bootstrap_config(output, server_id, backend_public_key);

    println!("Relay identity written to {}", output.display());
    println!("Server id:  {}", settings.server_id);
    println!("Public key: {}", settings.our_public_key);
    if settings.backend_public_key.is_empty() {
        println!("Backend public key not set; add it before starting the relay");
    }
}

fn parse(line: &str, binary: bool) -> Result<()> {
    let frame = if binary {
        FrameKind::Binary
    } else {
        FrameKind::Text
    };
    let message = parse_client_message(line.as_bytes(), frame)
        .with_context(|| format!("Invalid message: {}", line))?;

    println!("Message id: {}", message.message_id);
    println!("Command:    {}", message.command);
    match message.arguments.to_json() {
        Some(args) => println!("Arguments:  {}", args),
        None => println!("Arguments:  (none)"),
    }
    println!("Wire:       {}", message.to_wire());
    Ok(())
}

// ============================================================================
// Backend Commands
// ============================================================================

fn connect(config: &Path) -> Result<BackendClient> {
    let settings = Settings::load_from(config)
        .with_context(|| format!("Failed to load configuration from {}", config.display()))?;
    info!("Using backend at {}", settings.backend_url);

    BackendClient::from_settings(&settings).context("Failed to create backend client")
}

async fn run_backend_command(client: &BackendClient, command: BackendCommand) -> Result<()> {
    match command {
        BackendCommand::Call {
            command,
            payload,
            username,
            authenticated,
            cached,
        } => {
            let auth = AuthInfo {
                username,
                username_validated: authenticated,
            };
            let response = if cached {
                client
                    .send_remote_command_cached(&command, &payload, &auth)
                    .await
            } else {
                client.send_remote_command(&command, &payload, &auth).await
            };

            match response {
                Ok(body) => println!("{}", body),
                Err(e) if e.requires_authentication() => {
                    bail!("Backend requires an authenticated username for '{}'", command)
                }
                Err(e) => return Err(e).context(format!("Command '{}' failed", command)),
            }
        }
        BackendCommand::Topic { action } => match action {
            TopicAction::Add { topic } => {
                client
                    .send_new_topic_notice(&topic)
                    .await
                    .context("Topic notice failed")?;
                println!("Announced topic {}", topic);
            }
            TopicAction::Cleanup { topics } => {
                client
                    .send_cleanup_topics_notice(&topics)
                    .await
                    .context("Topic cleanup notice failed")?;
                println!("Released {} topic(s)", topics.len());
            }
        },
        BackendCommand::Stats { fields } => {
            client
                .send_aggregated_data(fields)
                .await
                .context("Submitting statistics failed")?;
            println!("Statistics submitted");
        }
        BackendCommand::Announce => {
            client
                .announce_startup()
                .await
                .context("Startup announcement failed")?;
            println!("Startup announced");
        }
    }
    Ok(())
}

fn print_health(client: &BackendClient) -> Result<()> {
    let snapshot = client.health().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Parse a `key=value` statistics field
fn parse_stat_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_keygen_without_backend_key() {
        let cli = Cli::try_parse_from(["chanrelay", "keygen", "relay.json", "4"]).unwrap();
        match cli.command {
            Commands::Keygen {
                output,
                server_id,
                backend_public_key,
            } => {
                assert_eq!(output, PathBuf::from("relay.json"));
                assert_eq!(server_id, "4");
                assert!(backend_public_key.is_empty());
            }
            _ => panic!("expected keygen"),
        }
    }

    #[test]
    fn test_call_with_flags() {
        let cli = Cli::try_parse_from([
            "chanrelay",
            "--config",
            "/etc/chanrelay.json",
            "call",
            "get_link",
            "\"room.alice\"",
            "-u",
            "alice",
            "--authenticated",
            "--cached",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/chanrelay.json"));
        match cli.command {
            Commands::Backend(BackendCommand::Call {
                command,
                payload,
                username,
                authenticated,
                cached,
            }) => {
                assert_eq!(command, "get_link");
                assert_eq!(payload, "\"room.alice\"");
                assert_eq!(username, "alice");
                assert!(authenticated);
                assert!(cached);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["chanrelay", "announce"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_keygen_and_parse_stay_local() {
        let cli = Cli::try_parse_from(["chanrelay", "parse", "5 ping"]).unwrap();
        assert!(matches!(cli.command, Commands::Parse { .. }));

        let cli = Cli::try_parse_from(["chanrelay", "announce"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backend(BackendCommand::Announce)
        ));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["chanrelay", "-vv", "announce"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_topic_cleanup_many() {
        let cli =
            Cli::try_parse_from(["chanrelay", "topic", "cleanup", "room.alice", "room.bob"])
                .unwrap();
        match cli.command {
            Commands::Backend(BackendCommand::Topic {
                action: TopicAction::Cleanup { topics },
            }) => assert_eq!(topics, vec!["room.alice", "room.bob"]),
            _ => panic!("expected topic cleanup"),
        }
    }

    #[test]
    fn test_stats_fields() {
        let cli =
            Cli::try_parse_from(["chanrelay", "stats", "follows=12", "emotes={\"a\":1}"]).unwrap();
        match cli.command {
            Commands::Backend(BackendCommand::Stats { fields }) => {
                assert_eq!(
                    fields,
                    vec![
                        ("follows".to_string(), "12".to_string()),
                        ("emotes".to_string(), "{\"a\":1}".to_string()),
                    ]
                );
            }
            _ => panic!("expected stats"),
        }
    }

    #[test]
    fn test_parse_stat_field() {
        assert_eq!(
            parse_stat_field("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_stat_field("empty=").unwrap().1, "");
    }

    #[test]
    fn test_parse_text_message() {
        assert!(parse("12 sub \"room.alice\"", false).is_ok());
    }

    #[test]
    fn test_connect_with_generated_config() {
        let dir = tempfile::tempdir().unwrap();
        let backend_path = dir.path().join("backend.json");
        let backend =
            chanrelay_settings::try_generate_bootstrap_config(&backend_path, "1", "").unwrap();
        let path = dir.path().join("config.json");
        chanrelay_settings::try_generate_bootstrap_config(&path, "3", &backend.our_public_key)
            .unwrap();

        let client = connect(&path).unwrap();
        assert_eq!(client.config().server_id, 3);
    }

    // ==================== NEGATIVE TESTS ====================

    #[test]
    fn test_stats_requires_fields() {
        assert!(Cli::try_parse_from(["chanrelay", "stats"]).is_err());
    }

    #[test]
    fn test_stats_rejects_missing_equals() {
        assert!(Cli::try_parse_from(["chanrelay", "stats", "follows"]).is_err());
        assert!(parse_stat_field("=12").is_err());
    }

    #[test]
    fn test_topic_cleanup_requires_topics() {
        assert!(Cli::try_parse_from(["chanrelay", "topic", "cleanup"]).is_err());
    }

    #[test]
    fn test_parse_binary_frame_rejected() {
        assert!(parse("12 sub \"room.alice\"", true).is_err());
    }

    #[test]
    fn test_parse_malformed_message() {
        assert!(parse("nospace", false).is_err());
        assert!(parse("0 sub", false).is_err());
    }

    #[test]
    fn test_connect_without_backend_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        chanrelay_settings::try_generate_bootstrap_config(&path, "3", "").unwrap();

        assert!(connect(&path).is_err());
    }

    #[test]
    fn test_connect_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(connect(&dir.path().join("absent.json")).is_err());
    }
}
