//! Exam Pal CLI: runs the study assistant HTTP server.

use clap::Parser;
use exampal_core::config::ExamPalConfig;
use exampal_core::gateway::{GatewayState, run};
use exampal_core::{StudyAssistant, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Exam Pal: upload your course materials, get a study plan and a study buddy
#[derive(Parser, Debug)]
#[command(name = "exampal", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory where uploaded materials are stored
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Serve a static frontend from this directory
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Check that the configured Groq API key is accepted
    CheckKey,
}

impl Commands {
    /// Fold command-line flags over the loaded configuration.
    fn apply_overrides(&self, config: &mut ExamPalConfig) {
        if let Commands::Serve {
            host,
            port,
            upload_dir,
            static_dir,
        } = self
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(dir) = upload_dir {
                config.storage.upload_dir = dir.clone();
            }
            if let Some(dir) = static_dir {
                config.server.static_dir = Some(dir.clone());
            }
        }
    }
}

fn log_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(log_filter(cli.verbose));

    // JSON file log next to the other app data
    let log_dir = directories::ProjectDirs::from("dev", "exampal", "exampal")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "exampal.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = load_config(Some(&workspace), cli.config.as_deref())?;
    cli.command.apply_overrides(&mut config);
    for warning in config.validate() {
        warn!("{warning}");
    }

    match cli.command {
        Commands::Serve { .. } => {
            let state = Arc::new(GatewayState::from_config(&config));
            run(state).await?;
        }
        Commands::CheckKey => {
            let assistant = StudyAssistant::from_config(&config);
            let model = assistant.brain().model_name().to_string();
            if !assistant.brain().has_api_key() {
                anyhow::bail!("{} is not set", config.llm.api_key_env);
            }
            if !assistant.is_api_key_valid().await {
                anyhow::bail!("API key was rejected by {} (model {model})", config.llm.base_url);
            }
            info!(model = %model, "API key is valid");
            println!("API key is valid (model {model})");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "exampal",
            "-vv",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--upload-dir",
            "/tmp/materials",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let mut config = ExamPalConfig::default();
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/materials"));
        assert_eq!(config.server.static_dir, None);
    }

    #[test]
    fn test_serve_without_flags_keeps_config() {
        let cli = Cli::try_parse_from(["exampal", "serve"]).unwrap();
        let defaults = ExamPalConfig::default();
        let mut config = defaults.clone();
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.storage.upload_dir, defaults.storage.upload_dir);
    }

    #[test]
    fn test_check_key_with_global_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exampal.toml");
        let cli = Cli::try_parse_from(["exampal", "check-key", "--config", path.to_str().unwrap()])
            .unwrap();
        assert!(matches!(cli.command, Commands::CheckKey));
        assert_eq!(cli.config, Some(path));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["exampal"]).is_err());
        assert!(Cli::try_parse_from(["exampal", "serve", "--port", "not-a-port"]).is_err());
    }
}
