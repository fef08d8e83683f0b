use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use voxrelay_core::config::Config;
use voxrelay_core::retry::RetryPolicy;
use voxrelay_gateway::GatewayState;
use voxrelay_media::google_tts::GoogleTtsSynthesizer;
use voxrelay_providers::google::GeminiGenerator;

mod logging;
mod talk;

#[derive(Parser)]
#[command(
    name = "voxrelay",
    about = "Real-time voice conversation relay: streamed text generation spoken back sentence by sentence",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the conversation gateway
    Serve {
        /// Port to listen on (default: 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Talk to a running gateway from the terminal, one line per utterance
    Talk {
        /// Standing instruction for the conversation
        #[arg(short, long)]
        prompt: String,

        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },

    /// Show effective settings
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check configuration and credentials
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets masked)
    Show,
    /// Write a default config file if none exists
    Init,
}

/// Copy of `config` with inline secrets masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("********".into());
        }
    };
    if let Some(generator) = config.generator.as_mut() {
        mask(&mut generator.api_key);
    }
    if let Some(tts) = config.tts.as_mut() {
        mask(&mut tts.api_key);
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env is normal; anything else is worth reporting once logging is up
    let dotenv = dotenvy::dotenv();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_dir);

    let config = Config::load(&config_path)?;
    logging::init(&config.logging(), cli.verbose);

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(%e, "Failed to load .env"),
    }

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }

            let generator = GeminiGenerator::from_config(config.generator())?;
            let synthesizer = GoogleTtsSynthesizer::from_config(&config.tts())?;
            tracing::info!(
                model = %config.generator().model,
                voice = %config.tts().voice.name,
                "Starting voxrelay gateway on port {port}"
            );

            let state = Arc::new(GatewayState::new(
                Arc::new(config),
                Arc::new(generator),
                Arc::new(synthesizer),
            ));
            voxrelay_gateway::start_gateway(state, port).await?;
        }
        Commands::Talk { prompt, url } => {
            talk::run(&url, &prompt, RetryPolicy::default()).await?;
        }
        Commands::Status => {
            let session = config.session();
            println!("voxrelay v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway: {}:{}", config.gateway_bind(), config.gateway_port());
            println!("Model: {}", config.generator().model);
            println!("Voice: {}", config.tts().voice.name);
            println!("Idle timeout: {}s", session.idle_timeout_secs);
            println!("Sweep interval: {}s", session.sweep_interval_secs);
            println!("Heartbeat interval: {}s", session.heartbeat_interval_secs);
            println!(
                "Audio frames: {} bytes, {}ms apart",
                session.chunk_size, session.chunk_pacing_ms
            );
        }
        Commands::Doctor => {
            tracing::info!("Running diagnostics");
            let (warnings, errors) = config.validate();
            let credentials = config.check_credentials();

            println!("Config: {}", config_path.display());
            match &credentials {
                Ok(()) => println!("[ok] credentials"),
                Err(problems) => {
                    for problem in problems {
                        println!("[fail] {problem}");
                    }
                }
            }
            for warning in warnings.iter().filter(|w| {
                credentials
                    .as_ref()
                    .err()
                    .is_none_or(|problems| !problems.contains(*w))
            }) {
                println!("[warn] {warning}");
            }
            for error in &errors {
                println!("[fail] {error}");
            }

            if credentials.is_err() || !errors.is_empty() {
                anyhow::bail!("Diagnostics found problems");
            }
            println!("All checks passed");
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&redacted(&config))?;
                println!("{json}");
            }
            ConfigAction::Init => {
                if config_path.exists() {
                    println!("Config already exists at {}", config_path.display());
                } else {
                    if let Some(parent) = config_path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    Config::default().save(&config_path)?;
                    println!("Wrote default config to {}", config_path.display());
                }
            }
        },
    }

    Ok(())
}
