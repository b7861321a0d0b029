//! # CrimeGuard CLI (`cgd`)
//!
//! The `cgd` binary runs the emergency dispatch backend and provides a few
//! operational commands around it.
//!
//! ## Usage
//!
//! ```bash
//! cgd --config ./config/cgd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cgd serve` | Start the HTTP API server |
//! | `cgd classify "<message>"` | Run triage + classification + decision without dispatching |
//! | `cgd check` | Validate configuration and report provider setup |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server
//! cgd serve --config ./config/cgd.toml
//!
//! # Dry-run the decision pipeline on one message
//! cgd classify "help there is a fire and my father is unconscious"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crimeguard::audio::publicly_reachable;
use crimeguard::classifier::create_classifier;
use crimeguard::config::{load_config, Config};
use crimeguard::decision::decide;
use crimeguard::models::{Language, ServiceKind};
use crimeguard::server::run_server;
use crimeguard::triage::{triage, Triage};

/// CrimeGuard — an emergency dispatch backend that classifies chat messages
/// and places calls to emergency services.
#[derive(Parser)]
#[command(
    name = "cgd",
    about = "CrimeGuard — emergency classification and call dispatch backend",
    version,
    long_about = "CrimeGuard classifies inbound chat messages with a hybrid \
    neuro-symbolic pipeline and, when a message describes a severe emergency, \
    places concurrent voice calls to the configured police, fire, and ambulance \
    services, tracking each call until it completes or is cancelled."
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when the file
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/cgd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Serves the chat, cancellation, status, callback, and audio-asset
    /// endpoints until the process is terminated.
    Serve,

    /// Run a message through triage, classification, and the decision
    /// gate without dispatching any call.
    ///
    /// Useful for tuning prompts and inspecting judgments safely.
    Classify {
        /// The message to judge.
        message: String,

        /// Prior conversation turns, oldest first.
        #[arg(long)]
        context: Vec<String>,
    },

    /// Validate the configuration and report provider setup.
    Check,
}

fn load_or_default(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(
            path = %path.display(),
            "no config file found; using built-in defaults"
        );
        Ok(Config {
            server: Default::default(),
            classifier: Default::default(),
            speech: Default::default(),
            telephony: Default::default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await,
        Commands::Classify { message, context } => run_classify(&config, &message, &context).await,
        Commands::Check => run_check(&config),
    }
}

async fn run_classify(config: &Config, message: &str, context: &[String]) -> Result<()> {
    let language = Language::detect(message);
    println!("language: {}", language.code());

    match triage(message) {
        Triage::Smalltalk(kind) => {
            println!("triage: smalltalk ({:?}) — classifier not consulted", kind);
            return Ok(());
        }
        Triage::OffTopic => {
            println!("triage: off-topic — classifier not consulted");
            return Ok(());
        }
        Triage::Escalate => println!("triage: escalate"),
    }

    let classifier = create_classifier(&config.classifier)?;
    let judgment = match classifier.classify(message, context).await {
        Ok(judgment) => judgment,
        Err(e) => {
            println!("classifier failed ({}); fail-safe: non-emergency", e);
            return Ok(());
        }
    };

    println!("is_emergency: {}", judgment.is_emergency);
    println!("severity: {:?}", judgment.severity);
    println!("confidence: {:.2}", judgment.confidence);
    println!("reasoning: {}", judgment.reasoning);

    let intents = decide(&judgment, language);
    if intents.is_empty() {
        println!("decision: no dispatch (conversational path)");
    } else {
        println!("decision: dispatch {} call(s)", intents.len());
        for intent in intents {
            println!(
                "  priority {}: {} -> {}",
                intent.priority,
                intent.service.as_str(),
                config.telephony.number_for(intent.service)
            );
        }
    }
    Ok(())
}

fn run_check(config: &Config) -> Result<()> {
    println!("server");
    println!("  bind: {}", config.server.bind);
    println!("  public_base_url: {}", config.server.public_base_url);
    println!(
        "  hosted audio: {}",
        if publicly_reachable(&config.server.public_base_url) {
            "enabled (base reachable by provider network)"
        } else {
            "disabled (loopback base; provider-native speech will be used)"
        }
    );

    println!("classifier");
    println!("  provider: {}", config.classifier.provider);
    println!("  model: {}", config.classifier.model);
    println!("  timeout: {}s", config.classifier.timeout_secs);

    println!("speech");
    println!("  provider: {}", config.speech.provider);
    println!("  storage_dir: {}", config.speech.storage_dir);

    println!("telephony");
    println!("  provider: {}", config.telephony.provider);
    println!("  caller_number: {}", config.telephony.caller_number);
    for service in ServiceKind::ALL {
        println!(
            "  {}: {}",
            service.as_str(),
            config.telephony.number_for(service)
        );
    }

    println!("ok");
    Ok(())
}
