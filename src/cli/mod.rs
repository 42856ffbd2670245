//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, wires up configuration,
//! credentials, and tracing, and dispatches to the chat UI or a one-shot
//! subcommand.

pub mod say;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::auth::AuthManager;
use crate::core::app::App;
use crate::core::chat_stream::OpenAiBackend;
use crate::core::config::{Config, ConfigKey, ResolvedSettings};
use crate::core::session::{SessionAdapter, SessionSettings};
use crate::ui::chat_loop::run_chat;
use crate::utils::logging::{init_tracing, LoggingState, TracingTarget};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "gramfix")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "A terminal grammar tutor backed by an LLM chat API")]
#[command(
    long_about = "gramfix is a full-screen terminal chat that checks the grammar of English \
sentences. Each sentence you send is forwarded to an OpenAI-compatible chat API and the \
corrected version streams back as it is generated.\n\n\
Authentication:\n\
  Use 'gramfix auth' to store an API key in your system keyring.\n\n\
Environment Variables:\n\
  GRAMFIX_API_KEY   API key (takes precedence over the keyring)\n\
  OPENAI_API_KEY    Fallback API key\n\
  GRAMFIX_BASE_URL  Custom API base URL (defaults to https://api.openai.com/v1)\n\
  GRAMFIX_LOG       Diagnostic log filter (e.g. gramfix=debug)\n\n\
Controls:\n\
  Enter             Send the sentence\n\
  Up/Down/PgUp/PgDn Scroll through the conversation\n\
  Ctrl+N            Start a new conversation (asks for confirmation)\n\
  Ctrl+C            Quit the application"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for corrections
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Append the conversation transcript to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,

    /// Only read the API key from environment variables, never the keyring
    #[arg(long, global = true)]
    pub env_only: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Check a single sentence without the full-screen interface
    Say {
        /// Sentence to check
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Store the API key in the system keyring
    Auth,
    /// Remove the API key from the system keyring
    Deauth,
    /// Set a configuration value (model, base-url, greeting)
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            if let Some(path) = Config::diagnostics_log_path() {
                init_tracing(TracingTarget::File(path), "gramfix=info");
            }
            info!("gramfix v{} starting", env!("CARGO_PKG_VERSION"));

            let config = load_config_or_default();
            let settings = resolve_settings(&config, &args.model, &args.base_url);
            let logging = LoggingState::new(args.log)?;
            let adapter = build_adapter(&settings, args.env_only)?;
            let app = App::new(adapter, &settings.greeting, Some(logging));
            run_chat(app).await
        }
        Commands::Say { prompt } => {
            init_tracing(TracingTarget::Stderr, "gramfix=warn");
            let config = load_config_or_default();
            let settings = resolve_settings(&config, &args.model, &args.base_url);
            let adapter = build_adapter(&settings, args.env_only)?;
            say::run_say(prompt, adapter).await
        }
        Commands::Auth => {
            let auth_manager = AuthManager::new();
            if let Err(e) = auth_manager.interactive_auth() {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deauth => {
            let auth_manager = AuthManager::new();
            if let Err(e) = auth_manager.interactive_deauth() {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let Some(key) = key else {
                config.print_all();
                return Ok(());
            };
            let Some(config_key) = ConfigKey::parse(&key) else {
                eprintln!("❌ Unknown config key: {key}");
                std::process::exit(1);
            };
            if value.is_empty() {
                config.print_all();
                return Ok(());
            }
            let value = value.join(" ");
            if let Err(e) = config.set(config_key, &value) {
                eprintln!("❌ {e}");
                std::process::exit(1);
            }
            config.save()?;
            println!("✅ Set {} to: {}", config_key.as_str(), value.trim());
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            let Some(config_key) = ConfigKey::parse(&key) else {
                eprintln!("❌ Unknown config key: {key}");
                std::process::exit(1);
            };
            config.unset(config_key);
            config.save()?;
            println!("✅ Unset {}", config_key.as_str());
            Ok(())
        }
    }
}

/// Load the config file, falling back to defaults when it is unreadable.
fn load_config_or_default() -> Config {
    Config::load().unwrap_or_else(|err| {
        warn!(error = %err, "failed to load config, using defaults");
        Config::default()
    })
}

fn resolve_settings(
    config: &Config,
    model: &Option<String>,
    base_url: &Option<String>,
) -> ResolvedSettings {
    config.resolve(model.as_deref(), base_url.as_deref(), |var| {
        std::env::var(var).ok()
    })
}

/// Build the session adapter for the resolved settings.
///
/// A missing API key is not an error here; turns fail later with a
/// configuration message instead.
fn build_adapter(
    settings: &ResolvedSettings,
    env_only: bool,
) -> Result<SessionAdapter, Box<dyn Error>> {
    let auth_manager = AuthManager::new_with_keyring(!env_only);
    let credential = auth_manager.resolve_credential();
    match &credential {
        Some(credential) => info!(source = %credential.source, "API key resolved"),
        None => info!("no API key configured"),
    }

    let client = reqwest::Client::builder().build()?;
    let backend = OpenAiBackend::new(client, settings.base_url.clone());
    Ok(SessionAdapter::new(
        Arc::new(backend),
        credential.map(|c| c.api_key),
        SessionSettings::with_model(settings.model.clone()),
    ))
}
