//! AEON - Local conversational assistant
//!
#![doc = "AEON - Local conversational assistant"]
#![doc = "Main entry point for the AEON application."]

use anyhow::Result;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aeon::cli::{Cli, Commands};
use aeon::commands;
use aeon::config::Config;
use aeon::plugins::PluginRegistry;
use aeon::rag::DefaultRagFactory;
use aeon::storage::ConversationStore;
use aeon::web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(|| "config.yml".to_string());
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command() {
        Commands::Chat => {
            tracing::info!("Starting interactive chat mode");
            // `/restart` re-reads the same file with the same overrides
            let reload = || Config::load(&config_path, &cli);
            commands::chat::run_chat(config, reload).await?;
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.web.bind.clone());
            tracing::info!("Starting HTTP server on {}", bind);
            let state = AppState::new(config, Arc::new(DefaultRagFactory))?;
            state.serve(&bind).await?;
            Ok(())
        }
        Commands::Plugins => {
            let registry =
                PluginRegistry::load(&config.paths.plugins_dir, config.plugins.load.as_deref());
            commands::plugins::list_plugins(&registry)?;
            Ok(())
        }
        Commands::Sessions => {
            let mut store = ConversationStore::new(&config.paths.memory_dir)?;
            commands::sessions::list_sessions(&mut store)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "aeon=debug" } else { "aeon=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
