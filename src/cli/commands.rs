use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nutrilens", version, about = "NutriLens food decision-support server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket server
    Serve,

    /// Enter interactive CLI chat REPL mode (ephemeral in-process session)
    Chat,

    /// Query the bundled ingredient knowledge base
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },
}

#[derive(Subcommand)]
pub enum KbAction {
    /// Search ingredients by partial name or alias
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Lookup a single ingredient by exact name or alias
    Lookup { name: String },

    /// Show knowledge base statistics
    Stats,
}
