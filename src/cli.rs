use clap::{Parser, Subcommand};

/// calfeed - aggregate calendar events from multiple web sources into one feed
#[derive(Debug, Parser)]
#[command(name = "calfeed")]
#[command(about = "Aggregate calendar events from multiple web sources into one feed", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute (if not specified, enters interactive mode)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Shared link whose fragment seeds the source selection
    #[arg(long)]
    pub link: Option<String>,

    /// Override the backend API base URL from the config file
    #[arg(long = "api-base")]
    pub api_base: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch and print the merged feed for ad-hoc sources, without touching
    /// the saved selection
    Events {
        /// Calendar URL to include (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Topic id to include
        #[arg(long = "topic-id")]
        topic_id: Option<u32>,
    },

    /// List the topics the backend knows about
    Topics,
}
