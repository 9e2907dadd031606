pub mod aggregator;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod event;
pub mod fetcher;
pub mod persist;
pub mod source;
pub mod view;

use anyhow::Result;
use log::info;

use crate::cli::{Cli, Commands};
use crate::fetcher::{EventFetcher, EventsApi};

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = config::Config::load()?;
    if let Some(api_base) = cli.api_base {
        config.api.base_url = api_base;
    }

    match cli.command {
        Some(Commands::Events { urls, topic_id }) => {
            print_one_shot_feed(&config, urls, topic_id).await
        }
        Some(Commands::Topics) => print_topics(&config).await,
        None => {
            info!("Entering interactive mode");
            let mut app = app::Application::new(&config, cli.link.as_deref())?;
            app.run().await
        }
    }
}

/// Fetches and prints the feed for ad-hoc sources without touching the saved
/// selection.
async fn print_one_shot_feed(
    config: &config::Config,
    urls: Vec<String>,
    topic_id: Option<u32>,
) -> Result<()> {
    let fetcher = EventFetcher::from_config(config)?;
    let mut sources = SourceSet::from_sources(urls.into_iter().map(Source::Url).collect());
    if let Some(id) = topic_id {
        let name = fetcher
            .topics()
            .await
            .ok()
            .and_then(|topics| topics.into_iter().find(|t| t.id == id))
            .map(|t| t.name)
            .unwrap_or_else(|| format!("topic {}", id));
        sources.insert(Source::Topic { id, name });
    }
    if sources.is_empty() {
        println!("Nothing to fetch: pass --url and/or --topic-id");
        return Ok(());
    }
    let by_source = fetcher.events_for_sources(&sources).await?;
    println!("{}", view::render(&aggregator::aggregate(&by_source)));
    Ok(())
}

async fn print_topics(config: &config::Config) -> Result<()> {
    let fetcher = EventFetcher::from_config(config)?;
    let topics = fetcher.topics().await?;
    if topics.is_empty() {
        println!("(no topics available)");
    }
    for topic in topics {
        println!("{:>3}  {}", topic.id, topic.name);
    }
    Ok(())
}

pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

// Re-export commonly used types
pub use config::Config;
pub use event::{Event, EventWithSource, EventsBySource};
pub use source::{Source, SourceSet};
