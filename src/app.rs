use anyhow::Result;
use rustyline::DefaultEditor;
use std::sync::Arc;

use crate::catalog::SourceCatalog;
use crate::config::Config;
use crate::controller::{ControllerState, SelectionController};
use crate::fetcher::{EventFetcher, EventsApi};
use crate::persist::PersistedSelection;
use crate::source::Source;
use crate::view;

pub struct Application {
    api: Arc<dyn EventsApi>,
    controller: SelectionController,
    catalog: SourceCatalog,
    share_base: String,
}

impl Application {
    /// Wires the HTTP fetcher, the persisted selection (optionally seeded
    /// from a shared link) and the controller together.
    pub fn new(config: &Config, link: Option<&str>) -> Result<Self> {
        let api: Arc<dyn EventsApi> = Arc::new(EventFetcher::from_config(config)?);
        let persisted = PersistedSelection::open(link)?;
        let controller = SelectionController::new(Arc::clone(&api), persisted);
        Ok(Self {
            api,
            controller,
            catalog: SourceCatalog::new(),
            share_base: config.share.base_url.clone(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        log::info!("Starting calfeed");
        self.catalog.load(self.api.as_ref()).await;

        if !self.controller.sources().is_empty() {
            self.controller.settle().await;
            self.print_feed();
        }

        let mut rl = DefaultEditor::new()?;
        println!("Welcome to calfeed! Type 'help' for commands.");
        let prompt = "calfeed> ";

        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match self.handle(line.trim()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => log::error!("Failed to process command: {:?}", err),
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(rustyline::error::ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handles one command line. Returns false to leave the loop.
    async fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => print_help(),
            "exit" | "quit" => return Ok(false),
            "sources" | "list" => self.print_sources(),
            "topics" => self.print_topics(),
            "add" => {
                if rest.is_empty() {
                    println!("Usage: add <calendar url>");
                } else if self.controller.add_source(Source::Url(rest.to_string())) {
                    self.refresh().await;
                } else {
                    println!("Already selected: {}", rest);
                }
            }
            "remove" | "rm" => self.remove(rest).await,
            "topic" => self.add_topic(rest).await,
            "clear" => {
                self.controller.clear();
                self.print_feed();
            }
            "events" | "show" => self.print_feed(),
            "share" => println!("{}", self.controller.share_link(&self.share_base)),
            other => println!("Unknown command '{}'. Type 'help' for commands.", other),
        }
        Ok(true)
    }

    async fn refresh(&mut self) {
        self.controller.settle().await;
        self.print_feed();
    }

    async fn remove(&mut self, key: &str) {
        if key.is_empty() {
            println!("Usage: remove <index|calendar url>");
            return;
        }
        let removed = match key.parse::<usize>() {
            // 1-based, matching the `sources` listing.
            Ok(position) if position > 0 => self.controller.remove_at(position - 1).is_some(),
            _ => self.controller.remove_source(&Source::Url(key.to_string())),
        };
        if removed {
            self.refresh().await;
        } else {
            println!("No such source: {}", key);
        }
    }

    async fn add_topic(&mut self, key: &str) {
        if key.is_empty() {
            println!("Usage: topic <id|name>");
            return;
        }
        let (id, name) = match self.catalog.find(key) {
            Some(topic) => (topic.id, topic.name.clone()),
            None => {
                println!("No such topic: {} (try 'topics')", key);
                return;
            }
        };
        if self.controller.add_source(Source::Topic { id, name: name.clone() }) {
            self.refresh().await;
        } else {
            println!("Already selected: {}", name);
        }
    }

    fn print_sources(&self) {
        let sources = self.controller.sources();
        if sources.is_empty() {
            println!("(no sources selected)");
            return;
        }
        for (position, source) in sources.iter().enumerate() {
            match source {
                Source::Url(url) => println!("{:>2}. {}", position + 1, url),
                Source::Topic { id, name } => {
                    println!("{:>2}. topic {} ({})", position + 1, name, id)
                }
            }
        }
    }

    fn print_topics(&self) {
        if self.catalog.is_empty() {
            println!("(no topics available)");
            return;
        }
        for topic in self.catalog.topics() {
            println!("{:>3}  {}", topic.id, topic.name);
        }
    }

    fn print_feed(&self) {
        if self.controller.state() == ControllerState::Error {
            println!("(last fetch failed; showing previous events)");
        }
        println!("{}", view::render(self.controller.events()));
    }
}

fn print_help() {
    println!("Commands:");
    println!("  add <url>           add a calendar URL to the selection");
    println!("  topic <id|name>     add a backend topic to the selection");
    println!("  remove <n|url>      remove a source by position or URL");
    println!("  sources             list the selected sources");
    println!("  topics              list the topics the backend knows about");
    println!("  events              print the merged feed");
    println!("  share               print a shareable link for the selection");
    println!("  clear               drop all sources and clear the feed");
    println!("  exit                leave calfeed");
}
