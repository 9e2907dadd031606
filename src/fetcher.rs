use async_trait::async_trait;
use log::debug;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::catalog::Topic;
use crate::config::Config;
use crate::event::{decode_events, Event, EventDecodeError, EventsBySource};
use crate::source::{Source, SourceSet};

/// Fetch-layer failure. Callers treat either variant as "no update": whatever
/// is currently displayed stays displayed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("event backend request failed: {0}")]
    Network(String),
    #[error("could not decode event backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<EventDecodeError> for FetchError {
    fn from(e: EventDecodeError) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// The seam between the controller and the network, so tests can script
/// fetch outcomes without a server.
#[async_trait]
pub trait EventsApi: Send + Sync {
    /// Events for every source in the set, in set order. A response may
    /// legitimately cover fewer sources than requested.
    async fn events_for_sources(&self, sources: &SourceSet) -> Result<EventsBySource, FetchError>;

    /// The backend's topic list.
    async fn topics(&self) -> Result<Vec<Topic>, FetchError>;
}

/// HTTP client for the event-aggregation backend.
pub struct EventFetcher {
    client: Client,
    base_url: String,
}

impl EventFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(&config.api.base_url, Duration::from_secs(config.api.timeout_secs))
    }

    /// Batch shape: `GET /events?urls=<JSON array>`.
    pub async fn events_for_urls(
        &self,
        urls: &[String],
    ) -> Result<BTreeMap<String, Vec<Event>>, FetchError> {
        let urls_json = serde_json::to_string(urls)?;
        self.get_events(&[("urls", urls_json.as_str())]).await
    }

    /// Single-URL shape: `GET /events?url=<url>`.
    pub async fn events_for_url(
        &self,
        url: &str,
    ) -> Result<BTreeMap<String, Vec<Event>>, FetchError> {
        self.get_events(&[("url", url)]).await
    }

    /// Topic shape: `GET /events?topic_id=<id>`, keyed by the topic's URLs.
    pub async fn events_for_topic(
        &self,
        topic_id: u32,
    ) -> Result<BTreeMap<String, Vec<Event>>, FetchError> {
        let id = topic_id.to_string();
        self.get_events(&[("topic_id", id.as_str())]).await
    }

    async fn get_events(
        &self,
        query: &[(&str, &str)],
    ) -> Result<BTreeMap<String, Vec<Event>>, FetchError> {
        let text = self.get_text("events", query).await?;
        // Key order in the document is not trusted; the sorted map keeps
        // downstream iteration deterministic.
        let raw: BTreeMap<String, Vec<Value>> = serde_json::from_str(&text)?;
        let mut events = BTreeMap::new();
        for (url, values) in raw {
            events.insert(url, decode_events(&values)?);
        }
        Ok(events)
    }

    async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {} with query {:?}", url, query);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl EventsApi for EventFetcher {
    async fn events_for_sources(&self, sources: &SourceSet) -> Result<EventsBySource, FetchError> {
        let urls = sources.urls();
        let mut by_url = match urls.len() {
            0 => BTreeMap::new(),
            1 => self.events_for_url(&urls[0]).await?,
            _ => self.events_for_urls(&urls).await?,
        };

        let mut result = EventsBySource::new();
        for source in sources.iter() {
            match source {
                // The response's keys are authoritative: a URL the backend
                // dropped simply contributes no entry.
                Source::Url(url) => {
                    if let Some(events) = by_url.remove(url) {
                        result.push(source.clone(), events);
                    }
                }
                // A topic owns every event under every key of its own
                // response, whichever URLs the backend resolved it to.
                Source::Topic { id, .. } => {
                    let topic_events = self.events_for_topic(*id).await?;
                    let events = topic_events.into_values().flatten().collect();
                    result.push(source.clone(), events);
                }
            }
        }
        Ok(result)
    }

    async fn topics(&self) -> Result<Vec<Topic>, FetchError> {
        let text = self.get_text("topics", &[]).await?;
        Ok(serde_json::from_str(&text)?)
    }
}
