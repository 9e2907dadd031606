use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::fetcher::EventsApi;

/// A backend-curated grouping that resolves to one or more calendar URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: u32,
    pub name: String,
}

/// Session-scoped copy of the backend's topic list.
///
/// Fetched once; a failed fetch leaves the catalog empty and is not retried
/// automatically.
#[derive(Debug, Default)]
pub struct SourceCatalog {
    topics: Vec<Topic>,
    loaded: bool,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, api: &dyn EventsApi) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        match api.topics().await {
            Ok(topics) => {
                debug!("Loaded {} topics from backend", topics.len());
                self.topics = topics;
            }
            Err(e) => warn!("Could not load topic catalog: {}", e),
        }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Looks a topic up by numeric id or case-insensitive name.
    pub fn find(&self, key: &str) -> Option<&Topic> {
        if let Ok(id) = key.parse::<u32>() {
            if let Some(topic) = self.topics.iter().find(|t| t.id == id) {
                return Some(topic);
            }
        }
        self.topics.iter().find(|t| t.name.eq_ignore_ascii_case(key))
    }
}
