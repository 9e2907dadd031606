use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

// Matches an optional scheme and "www." prefix, capturing the host-like
// segment up to the first '/' or ':'.
static DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:https?://)?(?:www\.)?([^/:]+)").unwrap());

/// One event-producing origin: either a raw calendar URL or a named topic
/// curated by the backend.
///
/// URL sources are compared by exact value — no normalization, so case or
/// scheme differences are distinct sources. Topic sources are compared by id
/// only; the stored name is a display concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Url(String),
    Topic { id: u32, name: String },
}

impl Source {
    /// Short label shown next to an event: the extracted domain for URL
    /// sources, the stored display name for topics.
    pub fn display_label(&self) -> String {
        match self {
            Source::Url(url) => extract_domain(url),
            Source::Topic { name, .. } => name.clone(),
        }
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Source::Url(a), Source::Url(b)) => a == b,
            (Source::Topic { id: a, .. }, Source::Topic { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Source {}

/// Extract a short display domain from a URL-shaped string.
///
/// Strips an optional `http(s)://` scheme and a leading `www.`, then takes
/// everything up to the first `/` or `:`. Returns an empty string when no
/// host-like segment is found.
pub fn extract_domain(url: &str) -> String {
    DOMAIN_RE
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Ordered set of unique sources, in user-insertion order.
///
/// Insertion order matters for display and for tie-breaking during
/// aggregation; the date sort happens elsewhere. Duplicate inserts are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceSet {
    sources: Vec<Source>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a sequence, dropping duplicates while keeping the
    /// first occurrence's position.
    pub fn from_sources(sources: Vec<Source>) -> Self {
        let mut set = Self::new();
        for source in sources {
            set.insert(source);
        }
        set
    }

    /// Appends a source unless an equal one is already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, source: Source) -> bool {
        if self.sources.contains(&source) {
            return false;
        }
        self.sources.push(source);
        true
    }

    /// Removes the given source. Returns whether the set changed.
    pub fn remove(&mut self, source: &Source) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s != source);
        self.sources.len() != before
    }

    /// Removes the source at a display position (zero-based).
    pub fn remove_at(&mut self, index: usize) -> Option<Source> {
        if index < self.sources.len() {
            Some(self.sources.remove(index))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Source> {
        self.sources.iter()
    }

    pub fn contains(&self, source: &Source) -> bool {
        self.sources.contains(source)
    }

    /// The URL-valued sources, in set order.
    pub fn urls(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|source| match source {
                Source::Url(url) => Some(url.clone()),
                Source::Topic { .. } => None,
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for SourceSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sources = Vec::<Source>::deserialize(deserializer)?;
        Ok(SourceSet::from_sources(sources))
    }
}
