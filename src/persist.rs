use anyhow::{anyhow, Context, Result};
use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::source::SourceSet;

const STATE_DIR: &str = ".calfeed";
const SOURCES_FILE: &str = "sources.json";

/// One backing store for the serialized source selection.
///
/// `read` returns the raw stored string (still percent-encoded for fragment
/// stores); `write(None)` clears the store. Implementations must make each
/// write atomic from the reader's point of view.
pub trait SelectionStore {
    fn read(&self) -> Option<String>;
    fn write(&mut self, value: Option<&str>) -> Result<()>;
}

/// Durable JSON file under the user's home directory, in the same spot the
/// rest of the app keeps its state.
pub struct DurableStore {
    path: PathBuf,
}

impl DurableStore {
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        let dir = home.join(STATE_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        Ok(Self { path: dir.join(SOURCES_FILE) })
    }

    /// Store backed by an explicit file path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SelectionStore for DurableStore {
    fn read(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    fn write(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(contents) => fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write {}", self.path.display())),
            None => {
                if self.path.exists() {
                    fs::remove_file(&self.path)
                        .with_context(|| format!("Failed to remove {}", self.path.display()))?;
                }
                Ok(())
            }
        }
    }
}

/// The fragment of a shareable link, held for the session.
///
/// Plays the role the address-bar hash plays in a browser client: seeded from
/// a link the user pastes in, overwritten on every selection change, and read
/// back out by the `share` command.
#[derive(Debug, Default)]
pub struct LinkFragment {
    fragment: Option<String>,
}

impl LinkFragment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Takes the fragment from a shared link. An unparseable link is ignored
    /// with a warning rather than failing startup.
    pub fn from_link(link: &str) -> Self {
        match Url::parse(link) {
            Ok(url) => Self { fragment: url.fragment().map(str::to_string) },
            Err(e) => {
                warn!("Ignoring unparseable shared link '{}': {}", link, e);
                Self::empty()
            }
        }
    }
}

impl SelectionStore for LinkFragment {
    fn read(&self) -> Option<String> {
        self.fragment.clone()
    }

    fn write(&mut self, value: Option<&str>) -> Result<()> {
        self.fragment = value.map(str::to_string);
        Ok(())
    }
}

/// In-memory store, shareable across owners so tests can observe writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    value: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: &str) -> Self {
        Self { value: Arc::new(Mutex::new(Some(value.to_string()))) }
    }

    pub fn value(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }
}

impl SelectionStore for MemoryStore {
    fn read(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }

    fn write(&mut self, value: Option<&str>) -> Result<()> {
        *self.value.lock().unwrap() = value.map(str::to_string);
        Ok(())
    }
}

/// Reads and writes the user's source selection to two redundant stores and
/// reconciles them on load: the link fragment wins when present and
/// non-empty, the durable store is the fallback.
pub struct PersistedSelection {
    durable: Box<dyn SelectionStore + Send>,
    fragment: Box<dyn SelectionStore + Send>,
}

impl PersistedSelection {
    pub fn new(
        durable: Box<dyn SelectionStore + Send>,
        fragment: Box<dyn SelectionStore + Send>,
    ) -> Self {
        Self { durable, fragment }
    }

    /// Stores backed by the home-directory file and an optional shared link.
    pub fn open(link: Option<&str>) -> Result<Self> {
        let fragment = match link {
            Some(link) => LinkFragment::from_link(link),
            None => LinkFragment::empty(),
        };
        Ok(Self::new(Box::new(DurableStore::new()?), Box::new(fragment)))
    }

    /// Loads the selection. Fails soft: any decode error yields an empty set.
    pub fn load(&self) -> SourceSet {
        if let Some(raw) = self.fragment.read() {
            if !raw.is_empty() {
                return decode_fragment_sources(&raw);
            }
        }
        match self.durable.read() {
            Some(raw) if !raw.trim().is_empty() => decode_sources(&raw),
            _ => SourceSet::new(),
        }
    }

    /// Overwrites both stores. An empty set clears the fragment entirely
    /// (never `"[]"`) so shared links stay clean. Write failures are logged,
    /// never fatal.
    pub fn save(&mut self, sources: &SourceSet) {
        let json = match serde_json::to_string(sources) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize source selection: {}", e);
                return;
            }
        };
        if let Err(e) = self.durable.write(Some(&json)) {
            warn!("Could not persist source selection: {:#}", e);
        }
        let fragment = if sources.is_empty() { None } else { Some(encode_fragment(&json)) };
        if let Err(e) = self.fragment.write(fragment.as_deref()) {
            warn!("Could not update share fragment: {:#}", e);
        }
    }

    /// A shareable link carrying the current selection in its fragment.
    /// With an empty selection the base link is returned untouched.
    pub fn share_link(&self, base: &str) -> String {
        match self.fragment.read() {
            Some(fragment) if !fragment.is_empty() => format!("{}#{}", base, fragment),
            _ => base.to_string(),
        }
    }
}

fn decode_sources(raw: &str) -> SourceSet {
    match serde_json::from_str(raw) {
        Ok(sources) => sources,
        Err(e) => {
            warn!("Stored source selection is not valid JSON, starting empty: {}", e);
            SourceSet::new()
        }
    }
}

fn decode_fragment_sources(raw: &str) -> SourceSet {
    match percent_decode_str(raw).decode_utf8() {
        Ok(json) => decode_sources(&json),
        Err(e) => {
            warn!("Share fragment is not valid UTF-8, starting empty: {}", e);
            SourceSet::new()
        }
    }
}

fn encode_fragment(json: &str) -> String {
    utf8_percent_encode(json, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn memory_selection() -> (PersistedSelection, MemoryStore, MemoryStore) {
        let durable = MemoryStore::new();
        let fragment = MemoryStore::new();
        let selection =
            PersistedSelection::new(Box::new(durable.clone()), Box::new(fragment.clone()));
        (selection, durable, fragment)
    }

    fn sample_set() -> SourceSet {
        SourceSet::from_sources(vec![
            Source::Url("https://www.example.com/cal.ics".into()),
            Source::Topic { id: 4, name: "Town events".into() },
            Source::Url("example.org/feed".into()),
        ])
    }

    #[test]
    fn load_after_save_round_trips() {
        let (mut selection, _, _) = memory_selection();
        let set = sample_set();
        selection.save(&set);
        assert_eq!(selection.load(), set);
    }

    #[test]
    fn fragment_takes_precedence_over_durable() {
        let (selection, mut durable, mut fragment) = memory_selection();
        durable.write(Some(r#"["http://from-durable"]"#)).unwrap();
        fragment.write(Some(&encode_fragment(r#"["http://from-fragment"]"#))).unwrap();

        let loaded = selection.load();
        assert_eq!(loaded.urls(), vec!["http://from-fragment".to_string()]);
    }

    #[test]
    fn empty_fragment_falls_back_to_durable() {
        let (selection, mut durable, mut fragment) = memory_selection();
        durable.write(Some(r#"["http://from-durable"]"#)).unwrap();
        fragment.write(Some("")).unwrap();

        assert_eq!(selection.load().urls(), vec!["http://from-durable".to_string()]);
    }

    #[test]
    fn decode_errors_yield_empty_set() {
        let (selection, mut durable, _) = memory_selection();
        durable.write(Some("not json at all")).unwrap();
        assert!(selection.load().is_empty());
    }

    #[test]
    fn bad_fragment_yields_empty_set() {
        let (selection, _, mut fragment) = memory_selection();
        fragment.write(Some("%41%42not-json")).unwrap();
        assert!(selection.load().is_empty());
    }

    #[test]
    fn empty_set_clears_the_fragment_and_writes_empty_array() {
        let (mut selection, durable, fragment) = memory_selection();
        selection.save(&sample_set());
        assert!(fragment.value().is_some());

        selection.save(&SourceSet::new());
        assert_eq!(fragment.value(), None);
        assert_eq!(durable.value(), Some("[]".to_string()));
        assert_eq!(selection.share_link("http://town.example/"), "http://town.example/");
    }

    #[test]
    fn share_link_round_trips_through_from_link() {
        let (mut selection, _, _) = memory_selection();
        let set = sample_set();
        selection.save(&set);
        let link = selection.share_link("http://town.example/");

        let reloaded = PersistedSelection::new(
            Box::new(MemoryStore::new()),
            Box::new(LinkFragment::from_link(&link)),
        );
        assert_eq!(reloaded.load(), set);
    }

    #[test]
    fn durable_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let set = sample_set();
        {
            let mut selection = PersistedSelection::new(
                Box::new(DurableStore::at(path.clone())),
                Box::new(LinkFragment::empty()),
            );
            selection.save(&set);
        }
        let selection = PersistedSelection::new(
            Box::new(DurableStore::at(path)),
            Box::new(LinkFragment::empty()),
        );
        assert_eq!(selection.load(), set);
    }

    #[test]
    fn missing_stores_load_empty() {
        let (selection, _, _) = memory_selection();
        assert!(selection.load().is_empty());
    }
}
