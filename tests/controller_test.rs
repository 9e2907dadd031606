use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use calfeed::catalog::Topic;
use calfeed::controller::{ControllerState, SelectionController};
use calfeed::event::{Event, EventsBySource};
use calfeed::fetcher::{EventsApi, FetchError};
use calfeed::persist::{MemoryStore, PersistedSelection};
use calfeed::source::{Source, SourceSet};

/// Scripted events API: each fetch is keyed by the set's first URL; a fetch
/// with a registered gate blocks until the test releases it, so resolution
/// order is controlled precisely.
struct ScriptedApi {
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    results: Mutex<HashMap<String, Result<EventsBySource, FetchError>>>,
}

impl ScriptedApi {
    fn new() -> Self {
        Self { gates: Mutex::new(HashMap::new()), results: Mutex::new(HashMap::new()) }
    }

    fn script(&self, url: &str, result: Result<EventsBySource, FetchError>) {
        self.results.lock().unwrap().insert(url.to_string(), result);
    }

    fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }
}

#[async_trait]
impl EventsApi for ScriptedApi {
    async fn events_for_sources(&self, sources: &SourceSet) -> Result<EventsBySource, FetchError> {
        let key = sources.urls().first().cloned().unwrap_or_default();
        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.results
            .lock()
            .unwrap()
            .remove(&key)
            .unwrap_or_else(|| Ok(EventsBySource::new()))
    }

    async fn topics(&self) -> Result<Vec<Topic>, FetchError> {
        Ok(Vec::new())
    }
}

fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN)
}

fn events_for(url: &str, texts: &[&str]) -> EventsBySource {
    let mut by_source = EventsBySource::new();
    let events = texts
        .iter()
        .map(|text| Event { text: text.to_string(), date: midnight(2022, 8, 7), time_known: false })
        .collect();
    by_source.push(Source::Url(url.to_string()), events);
    by_source
}

fn set_of(url: &str) -> SourceSet {
    SourceSet::from_sources(vec![Source::Url(url.to_string())])
}

fn memory_selection() -> (PersistedSelection, MemoryStore, MemoryStore) {
    let durable = MemoryStore::new();
    let fragment = MemoryStore::new();
    let selection = PersistedSelection::new(Box::new(durable.clone()), Box::new(fragment.clone()));
    (selection, durable, fragment)
}

fn displayed_texts(controller: &SelectionController) -> Vec<String> {
    controller.events().iter().map(|e| e.event.text.clone()).collect()
}

#[tokio::test]
async fn stale_response_is_suppressed() {
    let api = Arc::new(ScriptedApi::new());
    api.script("http://x", Ok(events_for("http://x", &["from x"])));
    api.script("http://y", Ok(events_for("http://y", &["from y"])));
    let release_x = api.gate("http://x");

    let (selection, _, _) = memory_selection();
    let mut controller = SelectionController::new(api, selection);

    // Fetch A for {x} stays blocked while fetch B for {y} resolves.
    controller.set_sources(set_of("http://x"));
    controller.set_sources(set_of("http://y"));
    controller.settle().await;
    assert_eq!(controller.state(), ControllerState::Ready);
    assert_eq!(displayed_texts(&controller), vec!["from y"]);

    // Now let A resolve late; its result must be discarded.
    release_x.send(()).unwrap();
    controller.process_outcome().await;
    assert_eq!(controller.state(), ControllerState::Ready);
    assert_eq!(displayed_texts(&controller), vec!["from y"]);
}

#[tokio::test]
async fn fetch_error_keeps_previous_events() {
    let api = Arc::new(ScriptedApi::new());
    api.script("http://x", Ok(events_for("http://x", &["good"])));
    api.script("http://y", Err(FetchError::Network("connection refused".into())));

    let (selection, _, _) = memory_selection();
    let mut controller = SelectionController::new(api, selection);

    controller.set_sources(set_of("http://x"));
    controller.settle().await;
    assert_eq!(controller.state(), ControllerState::Ready);

    controller.set_sources(set_of("http://y"));
    controller.settle().await;
    assert_eq!(controller.state(), ControllerState::Error);
    assert_eq!(displayed_texts(&controller), vec!["good"]);
}

#[tokio::test]
async fn emptying_the_set_goes_idle_and_clears_despite_inflight_fetch() {
    let api = Arc::new(ScriptedApi::new());
    api.script("http://x", Ok(events_for("http://x", &["from x"])));
    let release_x = api.gate("http://x");

    let (selection, _, fragment) = memory_selection();
    let mut controller = SelectionController::new(api, selection);

    controller.set_sources(set_of("http://x"));
    assert_eq!(controller.state(), ControllerState::Fetching);

    controller.set_sources(SourceSet::new());
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.events().is_empty());
    assert_eq!(fragment.value(), None);

    // The in-flight fetch resolves after the clear; nothing may change.
    release_x.send(()).unwrap();
    controller.process_outcome().await;
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.events().is_empty());
}

#[tokio::test]
async fn nonempty_persisted_selection_triggers_initial_fetch() {
    let api = Arc::new(ScriptedApi::new());
    api.script("http://x", Ok(events_for("http://x", &["restored"])));

    let durable = MemoryStore::with_value(r#"["http://x"]"#);
    let selection = PersistedSelection::new(Box::new(durable), Box::new(MemoryStore::new()));
    let mut controller = SelectionController::new(api, selection);

    assert_eq!(controller.state(), ControllerState::Fetching);
    controller.settle().await;
    assert_eq!(controller.state(), ControllerState::Ready);
    assert_eq!(displayed_texts(&controller), vec!["restored"]);
}

#[tokio::test]
async fn mutations_persist_to_both_stores() {
    let api = Arc::new(ScriptedApi::new());
    let (selection, durable, fragment) = memory_selection();
    let mut controller = SelectionController::new(api, selection);

    assert!(controller.add_source(Source::Url("http://x".into())));
    controller.settle().await;
    assert_eq!(durable.value(), Some(r#"["http://x"]"#.to_string()));
    assert!(fragment.value().is_some());

    // Re-adding the same URL is a no-op, not a refetch.
    assert!(!controller.add_source(Source::Url("http://x".into())));

    assert!(controller.remove_source(&Source::Url("http://x".into())));
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(durable.value(), Some("[]".to_string()));
    assert_eq!(fragment.value(), None);
}

#[tokio::test]
async fn empty_persisted_selection_stays_idle() {
    let api = Arc::new(ScriptedApi::new());
    let (selection, _, _) = memory_selection();
    let controller = SelectionController::new(api, selection);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.events().is_empty());
}
