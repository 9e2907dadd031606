use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::aggregator::aggregate;
use crate::event::{EventWithSource, EventsBySource};
use crate::fetcher::{EventsApi, FetchError};
use crate::persist::PersistedSelection;
use crate::source::{Source, SourceSet};

/// Where the controller is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No sources selected; nothing displayed.
    Idle,
    /// A fetch for the current selection is in flight.
    Fetching,
    /// The displayed events match the current selection.
    Ready,
    /// The last fetch failed; the previous display is kept.
    Error,
}

#[derive(Debug)]
struct FetchOutcome {
    generation: u64,
    result: Result<EventsBySource, FetchError>,
}

/// Owns the current source selection and the displayed events.
///
/// Every selection mutation persists the set, bumps the fetch generation and
/// spawns at most one new fetch; this is the only trigger point. A resolving
/// fetch whose generation no longer matches is stale and discarded, which
/// also covers cancellation when the set is emptied mid-flight.
pub struct SelectionController {
    api: Arc<dyn EventsApi>,
    persisted: PersistedSelection,
    sources: SourceSet,
    state: ControllerState,
    events: Vec<EventWithSource>,
    generation: u64,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
}

impl SelectionController {
    /// Restores the persisted selection and, when it is non-empty, fires the
    /// initial fetch. Must run inside a tokio runtime.
    pub fn new(api: Arc<dyn EventsApi>, persisted: PersistedSelection) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let initial = persisted.load();
        let mut controller = Self {
            api,
            persisted,
            sources: SourceSet::new(),
            state: ControllerState::Idle,
            events: Vec::new(),
            generation: 0,
            outcome_tx,
            outcome_rx,
        };
        if !initial.is_empty() {
            info!("Restored {} persisted source(s)", initial.len());
            controller.set_sources(initial);
        }
        controller
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// The currently displayed aggregated sequence.
    pub fn events(&self) -> &[EventWithSource] {
        &self.events
    }

    pub fn share_link(&self, base: &str) -> String {
        self.persisted.share_link(base)
    }

    /// Replaces the selection wholesale: persists it, supersedes any fetch in
    /// flight, and either goes Idle (empty set, display cleared) or spawns
    /// the one fetch for the new set.
    pub fn set_sources(&mut self, sources: SourceSet) {
        self.sources = sources;
        self.persisted.save(&self.sources);
        self.generation += 1;

        if self.sources.is_empty() {
            self.state = ControllerState::Idle;
            self.events.clear();
            return;
        }

        self.state = ControllerState::Fetching;
        let api = Arc::clone(&self.api);
        let set = self.sources.clone();
        let generation = self.generation;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = api.events_for_sources(&set).await;
            let _ = tx.send(FetchOutcome { generation, result });
        });
    }

    /// Adds one source. Returns false when it was already selected.
    pub fn add_source(&mut self, source: Source) -> bool {
        let mut next = self.sources.clone();
        if !next.insert(source) {
            return false;
        }
        self.set_sources(next);
        true
    }

    /// Removes one source. Returns false when it was not selected.
    pub fn remove_source(&mut self, source: &Source) -> bool {
        let mut next = self.sources.clone();
        if !next.remove(source) {
            return false;
        }
        self.set_sources(next);
        true
    }

    /// Removes the source at a display position.
    pub fn remove_at(&mut self, index: usize) -> Option<Source> {
        let mut next = self.sources.clone();
        let removed = next.remove_at(index)?;
        self.set_sources(next);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.set_sources(SourceSet::new());
    }

    /// Waits for one fetch outcome and applies it (stale outcomes are
    /// discarded). Pends forever when no fetch is in flight.
    pub async fn process_outcome(&mut self) {
        if let Some(outcome) = self.outcome_rx.recv().await {
            self.apply_outcome(outcome);
        }
    }

    /// Processes outcomes until no fetch is in flight anymore.
    pub async fn settle(&mut self) {
        while self.state == ControllerState::Fetching {
            self.process_outcome().await;
        }
    }

    fn apply_outcome(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            debug!(
                "Discarding stale fetch result (generation {}, current {})",
                outcome.generation, self.generation
            );
            return;
        }
        match outcome.result {
            Ok(by_source) => {
                self.events = aggregate(&by_source);
                self.state = ControllerState::Ready;
                debug!("Fetch resolved with {} event(s)", self.events.len());
            }
            Err(e) => {
                // The previous display is kept; an error is never destructive.
                error!("Fetching events failed: {}", e);
                self.state = ControllerState::Error;
            }
        }
    }
}
