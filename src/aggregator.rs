use crate::event::{EventWithSource, EventsBySource};

/// Flattens per-source event lists into one sequence ordered by date.
///
/// Sources are visited in the mapping's insertion order and events in their
/// per-source array order, then stable-sorted ascending by date, so equal
/// instants keep the flattening order. Nothing is deduplicated: the output
/// length is exactly the sum of the input lengths.
pub fn aggregate(events: &EventsBySource) -> Vec<EventWithSource> {
    let mut all: Vec<EventWithSource> = events
        .iter()
        .flat_map(|(source, source_events)| {
            source_events.iter().map(move |event| EventWithSource {
                event: event.clone(),
                source: source.clone(),
            })
        })
        .collect();
    all.sort_by_key(|entry| entry.event.date);
    all
}
