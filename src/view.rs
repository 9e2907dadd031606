use chrono::Datelike;

use crate::event::EventWithSource;

/// One rendered feed line: month/day, event text, source label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub day: String,
    pub text: String,
    pub label: String,
}

/// Turns the aggregated sequence into display rows, in order. Read-only;
/// carries no state.
pub fn rows(events: &[EventWithSource]) -> Vec<EventRow> {
    events
        .iter()
        .map(|entry| EventRow {
            day: format!("{}/{}", entry.event.date.month(), entry.event.date.day()),
            text: entry.event.text.clone(),
            label: entry.source.display_label(),
        })
        .collect()
}

/// Plain-text rendering of the feed, one line per event.
pub fn render(events: &[EventWithSource]) -> String {
    let rows = rows(events);
    if rows.is_empty() {
        return "(no events)".to_string();
    }
    let day_width = rows.iter().map(|row| row.day.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| format!("{:>width$}  {}  [{}]", row.day, row.text, row.label, width = day_width))
        .collect::<Vec<_>>()
        .join("\n")
}
