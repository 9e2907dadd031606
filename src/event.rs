use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::Source;

/// Canonical event shape after backend-payload normalization.
///
/// `date` is always a valid instant. When `time_known` is false the
/// time-of-day component is a midnight placeholder and only the calendar
/// date is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub text: String,
    pub date: NaiveDateTime,
    pub time_known: bool,
}

/// The unit the aggregator sorts and the view renders. Created fresh per
/// aggregation pass, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWithSource {
    pub event: Event,
    pub source: Source,
}

/// Per-source event lists in requested-source order, as produced by the
/// fetch layer and consumed wholesale by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsBySource {
    entries: Vec<(Source, Vec<Event>)>,
}

impl EventsBySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Source, events: Vec<Event>) {
        self.entries.push((source, events));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (Source, Vec<Event>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of events across all sources.
    pub fn total_events(&self) -> usize {
        self.entries.iter().map(|(_, events)| events.len()).sum()
    }
}

/// Failure to turn a backend event object into a canonical [`Event`].
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("event has empty text")]
    EmptyText,
    #[error("event has no recognizable date field")]
    MissingDate,
    #[error("unparseable event date '{0}'")]
    UnparseableDate(String),
    #[error("malformed event object: {0}")]
    Malformed(#[from] serde_json::Error),
}

// The backend variants disagree on how a date travels over the wire: a flat
// ISO-ish string, or a nested "time" container serialized from a date enum.
#[derive(Debug, Deserialize)]
struct RawEvent {
    text: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time: Option<RawTime>,
}

#[derive(Debug, Deserialize)]
enum RawTime {
    NaiveDate { date: NaiveDate },
    NaiveDateTime { date_time: NaiveDateTime },
}

/// Decodes one backend event object into the canonical shape.
pub fn decode_event(value: &Value) -> Result<Event, EventDecodeError> {
    let raw: RawEvent = serde_json::from_value(value.clone())?;
    if raw.text.trim().is_empty() {
        return Err(EventDecodeError::EmptyText);
    }
    let (date, time_known) = match (raw.date, raw.time) {
        (Some(text), _) => parse_date_text(&text)?,
        (None, Some(RawTime::NaiveDate { date })) => (date.and_time(NaiveTime::MIN), false),
        (None, Some(RawTime::NaiveDateTime { date_time })) => (date_time, true),
        (None, None) => return Err(EventDecodeError::MissingDate),
    };
    Ok(Event { text: raw.text, date, time_known })
}

/// Decodes one source's event array. Any bad element fails the whole list so
/// the caller can treat the response as undecodable rather than render a
/// partially wrong feed.
pub fn decode_events(values: &[Value]) -> Result<Vec<Event>, EventDecodeError> {
    values.iter().map(decode_event).collect()
}

fn parse_date_text(text: &str) -> Result<(NaiveDateTime, bool), EventDecodeError> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Ok((date_time.naive_local(), true));
    }
    if let Ok(date_time) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok((date_time, true));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok((date.and_time(NaiveTime::MIN), false));
    }
    Err(EventDecodeError::UnparseableDate(text.to_string()))
}
