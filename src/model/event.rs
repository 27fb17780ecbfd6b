// File: ./src/model/event.rs
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_TITLE: &str = "Untitled Event";
pub const DEFAULT_COLOR: &str = "#3788d8";
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";

// --- DATE TYPES ---

/// A normalized event edge.
///
/// All-day edges keep the calendar date only. Timed edges are absolute
/// instants carrying the offset of the zone they were normalized into.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DateType {
    AllDay(NaiveDate),
    Specific(DateTime<FixedOffset>),
}

impl DateType {
    /// ISO-8601 form handed to filters and the presentation layer.
    pub fn to_iso(&self) -> String {
        match self {
            DateType::AllDay(d) => d.format("%Y-%m-%d").to_string(),
            DateType::Specific(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

impl Serialize for DateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso())
    }
}

// --- STYLING ---

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStyle {
    pub background_color: String,
    pub border_color: String,
    pub text_color: String,
}

impl Default for EventStyle {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_COLOR.to_string(),
            border_color: DEFAULT_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }
}

// --- EVENT RECORD ---

/// One calendar event as produced by the extractor.
///
/// Records are immutable once built: a source refresh replaces the whole list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateType>,
    pub all_day: bool,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub style: EventStyle,
    pub hidden: bool,
    /// Every block key the normalizer does not interpret (location, url, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for EventRecord {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            start: None,
            end: None,
            all_day: false,
            tags: Vec::new(),
            style: EventStyle::default(),
            hidden: false,
            extra: BTreeMap::new(),
        }
    }
}

impl EventRecord {
    /// Re-serializes the record into the key/value shape of an event block.
    /// Feeding the result back through the normalizer yields the same record.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        map.insert("title".into(), Value::String(self.title.clone()));
        if let Some(start) = &self.start {
            map.insert("start".into(), Value::String(start.to_iso()));
        }
        if let Some(end) = &self.end {
            map.insert("end".into(), Value::String(end.to_iso()));
        }
        map.insert("allDay".into(), Value::Bool(self.all_day));
        map.insert(
            "tags".into(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        map.insert(
            "backgroundColor".into(),
            Value::String(self.style.background_color.clone()),
        );
        map.insert(
            "borderColor".into(),
            Value::String(self.style.border_color.clone()),
        );
        map.insert(
            "textColor".into(),
            Value::String(self.style.text_color.clone()),
        );
        map.insert("hidden".into(), Value::Bool(self.hidden));
        map
    }

    /// Looks up a field by the name a filter expression would use.
    /// Both the block spelling (`allDay`) and the Rust spelling (`all_day`) work.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let value = match name {
            "title" => Value::String(self.title.clone()),
            "start" => Value::String(self.start.as_ref()?.to_iso()),
            "end" => Value::String(self.end.as_ref()?.to_iso()),
            "allDay" | "all_day" => Value::Bool(self.all_day),
            "tags" | "tag" => Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            "backgroundColor" | "background_color" | "color" => {
                Value::String(self.style.background_color.clone())
            }
            "borderColor" | "border_color" => Value::String(self.style.border_color.clone()),
            "textColor" | "text_color" => Value::String(self.style.text_color.clone()),
            "hidden" => Value::Bool(self.hidden),
            other => return self.extra.get(other).cloned(),
        };
        Some(value)
    }
}
