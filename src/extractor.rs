// File: ./src/extractor.rs
//! Turns document text into normalized event records.
//!
//! Each fenced event block is parsed independently. A block that fails to
//! parse is logged and skipped: extraction runs outside of any rendering pass,
//! so there is nobody to hand the error to.
use crate::error::BlockParseError;
use crate::model::event::{
    DEFAULT_COLOR, DEFAULT_TEXT_COLOR, DEFAULT_TITLE, DateType, EventRecord, EventStyle,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const EVENT_BLOCK_TAG: &str = "itinerary-event";
pub const VIEW_BLOCK_TAG: &str = "itinerary";

/// Keys interpreted by the normalizer. Everything else lands in `extra`.
const CONSUMED_KEYS: &[&str] = &[
    "title",
    "start",
    "end",
    "allDay",
    "tag",
    "tags",
    "color",
    "backgroundColor",
    "borderColor",
    "textColor",
    "hidden",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

// --- RECORD PARSING ---

/// Turns the body of one fenced block into a key/value mapping.
pub trait RecordParser: Send + Sync {
    fn parse(&self, block: &str) -> Result<Map<String, Value>, BlockParseError>;
}

/// Default parser: event blocks are YAML mappings.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlRecordParser;

impl RecordParser for YamlRecordParser {
    fn parse(&self, block: &str) -> Result<Map<String, Value>, BlockParseError> {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(block).map_err(|e| BlockParseError::Syntax(e.to_string()))?;
        if !yaml.is_mapping() {
            return Err(BlockParseError::NotAMapping);
        }
        match serde_json::to_value(yaml) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BlockParseError::NotAMapping),
            Err(e) => Err(BlockParseError::Syntax(e.to_string())),
        }
    }
}

// --- BLOCK SCANNING ---

/// Finds the bodies of fenced code blocks carrying a given info-string tag.
#[derive(Debug, Clone)]
pub struct BlockScanner {
    pattern: Regex,
}

impl BlockScanner {
    pub fn new(tag: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"```{}[ \t]*\r?\n(?:([^`]*?)\r?\n)?```",
            regex::escape(tag)
        ))?;
        Ok(Self { pattern })
    }

    pub fn blocks<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.pattern
            .captures_iter(text)
            // An empty block has no body group
            .map(|c| c.get(1).map_or("", |m| m.as_str()))
            .collect()
    }
}

/// One-shot helper for hosts that only need to locate blocks.
pub fn fenced_blocks<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    match BlockScanner::new(tag) {
        Ok(scanner) => scanner.blocks(text),
        Err(e) => {
            log::warn!("Invalid block tag '{}': {}", tag, e);
            Vec::new()
        }
    }
}

// --- NORMALIZATION ---

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Zone used for floating timestamps when the block names none.
    pub default_zone: Tz,
    pub untitled_title: String,
    pub default_color: String,
    pub default_text_color: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            default_zone: Tz::UTC,
            untitled_title: DEFAULT_TITLE.to_string(),
            default_color: DEFAULT_COLOR.to_string(),
            default_text_color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }
}

fn field_error(field: &str, reason: impl Into<String>) -> BlockParseError {
    BlockParseError::Field {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, BlockParseError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(field_error(key, "expected a string")),
    }
}

fn bool_field(fields: &Map<String, Value>, key: &str) -> Result<Option<bool>, BlockParseError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(field_error(key, "expected true or false")),
    }
}

fn zone_field(fields: &Map<String, Value>, key: &str) -> Result<Option<Tz>, BlockParseError> {
    match string_field(fields, key)? {
        None => Ok(None),
        Some(name) => name
            .parse::<Tz>()
            .map(Some)
            .map_err(|_| BlockParseError::UnknownTimeZone(name)),
    }
}

/// Collects `tag` and `tags` (each a scalar or a list) into an ordered set.
fn collect_tags(fields: &Map<String, Value>) -> Result<Vec<String>, BlockParseError> {
    let mut tags: Vec<String> = Vec::new();
    for key in ["tag", "tags"] {
        let items = match fields.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };
        for item in items {
            let tag = match item {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(field_error(key, "tags must be strings")),
            };
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    Ok(tags)
}

fn is_date_only(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").is_ok()
}

fn localize(naive: NaiveDateTime, zone: Tz, field: &str) -> Result<DateType, BlockParseError> {
    // DST overlaps take the earlier instant
    if let Some(dt) = zone.from_local_datetime(&naive).earliest() {
        return Ok(DateType::Specific(dt.fixed_offset()));
    }

    // Inside a DST gap: read the wall time with the offset in force before the
    // transition, which shifts it forward by the length of the gap
    let out_of_range = || field_error(field, format!("{} is out of range", naive));
    let before = naive
        .checked_sub_signed(TimeDelta::days(1))
        .map(|earlier| zone.offset_from_utc_datetime(&earlier).fix())
        .ok_or_else(out_of_range)?;
    let utc = naive
        .checked_sub_signed(TimeDelta::seconds(i64::from(before.local_minus_utc())))
        .ok_or_else(out_of_range)?;
    Ok(DateType::Specific(zone.from_utc_datetime(&utc).fixed_offset()))
}

/// Parses one event edge.
///
/// `zone` is the block's override for this edge. A timestamp with an explicit
/// offset is converted into it; a floating timestamp is read as wall time in
/// it (or in `default_zone` when there is no override).
fn parse_edge(
    raw: &str,
    field: &str,
    all_day: bool,
    zone: Option<Tz>,
    default_zone: Tz,
) -> Result<DateType, BlockParseError> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if all_day {
            return Ok(DateType::AllDay(date));
        }
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| field_error(field, "invalid date"))?;
        return localize(midnight, zone.unwrap_or(default_zone), field);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        if all_day {
            return Ok(DateType::AllDay(dt.date_naive()));
        }
        return Ok(match zone {
            Some(tz) => DateType::Specific(dt.with_timezone(&tz).fixed_offset()),
            None => DateType::Specific(dt),
        });
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            if all_day {
                return Ok(DateType::AllDay(naive.date()));
            }
            return localize(naive, zone.unwrap_or(default_zone), field);
        }
    }

    Err(field_error(field, format!("unrecognized date '{}'", raw)))
}

/// Builds a canonical record from a parsed block.
pub fn normalize(
    fields: &Map<String, Value>,
    options: &NormalizeOptions,
) -> Result<EventRecord, BlockParseError> {
    let start_raw = string_field(fields, "start")?;
    let end_raw = string_field(fields, "end")?;

    // Date-only edges imply an all-day event unless the block says otherwise
    let all_day = match bool_field(fields, "allDay")? {
        Some(b) => b,
        None => {
            start_raw.as_deref().is_some_and(is_date_only)
                && end_raw.as_deref().is_none_or(is_date_only)
        }
    };

    let block_zone = zone_field(fields, "timeZone")?;
    let start_zone = zone_field(fields, "startTimeZone")?.or(block_zone);
    let end_zone = zone_field(fields, "endTimeZone")?.or(block_zone);

    let start = start_raw
        .as_deref()
        .map(|raw| parse_edge(raw, "start", all_day, start_zone, options.default_zone))
        .transpose()?;
    let end = end_raw
        .as_deref()
        .map(|raw| parse_edge(raw, "end", all_day, end_zone, options.default_zone))
        .transpose()?;

    let color = string_field(fields, "color")?;
    let style = EventStyle {
        background_color: string_field(fields, "backgroundColor")?
            .or_else(|| color.clone())
            .unwrap_or_else(|| options.default_color.clone()),
        border_color: string_field(fields, "borderColor")?
            .or_else(|| color.clone())
            .unwrap_or_else(|| options.default_color.clone()),
        text_color: string_field(fields, "textColor")?
            .unwrap_or_else(|| options.default_text_color.clone()),
    };

    let extra: BTreeMap<String, Value> = fields
        .iter()
        .filter(|(k, _)| !CONSUMED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(EventRecord {
        title: string_field(fields, "title")?.unwrap_or_else(|| options.untitled_title.clone()),
        start,
        end,
        all_day,
        tags: collect_tags(fields)?,
        style,
        hidden: bool_field(fields, "hidden")?.unwrap_or(false),
        extra,
    })
}

// --- EXTRACTOR ---

/// Result of scanning one document, including the blocks that were dropped.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub events: Vec<EventRecord>,
    pub skipped: Vec<BlockParseError>,
}

pub struct Extractor {
    scanner: BlockScanner,
    parser: Box<dyn RecordParser>,
    options: NormalizeOptions,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("scanner", &self.scanner)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    pub fn new(
        block_tag: &str,
        parser: Box<dyn RecordParser>,
        options: NormalizeOptions,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            scanner: BlockScanner::new(block_tag)?,
            parser,
            options,
        })
    }

    /// YAML blocks tagged `itinerary-event`, UTC for floating timestamps.
    pub fn with_defaults() -> Self {
        // The default tag is a plain word, so the pattern always compiles.
        Self::new(
            EVENT_BLOCK_TAG,
            Box::new(YamlRecordParser),
            NormalizeOptions::default(),
        )
        .unwrap_or_else(|e| unreachable!("default block pattern: {}", e))
    }

    pub fn extract_report(&self, text: &str) -> ExtractReport {
        let mut report = ExtractReport::default();
        for (idx, block) in self.scanner.blocks(text).into_iter().enumerate() {
            match self
                .parser
                .parse(block)
                .and_then(|fields| normalize(&fields, &self.options))
            {
                Ok(event) => report.events.push(event),
                Err(e) => {
                    log::debug!("Skipping event block #{}: {}", idx, e);
                    report.skipped.push(e);
                }
            }
        }
        report
    }

    /// All well-formed events of a document, in document order.
    pub fn extract(&self, text: &str) -> Vec<EventRecord> {
        self.extract_report(text).events
    }
}
