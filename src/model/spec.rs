// File: ./src/model/spec.rs
//! The validated configuration of one view (one rendered calendar).
//!
//! A view block is YAML. `source`, `filter` and `debug` are interpreted by the
//! engine; every other key is a presentation option passed through untouched
//! to the sink (initial view, header toolbar, ...).
use crate::error::EngineError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSpec {
    /// Document paths or `[[symbolic]]` references, in display order.
    /// Empty means "the document hosting the view".
    pub sources: Vec<String>,
    /// Filter expressions, all of which must pass.
    pub filters: Vec<String>,
    pub debug: bool,
    pub options: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RawViewSpec {
    #[serde(default)]
    source: Option<OneOrMany>,
    #[serde(default)]
    filter: Option<OneOrMany>,
    #[serde(default)]
    debug: Option<bool>,
    #[serde(flatten)]
    options: BTreeMap<String, Value>,
}

impl ViewSpec {
    /// Parses and validates the body of a view block.
    ///
    /// An empty body is a valid spec (host document as source, no filters).
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        // Validate the overall shape first so a scalar or list body gets a
        // clear message instead of a serde "expected struct" one.
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| EngineError::SpecParse(e.to_string()))?;
        match doc {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {}
            _ => {
                return Err(EngineError::SpecParse(
                    "expected a mapping of options".to_string(),
                ));
            }
        }

        let raw: RawViewSpec = serde_yaml::from_value(doc).map_err(|e| {
            EngineError::SpecParse(format!(
                "'source' and 'filter' must be strings or lists of strings, 'debug' a boolean ({})",
                e
            ))
        })?;

        let spec = Self {
            sources: raw.source.map(OneOrMany::into_vec).unwrap_or_default(),
            filters: raw.filter.map(OneOrMany::into_vec).unwrap_or_default(),
            debug: raw.debug.unwrap_or(false),
            options: raw.options,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(blank) = self.sources.iter().find(|s| s.trim().is_empty()) {
            return Err(EngineError::SpecParse(format!(
                "empty source entry '{}'",
                blank
            )));
        }
        if self.filters.iter().any(|f| f.trim().is_empty()) {
            return Err(EngineError::SpecParse("empty filter expression".to_string()));
        }
        Ok(())
    }

    /// Builder-style helpers used by embedding hosts and tests.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_list_shapes() {
        let spec = ViewSpec::parse("source: trip.md\nfilter: \"'beach' in tags\"").unwrap();
        assert_eq!(spec.sources, vec!["trip.md"]);
        assert_eq!(spec.filters, vec!["'beach' in tags"]);
        assert!(!spec.debug);

        let spec = ViewSpec::parse("source:\n  - a.md\n  - \"[[B]]\"\ndebug: true").unwrap();
        assert_eq!(spec.sources, vec!["a.md", "[[B]]"]);
        assert!(spec.debug);
    }

    #[test]
    fn test_passthrough_options() {
        let spec = ViewSpec::parse("initialView: listWeek\nheight: 400").unwrap();
        assert!(spec.sources.is_empty());
        assert_eq!(spec.options["initialView"], Value::String("listWeek".into()));
        assert_eq!(spec.options["height"], serde_json::json!(400));
        assert!(!spec.options.contains_key("debug"));
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(ViewSpec::parse("").unwrap(), ViewSpec::default());
        assert_eq!(ViewSpec::parse("  \n").unwrap(), ViewSpec::default());
    }

    #[test]
    fn test_malformed_shapes() {
        assert!(matches!(
            ViewSpec::parse("just a string"),
            Err(EngineError::SpecParse(_))
        ));
        assert!(matches!(
            ViewSpec::parse("- a\n- b"),
            Err(EngineError::SpecParse(_))
        ));
        assert!(matches!(
            ViewSpec::parse("source: {a: 1}"),
            Err(EngineError::SpecParse(_))
        ));
        assert!(matches!(
            ViewSpec::parse("debug: maybe"),
            Err(EngineError::SpecParse(_))
        ));
        assert!(matches!(
            ViewSpec::parse("source: [unclosed"),
            Err(EngineError::SpecParse(_))
        ));
        assert!(matches!(
            ViewSpec::parse("filter: ''"),
            Err(EngineError::SpecParse(_))
        ));
    }
}
