// File: ./src/sink.rs
//! The presentation side of the engine.
use crate::model::EventRecord;
use crate::view::ViewHandle;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a renderer needs to draw one view.
#[derive(Debug, Clone, Serialize)]
pub struct RenderFrame<'a> {
    pub events: &'a [EventRecord],
    /// Presentation options from the view spec (everything but source/filter/debug).
    pub options: &'a BTreeMap<String, Value>,
    pub debug_messages: &'a [String],
}

/// Receives final event sequences and fatal view errors.
pub trait PresentationSink: Send {
    fn render(&mut self, view: &ViewHandle, frame: &RenderFrame<'_>);

    /// A view failed to initialize; `message` is shown verbatim in its place.
    fn render_error(&mut self, view_key: &str, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Rendered {
        view: ViewHandle,
        events: Vec<EventRecord>,
        debug_messages: Vec<String>,
    },
    Error {
        view_key: String,
        message: String,
    },
}

/// Records every call. Clones share the same log, so a host can keep one
/// while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    log: Arc<Mutex<Vec<SinkEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful renders of views with this key.
    pub fn render_count(&self, view_key: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Rendered { view, .. } if view.key() == view_key))
            .count()
    }

    /// Events of the most recent render of this key.
    pub fn last_render(&self, view_key: &str) -> Option<Vec<EventRecord>> {
        self.events().into_iter().rev().find_map(|e| match e {
            SinkEvent::Rendered { view, events, .. } if view.key() == view_key => Some(events),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for CollectingSink {
    fn render(&mut self, view: &ViewHandle, frame: &RenderFrame<'_>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkEvent::Rendered {
                view: view.clone(),
                events: frame.events.to_vec(),
                debug_messages: frame.debug_messages.to_vec(),
            });
    }

    fn render_error(&mut self, view_key: &str, message: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkEvent::Error {
                view_key: view_key.to_string(),
                message: message.to_string(),
            });
    }
}
