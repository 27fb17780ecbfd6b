// File: ./src/view.rs
//! Per-view aggregation state.
//!
//! A view walks `Uninitialized -> Subscribing -> Active -> TornDown`. Only an
//! active view recomputes; asking anything else to recompute is a no-op.
use crate::cache::{EventList, SourceCache};
use crate::error::EngineError;
use crate::model::{EventRecord, FilterChain, ViewSpec};
use std::fmt;
use std::sync::Arc;
use strum::Display;

/// Identifies one instantiation of a view.
///
/// `key` names the view slot in the host (for instance the hosting document
/// and block index); `generation` distinguishes successive instantiations of
/// the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    key: String,
    generation: u64,
}

impl ViewHandle {
    pub fn new(key: impl Into<String>, generation: u64) -> Self {
        Self {
            key: key.into(),
            generation,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ViewPhase {
    Uninitialized,
    Subscribing,
    Active,
    TornDown,
}

/// An event dropped by the filter chain, recorded for debug views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub source_id: String,
    pub title: String,
    pub filter_index: usize,
}

/// Output of one recombination.
#[derive(Debug, Clone)]
pub struct Recomputation {
    pub events: Vec<EventRecord>,
    /// False when every source list is the same `Arc` as last time.
    pub changed: bool,
    pub rejections: Vec<Rejection>,
    /// Debug log lines, only filled for views with `debug: true`.
    pub messages: Vec<String>,
}

#[derive(Debug)]
pub struct View {
    handle: ViewHandle,
    host: String,
    spec: ViewSpec,
    sources: Vec<String>,
    filters: FilterChain,
    phase: ViewPhase,
    last_inputs: Option<Vec<EventList>>,
    messages: Vec<String>,
}

impl View {
    pub fn new(handle: ViewHandle, host: impl Into<String>, spec: ViewSpec) -> Self {
        Self {
            handle,
            host: host.into(),
            spec,
            sources: Vec::new(),
            filters: FilterChain::default(),
            phase: ViewPhase::Uninitialized,
            last_inputs: None,
            messages: Vec::new(),
        }
    }

    pub fn handle(&self) -> &ViewHandle {
        &self.handle
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == ViewPhase::Active
    }

    fn log(&mut self, message: String) {
        if self.spec.debug {
            log::debug!("[{}] {}", self.handle, message);
            self.messages.push(message);
        }
    }

    /// Compiles the filter expressions. Must run before subscribing.
    pub fn compile_filters(&mut self) -> Result<(), EngineError> {
        self.filters = FilterChain::compile(&self.spec.filters)?;
        let compiled: Vec<String> = self
            .filters
            .filters()
            .iter()
            .enumerate()
            .map(|(idx, f)| format!("Filter #{} '{}' compiled", idx, f))
            .collect();
        for line in compiled {
            self.log(line);
        }
        Ok(())
    }

    pub fn begin_subscribing(&mut self, sources: Vec<String>) {
        self.sources = sources;
        self.phase = ViewPhase::Subscribing;
    }

    pub fn activate(&mut self) {
        if self.phase == ViewPhase::Subscribing {
            self.phase = ViewPhase::Active;
        }
    }

    pub fn tear_down(&mut self) {
        self.phase = ViewPhase::TornDown;
        self.last_inputs = None;
        self.messages.clear();
    }

    /// Recombines the cached lists of this view's sources.
    ///
    /// Sources are concatenated in configured order, events keep their
    /// document order, and the filter chain is applied per event. Debug
    /// messages are only traced and handed out when the inputs changed, so an
    /// unchanged pass leaves pending messages for the next frame.
    pub fn recompute(&mut self, cache: &SourceCache) -> Option<Recomputation> {
        if !self.is_active() {
            return None;
        }

        let inputs: Vec<EventList> = self.sources.iter().map(|s| cache.get(s)).collect();
        let changed = match &self.last_inputs {
            Some(prev) => {
                prev.len() != inputs.len()
                    || prev.iter().zip(&inputs).any(|(a, b)| !Arc::ptr_eq(a, b))
            }
            None => true,
        };

        let mut events = Vec::new();
        let mut rejections = Vec::new();
        for (source_id, list) in self.sources.clone().iter().zip(&inputs) {
            for event in list.iter() {
                match self.filters.check(event) {
                    Ok(()) => {
                        if changed && !self.filters.is_empty() {
                            self.log(format!("Event '{}' passed all filters", event.title));
                        }
                        events.push(event.clone());
                    }
                    Err(idx) => {
                        if changed {
                            self.log(format!("Event '{}' failed filter #{}", event.title, idx));
                        }
                        if self.spec.debug {
                            rejections.push(Rejection {
                                source_id: source_id.clone(),
                                title: event.title.clone(),
                                filter_index: idx,
                            });
                        }
                    }
                }
            }
        }

        self.last_inputs = Some(inputs);
        Some(Recomputation {
            events,
            changed,
            rejections,
            messages: if changed {
                std::mem::take(&mut self.messages)
            } else {
                Vec::new()
            },
        })
    }
}
