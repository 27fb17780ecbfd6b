// File: ./src/engine.rs
//! The aggregation engine.
//!
//! One `Engine` per host session owns the source cache, the dependency graph,
//! the refresh timers and the view table. Every host-facing operation goes
//! through it; there is no module-level state. The engine is synchronous and
//! takes the current time as an argument, so it can be driven directly (tests,
//! embedding) or by the actor in [`crate::system`].
use crate::cache::SourceCache;
use crate::error::{EngineError, ResolutionError};
use crate::extractor::{
    EVENT_BLOCK_TAG, Extractor, NormalizeOptions, RecordParser, YamlRecordParser,
};
use crate::graph::DependencyGraph;
use crate::model::ViewSpec;
use crate::resolver;
use crate::scheduler::RefreshScheduler;
use crate::sink::{PresentationSink, RenderFrame};
use crate::store::DocumentStore;
use crate::view::{Recomputation, View, ViewHandle, ViewPhase};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long a view waits after the last change before recomputing.
    pub quiet_window: Duration,
    pub event_block_tag: String,
    pub normalize: NormalizeOptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quiet_window: DEFAULT_QUIET_WINDOW,
            event_block_tag: EVENT_BLOCK_TAG.to_string(),
            normalize: NormalizeOptions::default(),
        }
    }
}

pub struct Engine {
    store: Box<dyn DocumentStore>,
    sink: Box<dyn PresentationSink>,
    extractor: Extractor,
    settings: EngineSettings,
    cache: SourceCache,
    graph: DependencyGraph,
    scheduler: RefreshScheduler,
    views: HashMap<String, View>,
    next_generation: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("cached_sources", &self.cache.len())
            .field("views", &self.views.len())
            .field("pending_refreshes", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        store: Box<dyn DocumentStore>,
        sink: Box<dyn PresentationSink>,
        settings: EngineSettings,
    ) -> anyhow::Result<Self> {
        let extractor = Extractor::new(
            &settings.event_block_tag,
            Box::new(YamlRecordParser),
            settings.normalize.clone(),
        )?;
        Ok(Self {
            store,
            sink,
            extractor,
            scheduler: RefreshScheduler::new(settings.quiet_window),
            settings,
            cache: SourceCache::new(),
            graph: DependencyGraph::new(),
            views: HashMap::new(),
            next_generation: 1,
        })
    }

    pub fn with_defaults(
        store: Box<dyn DocumentStore>,
        sink: Box<dyn PresentationSink>,
    ) -> anyhow::Result<Self> {
        Self::new(store, sink, EngineSettings::default())
    }

    /// Replaces the record-extraction collaborator. Already cached lists are
    /// kept until their sources change.
    pub fn with_record_parser(mut self, parser: Box<dyn RecordParser>) -> anyhow::Result<Self> {
        self.extractor = Extractor::new(
            &self.settings.event_block_tag,
            parser,
            self.settings.normalize.clone(),
        )?;
        Ok(self)
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// The live view behind `handle`, if it has not been torn down or superseded.
    pub fn view(&self, handle: &ViewHandle) -> Option<&View> {
        self.views
            .get(handle.key())
            .filter(|v| v.handle() == handle)
    }

    pub fn phase(&self, handle: &ViewHandle) -> ViewPhase {
        self.view(handle).map_or(ViewPhase::TornDown, |v| v.phase())
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    fn is_live(views: &HashMap<String, View>, handle: &ViewHandle) -> bool {
        views
            .get(handle.key())
            .is_some_and(|v| v.handle() == handle && v.is_active())
    }

    // --- View lifecycle ---

    /// Parses a view block and instantiates it. See [`Engine::create_view`].
    pub fn create_view_from_block(
        &mut self,
        key: &str,
        host: &str,
        block: &str,
    ) -> Result<ViewHandle, EngineError> {
        match ViewSpec::parse(block) {
            Ok(spec) => self.create_view(key, host, spec),
            Err(e) => {
                self.sink.render_error(key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Instantiates a view in slot `key`, hosted by document `host`.
    ///
    /// Filters are compiled and sources resolved before anything is
    /// registered, so a failing view leaves no trace in the graph. A previous
    /// view in the same slot is superseded: its generation dies and its graph
    /// entries are pruned on the next notification.
    pub fn create_view(
        &mut self,
        key: &str,
        host: &str,
        spec: ViewSpec,
    ) -> Result<ViewHandle, EngineError> {
        let handle = ViewHandle::new(key, self.next_generation);
        self.next_generation += 1;

        let mut view = View::new(handle.clone(), host, spec);
        if let Err(e) = self.subscribe_view(&mut view) {
            log::info!("View {} failed to initialize: {}", handle, e);
            self.sink.render_error(key, &e.to_string());
            return Err(e);
        }

        if let Some(old) = self.views.insert(key.to_string(), view) {
            log::debug!("View {} superseded by {}", old.handle(), handle);
            self.scheduler.cancel(key);
        }
        log::info!(
            "View {} active with {} source(s)",
            handle,
            self.views.get(key).map_or(0, |v| v.sources().len())
        );

        self.render(&handle);
        Ok(handle)
    }

    fn subscribe_view(&mut self, view: &mut View) -> Result<(), EngineError> {
        view.compile_filters()?;

        let references: Vec<String> = if view.spec().sources.is_empty() {
            vec![view.host().to_string()]
        } else {
            view.spec().sources.clone()
        };
        let documents = self
            .store
            .list()
            .map_err(|e| ResolutionError::Listing(format!("{:#}", e)))?;
        let sources = references
            .iter()
            .map(|r| resolver::resolve(r, view.host(), &documents))
            .collect::<Result<Vec<_>, _>>()?;

        view.begin_subscribing(sources);

        // Load-on-subscribe: only sources nobody has loaded yet
        for source in view.sources() {
            if !self.cache.contains(source)
                && let Err(e) = self.cache.refresh(source, self.store.as_ref(), &self.extractor)
            {
                log::warn!("{}", e);
            }
        }
        for source in view.sources() {
            self.graph.subscribe(source, view.handle());
        }
        view.activate();
        Ok(())
    }

    /// Tears down a view. Returns false if `handle` was already dead.
    pub fn teardown_view(&mut self, handle: &ViewHandle) -> bool {
        self.graph.unsubscribe(handle);
        let live = self
            .views
            .get(handle.key())
            .is_some_and(|v| v.handle() == handle);
        if !live {
            return false;
        }
        if let Some(mut view) = self.views.remove(handle.key()) {
            view.tear_down();
        }
        self.scheduler.cancel(handle.key());
        log::info!("View {} torn down", handle);
        true
    }

    // --- Change propagation ---

    /// A document changed. Refreshes its cached events and (re)starts the
    /// debounce timer of every live view depending on it.
    ///
    /// Documents nobody ever subscribed to are ignored. On a store failure
    /// the previous events stay cached, no view is rescheduled and the error
    /// is returned.
    pub fn notify_changed(
        &mut self,
        source_id: &str,
        now: Instant,
    ) -> Result<Vec<ViewHandle>, EngineError> {
        if !self.cache.contains(source_id) && !self.graph.sources().iter().any(|s| s == source_id)
        {
            log::debug!("'{}' is not an event source", source_id);
            return Ok(Vec::new());
        }

        if let Err(e) = self
            .cache
            .refresh(source_id, self.store.as_ref(), &self.extractor)
        {
            log::warn!("{}; keeping previous events", e);
            return Err(e);
        }

        let views = &self.views;
        let subscribers = self
            .graph
            .subscribers_of(source_id, |h| Self::is_live(views, h));
        for handle in &subscribers {
            if self.scheduler.schedule(handle, now) {
                log::debug!("Rescheduled refresh of {}", handle);
            } else {
                log::debug!("Scheduled refresh of {}", handle);
            }
        }
        Ok(subscribers)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Fires every timer due at `now`. Returns the views that were handed a
    /// new frame.
    pub fn fire_due(&mut self, now: Instant) -> Vec<ViewHandle> {
        self.scheduler
            .take_due(now)
            .into_iter()
            .filter(|handle| self.render(handle))
            .collect()
    }

    /// Recombines one view from the current cache. `None` for dead views.
    pub fn recompute(&mut self, handle: &ViewHandle) -> Option<Recomputation> {
        if !Self::is_live(&self.views, handle) {
            log::debug!("Ignoring recompute of dead view {}", handle);
            return None;
        }
        self.views.get_mut(handle.key())?.recompute(&self.cache)
    }

    /// Recomputes and hands the result to the sink unless nothing changed.
    fn render(&mut self, handle: &ViewHandle) -> bool {
        let Some(result) = self.recompute(handle) else {
            return false;
        };
        if !result.changed {
            log::debug!("View {} unchanged, skipping render", handle);
            return false;
        }
        let Some(view) = self.views.get(handle.key()) else {
            return false;
        };
        let frame = RenderFrame {
            events: &result.events,
            options: &view.spec().options,
            debug_messages: &result.messages,
        };
        self.sink.render(handle, &frame);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CollectingSink, SinkEvent};
    use crate::store::MemoryStore;

    fn event(title: &str) -> String {
        format!("```itinerary-event\ntitle: {}\nstart: 2024-02-01\n```\n", title)
    }

    fn engine(store: &MemoryStore, sink: &CollectingSink) -> Engine {
        let settings = EngineSettings {
            quiet_window: Duration::from_millis(100),
            ..Default::default()
        };
        Engine::new(Box::new(store.clone()), Box::new(sink.clone()), settings).unwrap()
    }

    #[test]
    fn test_create_view_renders_immediately() {
        let store = MemoryStore::with_documents([("trip.md", event("Flight"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);

        let h = e.create_view("home.md#0", "home.md", ViewSpec::default().with_source("trip.md")).unwrap();
        assert_eq!(e.phase(&h), ViewPhase::Active);
        assert!(e.graph().is_subscribed("trip.md", &h));
        assert_eq!(sink.render_count("home.md#0"), 1);
        assert_eq!(sink.last_render("home.md#0").unwrap()[0].title, "Flight");
    }

    #[test]
    fn test_view_without_source_reads_its_host() {
        let store = MemoryStore::with_documents([("home.md", event("Local"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);

        let h = e.create_view_from_block("home.md#0", "home.md", "").unwrap();
        assert_eq!(e.view(&h).unwrap().sources(), ["home.md".to_string()]);
    }

    #[test]
    fn test_failed_views_leave_no_trace() {
        let store = MemoryStore::with_documents([("trip.md", event("Flight"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);

        let err = e
            .create_view("v#0", "home.md", ViewSpec::default().with_source("trip.md").with_filter("title =="))
            .unwrap_err();
        assert!(matches!(err, EngineError::FilterSyntax { .. }));

        let err = e
            .create_view("v#1", "home.md", ViewSpec::default().with_source("trip.md").with_source("gone.md"))
            .unwrap_err();
        assert!(matches!(err, EngineError::SourceResolution(_)));

        let err = e.create_view_from_block("v#2", "home.md", "source: [").unwrap_err();
        assert!(matches!(err, EngineError::SpecParse(_)));

        assert!(e.graph().is_empty());
        assert_eq!(e.view_count(), 0);
        assert_eq!(sink.errors().len(), 3);
        assert!(sink.errors()[1].contains("gone.md"));
    }

    #[test]
    fn test_unknown_documents_are_ignored() {
        let store = MemoryStore::with_documents([("other.md", event("X"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);
        assert!(e.notify_changed("other.md", Instant::now()).unwrap().is_empty());
        assert!(!e.cache().contains("other.md"));
    }

    #[test]
    fn test_superseded_generation_is_pruned_on_notify() {
        let store = MemoryStore::with_documents([("trip.md", event("Flight"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);

        let old = e.create_view("home.md#0", "home.md", ViewSpec::default().with_source("trip.md")).unwrap();
        let new = e.create_view("home.md#0", "home.md", ViewSpec::default().with_source("trip.md")).unwrap();
        assert_ne!(old, new);
        assert_eq!(e.phase(&old), ViewPhase::TornDown);
        // Still recorded until the next lookup
        assert!(e.graph().is_subscribed("trip.md", &old));

        let scheduled = e.notify_changed("trip.md", Instant::now()).unwrap();
        assert_eq!(scheduled, vec![new]);
        assert!(!e.graph().is_subscribed("trip.md", &old));
        // Tearing down the dead generation does nothing
        assert!(!e.teardown_view(&old));
    }

    #[test]
    fn test_debug_messages_reach_the_sink_once() {
        let store = MemoryStore::with_documents([("trip.md", event("Flight") + &event("Hotel"))]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink);
        let spec = ViewSpec::default()
            .with_source("trip.md")
            .with_filter("title != 'Hotel'")
            .with_debug(true);
        let h = e.create_view("home.md#0", "home.md", spec).unwrap();

        // A pass over unchanged inputs produces nothing to lose
        let idle = e.recompute(&h).unwrap();
        assert!(!idle.changed);
        assert!(idle.messages.is_empty());

        let t0 = Instant::now();
        store.insert("trip.md", event("Flight") + &event("Hotel") + &event("Taxi"));
        e.notify_changed("trip.md", t0).unwrap();
        assert_eq!(e.fire_due(t0 + Duration::from_millis(100)), vec![h.clone()]);

        let messages: Vec<Vec<String>> = sink
            .events()
            .into_iter()
            .filter_map(|ev| match ev {
                SinkEvent::Rendered { debug_messages, .. } => Some(debug_messages),
                SinkEvent::Error { .. } => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].iter().any(|m| m == "Filter #0 'title != 'Hotel'' compiled"));
        let hotel = messages[1]
            .iter()
            .filter(|m| *m == "Event 'Hotel' failed filter #0")
            .count();
        assert_eq!(hotel, 1);
        assert!(messages[1].iter().any(|m| m == "Event 'Taxi' passed all filters"));
    }

    /// `key = value` lines, one event per block.
    struct KeyValueParser;

    impl RecordParser for KeyValueParser {
        fn parse(
            &self,
            block: &str,
        ) -> Result<serde_json::Map<String, serde_json::Value>, crate::error::BlockParseError> {
            block
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|line| {
                    let (k, v) = line.split_once('=').ok_or_else(|| {
                        crate::error::BlockParseError::Syntax(format!("no '=' in '{}'", line))
                    })?;
                    Ok((k.trim().to_string(), serde_json::Value::from(v.trim())))
                })
                .collect()
        }
    }

    #[test]
    fn test_custom_record_parser() {
        let doc = "```itinerary-event\ntitle = Ferry\nstart = 2024-07-01\n```\n```itinerary-event\nbroken\n```\n";
        let store = MemoryStore::with_documents([("trip.md", doc)]);
        let sink = CollectingSink::new();
        let mut e = engine(&store, &sink)
            .with_record_parser(Box::new(KeyValueParser))
            .unwrap();

        e.create_view("home.md#0", "home.md", ViewSpec::default().with_source("trip.md")).unwrap();
        let events = sink.last_render("home.md#0").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Ferry");
    }
}
