// File: tests/view_refresh.rs
use itinerary::engine::{Engine, EngineSettings};
use itinerary::model::ViewSpec;
use itinerary::sink::CollectingSink;
use itinerary::store::MemoryStore;
use itinerary::view::ViewPhase;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_millis(250);

fn event(title: &str, tag: &str) -> String {
    format!("```itinerary-event\ntitle: {}\ntag: {}\nstart: 2024-05-01\n```\n", title, tag)
}

fn setup() -> (MemoryStore, CollectingSink, Engine) {
    let store = MemoryStore::with_documents([
        ("a.md", event("A1", "work")),
        ("b.md", event("B1", "home")),
        ("home.md", "# Overview\n".to_string()),
    ]);
    let sink = CollectingSink::new();
    let settings = EngineSettings {
        quiet_window: WINDOW,
        ..Default::default()
    };
    let engine = Engine::new(Box::new(store.clone()), Box::new(sink.clone()), settings).unwrap();
    (store, sink, engine)
}

fn titles(sink: &CollectingSink, key: &str) -> Vec<String> {
    sink.last_render(key)
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.title)
        .collect()
}

#[test]
fn test_changing_one_source_keeps_the_other_cached() {
    let (store, sink, mut engine) = setup();
    let spec = ViewSpec::default().with_source("a.md").with_source("b.md");
    let view = engine.create_view("home.md#0", "home.md", spec).unwrap();
    assert_eq!(titles(&sink, "home.md#0"), vec!["A1", "B1"]);

    let b_before = engine.cache().get("b.md");
    let t0 = Instant::now();
    store.insert("a.md", event("A2", "work"));
    assert_eq!(engine.notify_changed("a.md", t0).unwrap(), vec![view.clone()]);

    // Nothing happens inside the quiet window
    assert!(engine.fire_due(t0 + WINDOW / 2).is_empty());
    assert_eq!(sink.render_count("home.md#0"), 1);

    assert_eq!(engine.fire_due(t0 + WINDOW), vec![view]);
    assert_eq!(titles(&sink, "home.md#0"), vec!["A2", "B1"]);
    assert!(std::sync::Arc::ptr_eq(&b_before, &engine.cache().get("b.md")));
}

#[test]
fn test_rapid_changes_coalesce_into_one_recompute() {
    let (store, sink, mut engine) = setup();
    let view = engine
        .create_view("home.md#0", "home.md", ViewSpec::default().with_source("a.md"))
        .unwrap();

    let t0 = Instant::now();
    for (i, title) in ["A2", "A3", "A4"].iter().enumerate() {
        store.insert("a.md", event(title, "work"));
        engine
            .notify_changed("a.md", t0 + Duration::from_millis(100 * i as u64))
            .unwrap();
    }
    assert_eq!(engine.scheduler().len(), 1);

    // The first two deadlines were cancelled
    assert!(engine.fire_due(t0 + WINDOW + Duration::from_millis(100)).is_empty());
    assert_eq!(engine.fire_due(t0 + WINDOW + Duration::from_millis(200)), vec![view]);
    assert!(engine.fire_due(t0 + WINDOW * 10).is_empty());

    // Initial render plus exactly one refresh
    assert_eq!(sink.render_count("home.md#0"), 2);
    assert_eq!(titles(&sink, "home.md#0"), vec!["A4"]);
}

#[test]
fn test_filter_chain_is_a_conjunction() {
    let (_store, sink, mut engine) = setup();
    let both = ViewSpec::default().with_source("a.md").with_source("b.md");

    engine
        .create_view("v#true", "home.md", both.clone().with_filter("true").with_filter("true"))
        .unwrap();
    engine
        .create_view("v#mixed", "home.md", both.clone().with_filter("true").with_filter("false"))
        .unwrap();
    engine
        .create_view("v#mixed2", "home.md", both.clone().with_filter("false").with_filter("true"))
        .unwrap();
    engine
        .create_view("v#tag", "home.md", both.with_filter("true").with_filter("'work' in tags"))
        .unwrap();

    assert_eq!(titles(&sink, "v#true"), vec!["A1", "B1"]);
    assert!(titles(&sink, "v#mixed").is_empty());
    assert!(titles(&sink, "v#mixed2").is_empty());
    assert_eq!(titles(&sink, "v#tag"), vec!["A1"]);
}

#[test]
fn test_teardown_then_notify_is_silent() {
    let (store, sink, mut engine) = setup();
    let view = engine
        .create_view("home.md#0", "home.md", ViewSpec::default().with_source("a.md"))
        .unwrap();

    let t0 = Instant::now();
    engine.notify_changed("a.md", t0).unwrap();
    assert!(engine.teardown_view(&view));
    assert_eq!(engine.phase(&view), ViewPhase::TornDown);
    assert!(!engine.scheduler().is_pending("home.md#0"));

    store.insert("a.md", event("A2", "work"));
    let scheduled = engine.notify_changed("a.md", t0 + Duration::from_millis(10)).unwrap();
    assert!(scheduled.is_empty());
    assert!(engine.fire_due(t0 + WINDOW * 4).is_empty());
    assert!(engine.recompute(&view).is_none());

    assert_eq!(sink.render_count("home.md#0"), 1);
    // The cache entry outlives its last subscriber
    assert_eq!(engine.cache().get("a.md")[0].title, "A2");
}

#[test]
fn test_unchanged_inputs_skip_the_sink() {
    let (_store, sink, mut engine) = setup();
    let view = engine
        .create_view("home.md#0", "home.md", ViewSpec::default().with_source("a.md"))
        .unwrap();

    let again = engine.recompute(&view).unwrap();
    assert!(!again.changed);
    assert_eq!(again.events.len(), 1);
    assert_eq!(sink.render_count("home.md#0"), 1);
}

#[test]
fn test_missing_source_keeps_previous_events() {
    let (store, sink, mut engine) = setup();
    let view = engine
        .create_view("home.md#0", "home.md", ViewSpec::default().with_source("a.md"))
        .unwrap();

    store.remove("a.md");
    let err = engine.notify_changed("a.md", Instant::now()).unwrap_err();
    assert!(!err.is_fatal_to_view());
    assert!(!engine.scheduler().is_pending(view.key()));
    assert_eq!(engine.cache().get("a.md")[0].title, "A1");
    assert!(sink.errors().is_empty());
}

#[test]
fn test_debug_view_hands_messages_to_the_sink() {
    let (_store, sink, mut engine) = setup();
    let spec = ViewSpec::parse("source: [a.md, b.md]\nfilter: \"'home' in tags\"\ndebug: true\ninitialView: listWeek")
        .unwrap();
    engine.create_view("home.md#0", "home.md", spec).unwrap();

    let Some(itinerary::sink::SinkEvent::Rendered { debug_messages, events, .. }) =
        sink.events().into_iter().last()
    else {
        panic!("expected a render");
    };
    assert_eq!(events.len(), 1);
    assert!(debug_messages.contains(&"Event 'A1' failed filter #0".to_string()));
    assert!(debug_messages.contains(&"Event 'B1' passed all filters".to_string()));
}

#[test]
fn test_hidden_events_reach_the_sink_flagged() {
    let (store, sink, mut engine) = setup();
    let hidden = "```itinerary-event\ntitle: Layover\nhidden: true\nstart: 2024-05-01T09:00:00Z\n```\n";
    store.insert("a.md", event("A1", "work") + hidden);
    let view = engine
        .create_view("home.md#0", "home.md", ViewSpec::default().with_source("a.md"))
        .unwrap();

    let events = sink.last_render("home.md#0").unwrap();
    let flags: Vec<_> = events.iter().map(|e| (e.title.as_str(), e.hidden)).collect();
    assert_eq!(flags, vec![("A1", false), ("Layover", true)]);

    // Unhiding is a change like any other
    let t0 = Instant::now();
    store.insert("a.md", event("A1", "work") + &hidden.replace("hidden: true", "hidden: false"));
    engine.notify_changed("a.md", t0).unwrap();
    assert_eq!(engine.fire_due(t0 + WINDOW), vec![view]);
    let events = sink.last_render("home.md#0").unwrap();
    assert!(events.iter().all(|e| !e.hidden));
    assert_eq!(titles(&sink, "home.md#0"), vec!["A1", "Layover"]);
}
