// File: tests/source_resolution.rs
use itinerary::context::{AppContext, TestContext};
use itinerary::engine::Engine;
use itinerary::error::{EngineError, ResolutionError};
use itinerary::model::ViewSpec;
use itinerary::sink::CollectingSink;
use itinerary::store::{MemoryStore, VaultStore};
use std::fs;

const EVENT: &str = "```itinerary-event\ntitle: Check-in\nstart: 2024-08-01T15:00\n```\n";

#[test]
fn test_ambiguous_symbolic_reference_is_named() {
    let store = MemoryStore::with_documents([
        ("Travel/2023/Trip Plan.md", EVENT),
        ("Travel/2024/Trip Plan.md", EVENT),
        ("Home.md", ""),
    ]);
    let sink = CollectingSink::new();
    let mut engine = Engine::with_defaults(Box::new(store), Box::new(sink.clone())).unwrap();

    let err = engine
        .create_view("Home.md#0", "Home.md", ViewSpec::default().with_source("[[Trip Plan]]"))
        .unwrap_err();

    match &err {
        EngineError::SourceResolution(ResolutionError::Ambiguous { reference, candidates }) => {
            assert_eq!(reference, "[[Trip Plan]]");
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("[[Trip Plan]]"));
    assert_eq!(sink.errors(), vec![err.to_string()]);
    assert!(engine.graph().is_empty());
}

#[test]
fn test_sibling_document_wins_over_base_name() {
    let store = MemoryStore::with_documents([
        ("Travel/2023/Trip Plan.md", EVENT),
        ("Travel/2024/Trip Plan.md", EVENT),
        ("Travel/2024/Overview.md", ""),
    ]);
    let sink = CollectingSink::new();
    let mut engine = Engine::with_defaults(Box::new(store), Box::new(sink.clone())).unwrap();

    let view = engine
        .create_view(
            "Overview#0",
            "Travel/2024/Overview.md",
            ViewSpec::default().with_source("[[Trip Plan|the plan]]"),
        )
        .unwrap();
    assert_eq!(
        engine.view(&view).unwrap().sources(),
        ["Travel/2024/Trip Plan.md".to_string()]
    );
}

#[test]
fn test_vault_documents_feed_views() {
    let ctx = TestContext::new();
    let root = ctx.get_data_dir().unwrap();
    fs::create_dir_all(root.join("Trips")).unwrap();
    fs::create_dir_all(root.join(".obsidian")).unwrap();
    fs::write(root.join("Trips/Japan.md"), EVENT).unwrap();
    fs::write(root.join(".obsidian/ignored.md"), EVENT).unwrap();
    fs::write(root.join("Index.md"), "```itinerary\nsource: \"[[Japan]]\"\n```\n").unwrap();

    let sink = CollectingSink::new();
    let store = VaultStore::new(&root).unwrap();
    let mut engine = Engine::with_defaults(Box::new(store), Box::new(sink.clone())).unwrap();

    engine
        .create_view_from_block("Index.md#0", "Index.md", "source: \"[[Japan]]\"")
        .unwrap();
    let events = sink.last_render("Index.md#0").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Check-in");

    let err = engine
        .create_view("Index.md#1", "Index.md", ViewSpec::default().with_source("Trips/Korea.md"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Itinerary source 'Trips/Korea.md' could not be found.");
}
