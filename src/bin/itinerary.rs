use anyhow::{Context, Result, bail};
use itinerary::config::Config;
use itinerary::context::{AppContext, StandardContext};
use itinerary::engine::Engine;
use itinerary::extractor::{Extractor, YamlRecordParser, fenced_blocks};
use itinerary::logging;
use itinerary::sink::{PresentationSink, RenderFrame};
use itinerary::store::{DocumentStore, VaultStore};
use itinerary::system::EngineHandle;
use itinerary::view::ViewHandle;
use serde_json::json;
use std::env;
use std::path::PathBuf;

/// Prints each rendered view as one JSON line on stdout.
struct JsonLinesSink;

impl PresentationSink for JsonLinesSink {
    fn render(&mut self, view: &ViewHandle, frame: &RenderFrame<'_>) {
        let line = json!({
            "view": view.key(),
            "events": frame.events,
            "options": frame.options,
            "debug": frame.debug_messages,
        });
        println!("{}", line);
    }

    fn render_error(&mut self, view_key: &str, message: &str) {
        println!("{}", json!({ "view": view_key, "error": message }));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h" || a == "help") {
        print_help();
        return Ok(());
    }

    let verbose = take_flag(&mut args, &["--verbose", "-v"]);
    let root = take_option(&mut args, "--root")?.map(PathBuf::from);

    let ctx = StandardContext::new(root);
    let config = Config::load_or_default(&ctx)?;
    logging::init(logging::level_for(config.level_filter()?, verbose))?;

    let (command, vault, document) = match args.as_slice() {
        [command, vault, document] => (command.as_str(), PathBuf::from(vault), document.clone()),
        [command, document] => {
            let vault = ctx
                .get_default_vault_dir()
                .context("No default vault directory")?;
            (command.as_str(), vault, document.clone())
        }
        _ => bail!("Expected <command> [vault] <document>; see --help"),
    };
    let store = VaultStore::new(&vault)?;

    match command {
        "events" => print_events(&store, &config, &document),
        "render" => render_views(store, &config, &document).await,
        other => bail!("Unknown command '{}'; see --help", other),
    }
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    let before = args.len();
    args.retain(|a| !names.contains(&a.as_str()));
    args.len() != before
}

fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} requires a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn print_events(store: &VaultStore, config: &Config, document: &str) -> Result<()> {
    let settings = config.engine_settings()?;
    let extractor = Extractor::new(
        &settings.event_block_tag,
        Box::new(YamlRecordParser),
        settings.normalize,
    )?;
    let text = store.read(document)?;
    let report = extractor.extract_report(&text);
    for skipped in &report.skipped {
        log::warn!("{}: skipped block: {}", document, skipped);
    }
    println!("{}", serde_json::to_string_pretty(&report.events)?);
    Ok(())
}

async fn render_views(store: VaultStore, config: &Config, document: &str) -> Result<()> {
    let text = store.read(document)?;
    let blocks: Vec<String> = fenced_blocks(&text, &config.view_block_tag)
        .into_iter()
        .map(str::to_string)
        .collect();
    if blocks.is_empty() {
        log::info!("'{}' has no {} blocks", document, config.view_block_tag);
        return Ok(());
    }

    let engine = Engine::new(
        Box::new(store),
        Box::new(JsonLinesSink),
        config.engine_settings()?,
    )?;
    let handle = EngineHandle::spawn(engine);
    for (idx, block) in blocks.into_iter().enumerate() {
        let key = format!("{}#{}", document, idx);
        // Failures are reported through the sink; keep going with the next block
        if let Err(e) = handle.create_view(key, document, block).await {
            log::debug!("{}", e);
        }
    }
    handle.shutdown().await?;
    Ok(())
}

fn print_help() {
    println!(
        "Itinerary v{} - Aggregate calendar events from markdown notes",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    itinerary events [vault] <document>   Print the events of a document as JSON");
    println!("    itinerary render [vault] <document>   Evaluate every view block of a document");
    println!("    itinerary --help                      Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --root <dir>      Keep config and data under <dir>");
    println!("    -v, --verbose     Debug logging");
    println!();
    println!("Documents are paths relative to the vault, e.g. Trips/Japan.md.");
    println!("Without a vault argument the vault under the data directory is used.");
}
