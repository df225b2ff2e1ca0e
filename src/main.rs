use clap::Parser;
use docvec::{
    ConfigDb,
    DataDir,
    Embedder,
    IndexStore,
    error,
    cli::{Cli, Command, ConfigAction, IndexArgs, SearchArgs},
    config::{IndexOverrides, Resolver, SettingKey},
    embedding::{EmbedderKind, load_embedder},
    extract::ExtractorRegistry,
    indexer::{IndexEvent, IndexReport, Indexer, RunOutcome},
    lock::StoreLock,
    search::{self, QueryEngine},
    store::StoreStatus,
};
use kdam::{BarExt, tqdm};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCVEC_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Embedder choice after resolution; the model itself is loaded lazily.
struct EmbedderChoice {
    kind: EmbedderKind,
    model: String,
}

impl EmbedderChoice {
    fn resolve(cli: &Cli, resolver: &Resolver<'_>) -> error::Result<Self> {
        Ok(Self {
            kind: resolver.embedder(cli.embedder)?,
            model: resolver.model(cli.model.as_deref())?,
        })
    }

    fn load(&self) -> Box<dyn Embedder> {
        load_embedder(self.kind, &self.model)
    }
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    // Settings are read up front and the database closed again, so a
    // long indexing run never keeps config.redb locked.
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match &cli.command {
        Command::Index(args) => {
            let resolver = Resolver::new(Some(&config_db));
            let choice = EmbedderChoice::resolve(&cli, &resolver)?;
            let roots = resolver.source_roots(&args.sources)?;
            let settings = resolver.index_settings(&index_overrides(args))?;
            drop(resolver);
            drop(config_db);

            let _lock = StoreLock::acquire(&data_dir.lock_file())?;
            let embedder = choice.load();
            let extractors = ExtractorRegistry::default();
            let indexer = Indexer::new(embedder.as_ref(), &extractors, settings)?;

            let report = run_index(
                &indexer,
                &roots,
                &data_dir.store_dir(),
                !args.no_progress && !cli.quiet,
            )?;
            print_report(&report);
        }
        Command::Search(args) => {
            let choice =
                EmbedderChoice::resolve(&cli, &Resolver::new(Some(&config_db)))?;
            drop(config_db);
            cmd_search(&data_dir, &choice, args)?;
        }
        Command::Status(args) => {
            let resolver = Resolver::new(Some(&config_db));
            cmd_status(&cli, &data_dir, &resolver, args.json)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(&config_db, *json)?,
            ConfigAction::Set { key, value } => {
                config_set(&config_db, key, value)?
            }
            ConfigAction::Unset { key } => config_unset(&config_db, key)?,
        },
        Command::Mcp => {
            let choice =
                EmbedderChoice::resolve(&cli, &Resolver::new(Some(&config_db)))?;
            drop(config_db);
            docvec::mcp::run_mcp(data_dir.store_dir(), choice.load())?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn index_overrides(args: &IndexArgs) -> IndexOverrides {
    IndexOverrides {
        batch_size: args.batch_size,
        file_delay_ms: args.file_delay_ms,
        batch_cooldown_ms: args.batch_cooldown_ms,
        chunk_size: args.chunk_size,
        chunk_overlap: args.chunk_overlap,
        force: args.force,
        exclude: args.exclude.clone(),
    }
}

fn run_index(
    indexer: &Indexer<'_>,
    roots: &[std::path::PathBuf],
    store_dir: &std::path::Path,
    show_progress: bool,
) -> error::Result<IndexReport> {
    let mut bar = None;
    let mut on_event = |event: IndexEvent<'_>| match event {
        IndexEvent::Started { pending } if show_progress => {
            bar = Some(tqdm!(total = pending, desc = "Indexing", unit = " files"));
        }
        IndexEvent::FileIndexed { .. } | IndexEvent::FileFailed { .. } => {
            if let Some(bar) = bar.as_mut() {
                let _ = bar.update(1);
            }
        }
        _ => {}
    };

    let report = indexer.run_in(roots, store_dir, &mut on_event)?;
    if bar.is_some() {
        eprintln!();
    }
    Ok(report)
}

fn print_report(report: &IndexReport) {
    match &report.outcome {
        RunOutcome::Skipped(reason) => {
            println!("Indexing skipped: {reason}");
            return;
        }
        RunOutcome::NothingToDo => {
            println!(
                "Index is up to date ({} files already indexed).",
                report.discovered
            );
            return;
        }
        RunOutcome::Completed => {}
    }

    println!(
        "Indexed {} of {} new files ({} chunks, {} checkpoints).",
        report.files_indexed,
        report.pending,
        report.chunks_added,
        report.checkpoints
    );
    if report.checkpoint_errors > 0 {
        println!(
            "{} checkpoint(s) could not be written; see the log.",
            report.checkpoint_errors
        );
    }
    if !report.failures.is_empty() {
        println!("Failed ({}), will retry on the next run:", report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
}

fn cmd_search(
    data_dir: &DataDir,
    choice: &EmbedderChoice,
    args: &SearchArgs,
) -> error::Result<()> {
    let store = match IndexStore::load(&data_dir.store_dir()) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("index store unavailable: {e}");
            None
        }
    };
    let embedder = choice.load();
    let hits = QueryEngine::new(store.as_ref(), embedder.as_ref())
        .search(&args.query, args.count);

    if args.json {
        println!("{}", search::to_json(&hits, &args.query)?);
    } else {
        search::format_human(&hits);
    }
    Ok(())
}

fn cmd_status(
    cli: &Cli,
    data_dir: &DataDir,
    resolver: &Resolver<'_>,
    json: bool,
) -> error::Result<()> {
    let choice = EmbedderChoice::resolve(cli, resolver)?;
    let roots = resolver.source_roots(&[])?;
    let store = StoreStatus::inspect(&data_dir.store_dir());

    if json {
        let value = serde_json::json!({
            "data_dir": data_dir.root(),
            "embedder": choice.kind.to_string(),
            "model": choice.model,
            "source_roots": roots,
            "store": store,
        });
        println!("{value}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Embedder: {}", choice.kind);
        if choice.kind == EmbedderKind::Colbert {
            println!("Model: {}", choice.model);
        }
        println!("Source roots:");
        for root in &roots {
            let note = if root.is_dir() { "" } else { " (missing)" };
            println!("  {}{note}", root.display());
        }
        println!("Index: {store}");
    }
    Ok(())
}

fn config_show(config_db: &ConfigDb, json: bool) -> error::Result<()> {
    let settings = config_db.list_settings()?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else if settings.is_empty() {
        println!("No settings stored.");
    } else {
        for (key, value) in &settings {
            println!("{key} = {value}");
        }
    }
    Ok(())
}

fn config_set(config_db: &ConfigDb, key: &str, value: &str) -> error::Result<()> {
    let key: SettingKey = key.parse()?;
    key.validate(value)?;
    config_db.set_setting(key.as_str(), value)?;
    println!("{key} = {value}");
    Ok(())
}

fn config_unset(config_db: &ConfigDb, key: &str) -> error::Result<()> {
    let key: SettingKey = key.parse()?;
    if config_db.remove_setting(key.as_str())? {
        println!("Removed {key}.");
    } else {
        println!("{key} was not set.");
    }
    Ok(())
}
