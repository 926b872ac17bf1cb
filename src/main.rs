use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use irdex::{
    cli::{CheckArgs, Cli, Command, IndexArgs, SearchArgs, UpdateArgs},
    config::{IndexConfig, SETTINGS_KEY},
    data_dir::DataDir,
    error::{self, Error},
    indexer::{self, IndexReport, IndexSession, Operation},
    posting::PostingList,
    query::QueryEngine,
    search,
    store::{Store, StoreKind},
    walker,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("IRDEX_LOG") {
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

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config =
        IndexConfig::resolve(cli.config.as_deref(), &data_dir.config_file())?;

    match cli.command {
        Command::Index(args) => cmd_index(&data_dir, config, &args)?,
        Command::Update(args) => cmd_update(&data_dir, config, &args)?,
        Command::Check(args) => {
            let clean = cmd_check(&data_dir, config, &args)?;
            if !clean {
                std::process::exit(1);
            }
        }
        Command::Search(args) => cmd_search(&data_dir, config, &args)?,
        Command::Dump => cmd_dump(&data_dir, config.dimension)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_stores(
    data_dir: &DataDir,
    capacity: usize,
    read_only: bool,
) -> error::Result<(Store, Store)> {
    if read_only && !data_dir.has_index() {
        return Err(Error::NotFound {
            kind: "index",
            name: data_dir.root().display().to_string(),
        });
    }
    let names =
        Store::open(&data_dir.names_db(), StoreKind::Names, capacity, read_only)?;
    let words =
        Store::open(&data_dir.words_db(), StoreKind::Words, capacity, read_only)?;
    Ok((names, words))
}

/// The configuration an existing index was built with, if any.
fn stored_config(names: &Store) -> error::Result<Option<IndexConfig>> {
    names
        .get_setting(SETTINGS_KEY)?
        .map(|json| IndexConfig::from_json(&json))
        .transpose()
}

fn document_root(
    explicit: Option<&Path>,
    config: &IndexConfig,
) -> error::Result<PathBuf> {
    let dir = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.directory.clone())
        .ok_or_else(|| {
            Error::Config(
                "no document directory given and none configured".into(),
            )
        })?;
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            dir.display()
        )));
    }
    Ok(dir.canonicalize()?)
}

fn reorganize(names: Store, words: Store) -> error::Result<()> {
    names.close_and_reorganize()?;
    words.close_and_reorganize()?;
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!(
        "{} document(s), {} word posting(s) written",
        report.documents, report.words_written
    );
    if report.skipped > 0 {
        println!("{} file(s) skipped", report.skipped);
    }
    if report.not_found > 0 {
        println!("{} document(s) not in the index", report.not_found);
    }
}

fn cmd_index(
    data_dir: &DataDir,
    mut config: IndexConfig,
    args: &IndexArgs,
) -> error::Result<()> {
    args.overrides.apply(&mut config);
    let root = document_root(args.directory.as_deref(), &config)?;
    config.directory = Some(root.clone());
    config.validate()?;

    // Full rebuild: start from empty stores.
    for path in [data_dir.names_db(), data_dir.words_db()] {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }

    let (names, words) = open_stores(data_dir, config.dimension, false)?;
    let mut session = IndexSession::open(&names, &words, &config)?;
    session.run(Operation::Add, walker::walk(&root)?, !args.no_progress)?;
    let report = session.finish();

    reorganize(names, words)?;
    tracing::info!(root = %root.display(), "index built");
    print_report(&report);
    Ok(())
}

fn cmd_update(
    data_dir: &DataDir,
    config: IndexConfig,
    args: &UpdateArgs,
) -> error::Result<()> {
    if args.is_empty() {
        return Err(Error::Config(
            "update needs at least one of --add, --sub or --del".into(),
        ));
    }

    let (names, words) = open_stores(data_dir, config.dimension, false)?;
    let mut config = stored_config(&names)?.unwrap_or(config);
    args.overrides.apply(&mut config);
    if config.dir_content_as_doc {
        return Err(Error::Config(
            "incremental updates are not supported when directories are \
             indexed as documents"
                .into(),
        ));
    }

    let root = config.directory.clone();
    let mut session = IndexSession::open(&names, &words, &config)?;
    for (op, files) in [
        (Operation::Add, &args.add),
        (Operation::Subtract, &args.subtract),
        (Operation::Delete, &args.delete),
    ] {
        for path in files {
            let name = indexer::document_name(root.as_deref(), path);
            session.process(op, &name, path)?;
        }
    }
    let report = session.finish();

    reorganize(names, words)?;
    print_report(&report);
    Ok(())
}

/// Returns `false` when any document disagrees with the index.
fn cmd_check(
    data_dir: &DataDir,
    config: IndexConfig,
    args: &CheckArgs,
) -> error::Result<bool> {
    let (names, words) = open_stores(data_dir, config.dimension, true)?;
    let config = stored_config(&names)?.unwrap_or(config);
    let root = document_root(args.directory.as_deref(), &config)?;

    let mut session = IndexSession::open(&names, &words, &config)?;
    session.run(Operation::Verify, walker::walk(&root)?, !args.no_progress)?;
    let report = session.finish();

    for mismatch in &report.mismatches {
        println!("{}: {}", mismatch.document, mismatch.detail);
    }
    println!(
        "{} document(s) checked, {} mismatch(es)",
        report.documents,
        report.mismatches.len()
    );
    Ok(report.mismatches.is_empty())
}

fn cmd_search(
    data_dir: &DataDir,
    config: IndexConfig,
    args: &SearchArgs,
) -> error::Result<()> {
    let (names, words) = open_stores(data_dir, config.dimension, true)?;
    let engine = QueryEngine::open(&names, &words)?;

    let page =
        search::execute_search(&engine, &args.query, args.page, args.per_page)?;

    if args.json {
        search::format_json(&page)?;
    } else {
        search::format_human(&page);
    }
    Ok(())
}

fn cmd_dump(data_dir: &DataDir, capacity: usize) -> error::Result<()> {
    let (names, words) = open_stores(data_dir, capacity, true)?;

    println!("# names ({})", names.len()?);
    names.for_each(|id, filename| {
        println!("{id}\t{}", String::from_utf8_lossy(filename));
        Ok(())
    })?;

    println!("# words ({})", words.len()?);
    words.for_each(|word, bytes| {
        let postings: Vec<String> = PostingList::decode(word, bytes)?
            .iter()
            .map(|e| format!("{}:{}", e.doc_id, e.frequency))
            .collect();
        println!("{word}\t{}", postings.join(" "));
        Ok(())
    })?;

    Ok(())
}
