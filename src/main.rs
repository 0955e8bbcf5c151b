use clap::Parser;
use docwell::{
    ColbertEmbedder,
    FlatIndex,
    MetadataStore,
    ModelManager,
    Retriever,
    RetrieverConfig,
    cli::{Cli, Command, SearchArgs},
    error,
    mcp,
    retriever::Passage,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCWELL_LOG") {
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

    let config = RetrieverConfig::resolve(&cli.overrides())?;

    match cli.command {
        Command::Index(args) => {
            let mut retriever = open_retriever(config, cli.model)?;
            retriever.load_or_build(args.force)?;
            println!(
                "Indexed {} chunks in {}",
                retriever.len(),
                retriever.config().output_dir.display()
            );
        }
        Command::Search(args) => {
            let mut retriever = open_retriever(config, cli.model)?;
            retriever.load_or_build(false)?;
            cmd_search(&retriever, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&config, cli.model, args.json)?;
        }
        Command::Mcp => {
            let mut retriever = open_retriever(config, cli.model)?;
            retriever.load_or_build(false)?;
            mcp::run_mcp(retriever)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_retriever(
    config: RetrieverConfig,
    model: Option<String>,
) -> error::Result<Retriever> {
    let embedder = ColbertEmbedder::new(ModelManager::resolve(model));
    Ok(Retriever::new(config, Box::new(embedder)))
}

fn cmd_search(retriever: &Retriever, args: &SearchArgs) -> error::Result<()> {
    let passages = retriever.search_passages(&args.query, args.count)?;

    if args.json {
        let output = json!({
            "query": args.query,
            "result_count": passages.len(),
            "results": passages,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        format_human(&passages);
    }
    Ok(())
}

fn format_human(passages: &[Passage]) {
    if passages.is_empty() {
        println!("No results.");
        return;
    }

    for (i, passage) in passages.iter().enumerate() {
        match passage.distance {
            Some(distance) => println!(
                "{:>3}. {} [{}] (distance {distance:.4})",
                i + 1,
                passage.source,
                passage.position
            ),
            None => println!(
                "{:>3}. {} [{}]",
                i + 1,
                passage.source,
                passage.position
            ),
        }
        println!("     {}", passage.text);
    }
}

/// Report configuration and snapshot contents without loading the model.
fn cmd_status(
    config: &RetrieverConfig,
    model: Option<String>,
    json: bool,
) -> error::Result<()> {
    let model_name = ModelManager::resolve(model).model_id().to_string();

    let index_path = config.index_path();
    let metadata_path = config.metadata_path();
    let snapshot_exists = index_path.is_file() && metadata_path.is_file();

    let (chunks, dimension) = if snapshot_exists {
        let metadata = MetadataStore::load(&metadata_path)?;
        let index = FlatIndex::load(&index_path)?;
        (Some(metadata.len()), Some(index.dimension()))
    } else {
        (None, None)
    };

    if json {
        let output = json!({
            "input_dir": config.input_dir,
            "data_dir": config.output_dir,
            "model": model_name,
            "target_chunk_tokens": config.target_chunk_tokens,
            "window_size": config.window_size,
            "indexed": snapshot_exists,
            "chunks": chunks,
            "dimension": dimension,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Input directory: {}", config.input_dir.display());
        println!("Data directory: {}", config.output_dir.display());
        println!("Model: {model_name}");
        println!("Target chunk tokens: {}", config.target_chunk_tokens);
        println!("Window size: {}", config.window_size);
        match (chunks, dimension) {
            (Some(chunks), Some(dimension)) => {
                println!("Chunks: {chunks} ({dimension}-dimensional)");
            }
            _ => println!("Index: not built"),
        }
    }
    Ok(())
}
