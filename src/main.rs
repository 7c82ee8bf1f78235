use recall::cli::{Cli, Commands, ConfigAction};
use recall::collections::CollectionRegistry;
use recall::config::{Config, ConfigValidator};
use recall::engine::{RetrievalEngine, RetrievalRequest};
use recall::error::{RecallError, Result};
use recall::providers::{MemoryVectorStore, TracingRecorder};
use recall::routing::CollectionRouter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            query,
            data,
            limit,
            skip_stages,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_query(config, &query, &data, limit, skip_stages, json).await?;
        }
        Commands::Analyze { query } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_analyze(&config, &query)?;
        }
        Commands::Route { query } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_route(&config, &query)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "recall=debug" } else { "recall=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_query(
    config: Config,
    query: &str,
    data: &Path,
    limit: Option<usize>,
    skip_stages: Vec<String>,
    json: bool,
) -> Result<()> {
    let store = MemoryVectorStore::from_json_file(data)?;
    tracing::info!("Loaded {} documents from {:?}", store.document_count(), data);

    let engine = RetrievalEngine::builder(Arc::new(store))
        .config(config)
        .recorder(Arc::new(TracingRecorder))
        .build()?;

    let mut request = RetrievalRequest::new(query);
    request.limit = limit;
    request.skip_stages = skip_stages;
    let response = engine.retrieve(request).await;

    if json {
        println!("{}", to_json(&response, "Failed to serialize response")?);
        return Ok(());
    }

    if let Some(routing) = &response.routing {
        println!(
            "Routing: {:?} ({:.2}) {}",
            routing.strategy,
            routing.confidence,
            routing.vendor_list().join(", ")
        );
    }
    if let Some(rewritten) = &response.rewritten_query {
        println!("Rewritten query: {}", rewritten);
    }
    if let Some(reason) = &response.fallback_reason {
        println!("⚠ Degraded: {}", reason);
    }

    println!(
        "\n{} documents ({} queries, {} ms{}{})",
        response.documents.len(),
        response.retrieval_metadata.queries_executed,
        response.retrieval_metadata.total_duration_ms,
        if response.retrieval_metadata.from_cache { ", cached" } else { "" },
        if response.fast_path { ", fast path" } else { "" },
    );
    for (i, doc) in response.documents.iter().enumerate() {
        println!(
            "  {:>2}. [{}] {:.3}  {}",
            i + 1,
            doc.collection_vendor,
            doc.final_score,
            doc.document.preview(80)
        );
    }

    if !response.context.is_empty() {
        println!("\n{}", response.context);
    }

    Ok(())
}

fn cmd_analyze(config: &Config, query: &str) -> Result<()> {
    let analyzer = config.analyzer.build_analyzer()?;
    let intent = analyzer.analyze(query);
    println!("{}", to_json(&intent, "Failed to serialize intent")?);
    Ok(())
}

fn cmd_route(config: &Config, query: &str) -> Result<()> {
    let registry = Arc::new(config.registry()?);
    let analyzer = config.analyzer.build_analyzer()?;
    let intent = analyzer.analyze(query);

    // heuristic routing never touches the store
    let router = CollectionRouter::new(
        Arc::clone(&registry),
        Arc::new(MemoryVectorStore::new()),
        config.router.clone(),
    )?;
    let routing = router.heuristic_route(query, Some(&intent));
    println!("{}", to_json(&routing, "Failed to serialize routing")?);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| RecallError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    RecallError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };
            println!("{}", to_json(&shown, "Failed to serialize config")?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            let registry = config.registry()?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Collections enabled: {}", registry.enabled().count());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config = Config {
                collections: CollectionRegistry::builtin_defs(),
                ..Config::default()
            };
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::debug!(
            "Config file not found, using defaults. Run 'recall config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn to_json<T: serde::Serialize>(value: &T, context: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| RecallError::Json {
        source: e,
        context: context.to_string(),
    })
}
