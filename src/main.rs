use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vacina_normalizer::config::Config;
use vacina_normalizer::rpc::SupabaseRpc;
use vacina_normalizer::server::{self, AppState};
use vacina_normalizer::sources::{DataSource, LocalFileSource, RestSource, RowSource};
use vacina_normalizer::{etl, logging, metrics, Normalizer, RuleStore};

#[derive(Parser)]
#[command(name = "vacina-normalizer")]
#[command(about = "Normalization and query API over the vaccine distribution dataset")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Add tx_sigla_norm / tx_insumo_norm to a JSON array of records
    Normalize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Rule file (overrides MAPPINGS_PATH)
        #[arg(long)]
        mappings: Option<PathBuf>,
    },
}

fn load_normalizer(path: &Path) -> anyhow::Result<Normalizer> {
    let rules = RuleStore::load(path)
        .with_context(|| format!("loading normalization rules from {}", path.display()))?;
    Ok(Normalizer::new(rules))
}

async fn build_data_source(config: &Config) -> anyhow::Result<DataSource> {
    let local: Arc<dyn RowSource> = Arc::new(LocalFileSource::new(config.local_data_files.clone()));
    let mut source = DataSource::new(config.data_table.clone(), local);

    if let Some(supabase) = &config.supabase {
        info!(host = supabase.host(), "Using Supabase REST for distribution rows");
        source = source.with_rest(Arc::new(RestSource::new(supabase)?));
    }

    #[cfg(feature = "db")]
    if let Some(url) = &config.database_url {
        match vacina_normalizer::sources::PostgresSource::connect(url).await {
            Ok(pool) => source = source.with_database(Arc::new(pool)),
            Err(e) => warn!("Database unavailable, continuing without it: {}", e),
        }
    }
    #[cfg(not(feature = "db"))]
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but this build has no `db` feature; ignoring it");
    }

    Ok(source)
}

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let normalizer = Arc::new(load_normalizer(&config.mappings_path)?);
    info!(rules = normalizer.rules().len(), "Normalization rules loaded");

    if let Some(metrics_port) = config.metrics_port {
        metrics::init_metrics(metrics_port);
    }

    let data = Arc::new(build_data_source(&config).await?);
    info!(source = data.kind().as_str(), table = data.table(), "Data source ready");

    let mut state = AppState::new(normalizer, data);
    if let Some(supabase) = &config.supabase {
        state = state.with_rpc(Arc::new(SupabaseRpc::new(supabase, config.data_table.clone())?));
    }

    server::start_server(state, port, config.cors_origins).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            serve(config, port).await?;
        }
        Commands::Normalize {
            input,
            output,
            mappings,
        } => {
            let path = mappings.unwrap_or_else(|| config.mappings_path.clone());
            let normalizer = load_normalizer(&path)?;
            let summary = etl::run(&normalizer, &input, &output)?;
            info!(
                total = summary.total,
                "Wrote normalized records to {}",
                output.display()
            );
        }
    }
    Ok(())
}
