use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use indexctl::{
    run_once, ClusterAccessor, DriftPolicy, NamingScheme, RunOptions, RunOutcome, ServiceScaler,
};
use indexctl_cluster::{
    resolve_credentials, AwsCredentials, ClusterConfig, EcsConfig, EcsScaler, ElasticClient,
};

#[derive(Parser)]
#[command(
    name = "indexctl",
    about = "Bring a search cluster's indices in line with a folder of index declarations"
)]
struct Cli {
    /// Cluster endpoint; `https://` is assumed when no scheme is given.
    #[arg(long, env = "ELASTICSEARCH_ENDPOINT")]
    endpoint: String,

    /// Folder holding one JSON declaration per index.
    #[arg(long, env = "INDEX_CONFIG_FOLDER", default_value = "/mappings")]
    declarations: String,

    /// ECS service to scale to zero before indices are rebuilt.
    #[arg(long, env = "SCALE_DOWN_SERVICE")]
    scale_down_service: Option<String>,

    #[arg(long, env = "ECS_CLUSTER")]
    ecs_cluster: Option<String>,

    /// Override the ECS API endpoint (local emulators).
    #[arg(long, env = "ECS_ENDPOINT")]
    ecs_endpoint: Option<String>,

    #[arg(long, env = "AWS_DEFAULT_REGION")]
    region: Option<String>,

    /// Shards for declarations that do not set their own.
    #[arg(long, env = "NUMBER_OF_SHARDS", default_value_t = 1)]
    shards: u32,

    /// Create, migrate and delete indices. Without it drift is only reported.
    #[arg(long, env = "MANAGE_INDICES")]
    manage_indices: bool,

    /// `extension` or `sequence`.
    #[arg(long, env = "NAMING_SCHEME", default_value = "extension")]
    naming_scheme: String,

    /// `reconcile` or `strict`.
    #[arg(long, env = "DRIFT_POLICY", default_value = "reconcile")]
    drift_policy: String,

    #[arg(long, env = "REINDEX_POLL_MS", default_value_t = 3000)]
    reindex_poll_ms: u64,

    #[arg(long, env = "ENV_NAME", default_value = "local")]
    env_name: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "debug")]
    log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug)]
struct RuntimeConfig {
    env_name: String,
    cluster: ClusterConfig,
    ecs: Option<EcsConfig>,
    options: RunOptions,
}

fn resolve_runtime_config(
    cli: &Cli,
    credentials: Option<AwsCredentials>,
) -> Result<RuntimeConfig, String> {
    if cli.endpoint.trim().is_empty() {
        return Err("ELASTICSEARCH_ENDPOINT cannot be empty".to_string());
    }
    if cli.shards == 0 {
        return Err("NUMBER_OF_SHARDS must be at least 1".to_string());
    }
    let naming: NamingScheme = cli.naming_scheme.parse().map_err(|e| format!("{e}"))?;
    let drift_policy: DriftPolicy = cli.drift_policy.parse().map_err(|e| format!("{e}"))?;

    let mut cluster = ClusterConfig::new(&cli.endpoint);
    if let (Some(region), Some(credentials)) = (&cli.region, &credentials) {
        cluster = cluster.with_signing(region, credentials.clone());
    }

    let ecs = match &cli.scale_down_service {
        Some(service) => {
            let region = cli.region.as_deref().ok_or_else(|| {
                format!("AWS_DEFAULT_REGION is required to scale down service {service}")
            })?;
            let mut ecs = EcsConfig::new(region);
            ecs.cluster = cli.ecs_cluster.clone();
            ecs.endpoint = cli.ecs_endpoint.clone();
            ecs.credentials = credentials;
            Some(ecs)
        }
        None => None,
    };

    let mut options = RunOptions::new(&cli.declarations);
    options.naming = naming;
    options.drift_policy = drift_policy;
    options.manage_indices = cli.manage_indices;
    options.scale_down_service = cli.scale_down_service.clone();
    options.default_shards = cli.shards;
    options.poll_interval = Duration::from_millis(cli.reindex_poll_ms);

    Ok(RuntimeConfig {
        env_name: cli.env_name.clone(),
        cluster,
        ecs,
        options,
    })
}

/// `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run(runtime: RuntimeConfig) -> indexctl::Result<RunOutcome> {
    let accessor: Arc<dyn ClusterAccessor> = Arc::new(ElasticClient::new(runtime.cluster)?);
    let scaler = runtime.ecs.map(EcsScaler::new).transpose()?;
    let scaler = scaler.as_ref().map(|s| s as &dyn ServiceScaler);
    run_once(&runtime.options, accessor, scaler).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let credentials = match resolve_credentials().await {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("ERROR: could not resolve AWS credentials: {}", e);
            return ExitCode::from(1);
        }
    };
    let runtime = match resolve_runtime_config(&cli, credentials) {
        Ok(runtime) => runtime,
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            return ExitCode::from(1);
        }
    };
    init_tracing(&cli.log_level, cli.log_format);

    let span = tracing::info_span!("indexctl", env = %runtime.env_name);
    let result = run(runtime).instrument(span.clone()).await;
    let _entered = span.enter();

    match result {
        Ok(RunOutcome::UpToDate) => ExitCode::SUCCESS,
        Ok(RunOutcome::DriftDetected(report)) => {
            tracing::info!(
                missing = report.missing.len(),
                orphaned = report.orphaned.len(),
                "Drift reported, nothing changed"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Reconciled(_)) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(phase = e.phase(), error = %e, "Run failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
