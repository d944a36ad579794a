//! The one-shot deployment step: check drift, quiesce ingestion, reconcile.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{disable_automatic_index_creation, ClusterAccessor};
use crate::declaration::{DeclarationSet, NamingScheme};
use crate::drift::{needs_reconciliation, DriftPolicy, DriftReport};
use crate::error::{IndexctlError, Result};
use crate::migration::{MigrationDriver, DEFAULT_POLL_INTERVAL};
use crate::reconcile::{ReconcileReport, Reconciler, DEFAULT_NUMBER_OF_SHARDS};
use crate::scale::ServiceScaler;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub declarations_dir: PathBuf,
    pub naming: NamingScheme,
    pub drift_policy: DriftPolicy,
    /// Without this only drift detection and scale-down run.
    pub manage_indices: bool,
    pub scale_down_service: Option<String>,
    pub default_shards: u32,
    pub poll_interval: Duration,
}

impl RunOptions {
    pub fn new(declarations_dir: impl Into<PathBuf>) -> Self {
        Self {
            declarations_dir: declarations_dir.into(),
            naming: NamingScheme::default(),
            drift_policy: DriftPolicy::default(),
            manage_indices: true,
            scale_down_service: None,
            default_shards: DEFAULT_NUMBER_OF_SHARDS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    UpToDate,
    /// Drift found but index management is disabled.
    DriftDetected(DriftReport),
    Reconciled(ReconcileReport),
}

/// `scaler` may only be `None` when no scale-down service is configured.
pub async fn run_once(
    options: &RunOptions,
    accessor: Arc<dyn ClusterAccessor>,
    scaler: Option<&dyn ServiceScaler>,
) -> Result<RunOutcome> {
    let scale_down = match (&options.scale_down_service, scaler) {
        (Some(service), Some(scaler)) => Some((service.as_str(), scaler)),
        (Some(service), None) => {
            return Err(IndexctlError::Config(format!(
                "no scaler available to scale down service {service}"
            )))
        }
        (None, _) => None,
    };

    let desired = DeclarationSet::load(&options.declarations_dir, options.naming)?;

    disable_automatic_index_creation(accessor.as_ref()).await?;

    let live = accessor.list_index_names().await?;
    tracing::info!(existing = %live.join(","), "Existing indices");

    let declared = desired.names();
    if !needs_reconciliation(&live, &declared, options.drift_policy)? {
        tracing::info!("indexes up to date");
        return Ok(RunOutcome::UpToDate);
    }

    if let Some((service, scaler)) = scale_down {
        tracing::info!(service = %service, "Scaling down");
        scaler.scale_down(service).await?;
        tracing::info!(service = %service, "Scaling down succeeded");
    }

    if !options.manage_indices {
        let report = DriftReport::between(&live, &declared);
        tracing::warn!(
            missing = %report.missing.join(","),
            orphaned = %report.orphaned.join(","),
            "Index management disabled, leaving drift in place"
        );
        return Ok(RunOutcome::DriftDetected(report));
    }

    let reconciler = Reconciler::new(accessor, MigrationDriver::new(options.poll_interval))
        .with_default_shards(options.default_shards);
    let report = reconciler.reconcile(&desired).await?;
    tracing::info!(
        created = %report.created.join(","),
        deleted = %report.deleted.join(","),
        migrations = report.migrations.len(),
        "Reconciliation complete"
    );
    Ok(RunOutcome::Reconciled(report))
}
