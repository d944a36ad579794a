//! Bring the live indices in line with the declarations.
//!
//! One pass runs three phases in order: create missing indices, backfill each
//! new index from the most recent pre-existing one, then delete indices that
//! are no longer declared. Work inside a phase runs concurrently and every
//! outcome is collected before the next phase starts. Deletion only happens
//! when every creation and migration succeeded, so a logical dataset is never
//! left without an index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::cluster::{ClusterAccessor, IndexMetadata};
use crate::declaration::DeclarationSet;
use crate::error::{IndexctlError, Result};
use crate::migration::{MigrationDriver, MigrationOutcome};

pub const DEFAULT_NUMBER_OF_SHARDS: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_create: Vec<String>,
    pub to_delete: Vec<String>,
    /// Most recently created index that existed before this run.
    pub migration_source: Option<String>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Latest index by creation date. Equal dates resolve to the greatest name.
pub fn most_recent_index(metadata: &BTreeMap<String, IndexMetadata>) -> Option<String> {
    metadata
        .iter()
        .max_by(|(a_name, a), (b_name, b)| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a_name.cmp(b_name))
        })
        .map(|(name, _)| name.clone())
}

/// Compute what one reconciliation pass has to do. Pure; no cluster access.
pub fn plan(
    declared: &[String],
    live: &[String],
    metadata: &BTreeMap<String, IndexMetadata>,
) -> ReconcilePlan {
    let declared: BTreeSet<&String> = declared.iter().collect();
    let live: BTreeSet<&String> = live.iter().collect();

    ReconcilePlan {
        to_create: declared.difference(&live).map(|s| s.to_string()).collect(),
        to_delete: live.difference(&declared).map(|s| s.to_string()).collect(),
        migration_source: most_recent_index(metadata),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub migrations: Vec<MigrationOutcome>,
    pub deleted: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.migrations.is_empty() && self.deleted.is_empty()
    }
}

pub struct Reconciler {
    accessor: Arc<dyn ClusterAccessor>,
    driver: MigrationDriver,
    default_shards: u32,
}

impl Reconciler {
    pub fn new(accessor: Arc<dyn ClusterAccessor>, driver: MigrationDriver) -> Self {
        Self {
            accessor,
            driver,
            default_shards: DEFAULT_NUMBER_OF_SHARDS,
        }
    }

    pub fn with_default_shards(mut self, shards: u32) -> Self {
        self.default_shards = shards;
        self
    }

    /// Read live state and compute the plan for `desired`.
    pub async fn plan(&self, desired: &DeclarationSet) -> Result<ReconcilePlan> {
        let live = self.accessor.list_index_names().await?;
        let metadata = if live.is_empty() {
            BTreeMap::new()
        } else {
            self.accessor.index_metadata(&live).await?
        };
        let plan = plan(&desired.names(), &live, &metadata);

        tracing::info!(
            existing = %live.join(","),
            latest = plan.migration_source.as_deref().unwrap_or(""),
            "Existing indices"
        );
        Ok(plan)
    }

    pub async fn reconcile(&self, desired: &DeclarationSet) -> Result<ReconcileReport> {
        let plan = self.plan(desired).await?;
        if plan.is_noop() {
            tracing::info!("Indices already match declarations");
            return Ok(ReconcileReport::default());
        }

        let mut errors = Vec::new();
        let created = self.create_all(desired, &plan.to_create, &mut errors).await;
        let migrations = self
            .migrate_all(plan.migration_source.as_deref(), &created, &mut errors)
            .await;

        if !errors.is_empty() {
            if !plan.to_delete.is_empty() {
                tracing::warn!(
                    orphaned = %plan.to_delete.join(","),
                    failures = errors.len(),
                    "Skipping deletion of orphaned indices after failed creation or migration"
                );
            }
            return Err(IndexctlError::collect(errors).unwrap_or_else(|| {
                IndexctlError::Cluster("reconciliation failed".to_string())
            }));
        }

        tracing::info!(orphaned = %plan.to_delete.join(","), "Orphaned indices");
        let deleted = self.delete_all(&plan.to_delete, &mut errors).await;
        if let Some(err) = IndexctlError::collect(errors) {
            return Err(err);
        }

        Ok(ReconcileReport {
            created,
            migrations,
            deleted,
        })
    }

    async fn create_all(
        &self,
        desired: &DeclarationSet,
        names: &[String],
        errors: &mut Vec<IndexctlError>,
    ) -> Vec<String> {
        let mut join_set = JoinSet::new();
        for name in names {
            let Some(declaration) = desired.get(name) else {
                continue;
            };
            let accessor = Arc::clone(&self.accessor);
            let name = name.clone();
            let mappings = declaration.mappings.clone();
            let settings = declaration.index_settings(self.default_shards);
            tracing::info!(index = %name, "Creating new index");
            join_set.spawn(async move {
                let result = accessor.create_index(&name, &mappings, &settings).await;
                (name, result)
            });
        }

        let mut created = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(_))) => {
                    tracing::info!(index = %name, "Created index");
                    created.push(name);
                }
                Ok((name, Err(e))) => {
                    tracing::error!(index = %name, error = %e, "Could not create index");
                    errors.push(IndexctlError::Create {
                        index: name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => errors.push(IndexctlError::Cluster(format!(
                    "Create task join error: {}",
                    e
                ))),
            }
        }
        created.sort();
        created
    }

    async fn migrate_all(
        &self,
        source: Option<&str>,
        destinations: &[String],
        errors: &mut Vec<IndexctlError>,
    ) -> Vec<MigrationOutcome> {
        let mut join_set = JoinSet::new();
        for destination in destinations {
            let accessor = Arc::clone(&self.accessor);
            let driver = self.driver.clone();
            let source = source.map(str::to_string);
            let destination = destination.clone();
            join_set.spawn(async move {
                driver
                    .migrate(accessor.as_ref(), source.as_deref(), &destination)
                    .await
            });
        }

        let mut outcomes = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(IndexctlError::Cluster(format!(
                    "Migration task join error: {}",
                    e
                ))),
            }
        }
        outcomes.sort_by(|a, b| destination_of(a).cmp(destination_of(b)));
        outcomes
    }

    async fn delete_all(&self, names: &[String], errors: &mut Vec<IndexctlError>) -> Vec<String> {
        let mut join_set = JoinSet::new();
        for name in names {
            let accessor = Arc::clone(&self.accessor);
            let name = name.clone();
            join_set.spawn(async move {
                let result = accessor.delete_index(&name).await;
                (name, result)
            });
        }

        let mut deleted = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(index = %name, "Deleted index");
                    deleted.push(name);
                }
                Ok((name, Err(e))) => {
                    tracing::error!(index = %name, error = %e, "Could not delete index");
                    errors.push(IndexctlError::Delete {
                        index: name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => errors.push(IndexctlError::Cluster(format!(
                    "Delete task join error: {}",
                    e
                ))),
            }
        }
        deleted.sort();
        deleted
    }
}

fn destination_of(outcome: &MigrationOutcome) -> &str {
    match outcome {
        MigrationOutcome::Skipped { destination } => destination,
        MigrationOutcome::Completed { destination, .. } => destination,
    }
}
