pub mod cluster;
pub mod declaration;
pub mod drift;
pub mod error;
pub mod migration;
pub mod reconcile;
pub mod run;
pub mod scale;

pub use cluster::{
    BulkCopyStarted, ClusterAccessor, IndexMetadata, TaskProgress, TaskStatus,
    AUTO_CREATE_INDEX_SETTING,
};
pub use declaration::{Declaration, DeclarationSet, NamingScheme};
pub use drift::{needs_reconciliation, DriftPolicy, DriftReport};
pub use error::{IndexctlError, Result};
pub use migration::{MigrationDriver, MigrationOutcome, MigrationState};
pub use reconcile::{ReconcilePlan, ReconcileReport, Reconciler};
pub use run::{run_once, RunOptions, RunOutcome};
pub use scale::ServiceScaler;
