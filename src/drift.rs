use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexctlError, Result};

/// What to do when live indices and declarations have the same count but
/// different names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Any membership difference means the cluster needs reconciling.
    #[default]
    Reconcile,
    /// Same cardinality with different members is an inconsistency error.
    Strict,
}

impl FromStr for DriftPolicy {
    type Err = IndexctlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reconcile" => Ok(DriftPolicy::Reconcile),
            "strict" => Ok(DriftPolicy::Strict),
            other => Err(IndexctlError::Config(format!(
                "unknown drift policy '{}' (expected 'reconcile' or 'strict')",
                other
            ))),
        }
    }
}

/// Names present on one side only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Declared but not live.
    pub missing: Vec<String>,
    /// Live but not declared.
    pub orphaned: Vec<String>,
}

impl DriftReport {
    pub fn between(live: &[String], declared: &[String]) -> Self {
        let live: BTreeSet<&String> = live.iter().collect();
        let declared: BTreeSet<&String> = declared.iter().collect();
        Self {
            missing: declared.difference(&live).map(|s| s.to_string()).collect(),
            orphaned: live.difference(&declared).map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Decide whether the live indices differ from the declared ones.
///
/// Returns `Ok(false)` exactly when both name sets are equal. Under
/// [`DriftPolicy::Strict`], equal counts with different members fail with
/// [`IndexctlError::Inconsistent`].
pub fn needs_reconciliation(
    live: &[String],
    declared: &[String],
    policy: DriftPolicy,
) -> Result<bool> {
    let live_set: BTreeSet<&String> = live.iter().collect();
    let declared_set: BTreeSet<&String> = declared.iter().collect();

    if live_set == declared_set {
        tracing::debug!(indices = %live.join(","), "Indices match declarations");
        return Ok(false);
    }

    if live_set.len() != declared_set.len() {
        tracing::info!(
            live = live_set.len(),
            declared = declared_set.len(),
            "Indices need to be updated"
        );
        return Ok(true);
    }

    match policy {
        DriftPolicy::Reconcile => {
            let report = DriftReport::between(live, declared);
            tracing::info!(
                missing = %report.missing.join(","),
                orphaned = %report.orphaned.join(","),
                "Indices need to be updated"
            );
            Ok(true)
        }
        DriftPolicy::Strict => {
            let live: Vec<String> = live_set.into_iter().cloned().collect();
            let declared: Vec<String> = declared_set.into_iter().cloned().collect();
            tracing::error!(
                indices = %live.join(","),
                declarations = %declared.join(","),
                "Indices and declarations inconsistent"
            );
            Err(IndexctlError::Inconsistent { live, declared })
        }
    }
}
