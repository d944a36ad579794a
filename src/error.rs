use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum IndexctlError {
    #[error("Indices are out of sync with declarations. Indices: [{}]. Declarations: [{}]", .live.join(","), .declared.join(","))]
    Inconsistent {
        live: Vec<String>,
        declared: Vec<String>,
    },

    #[error("Could not create index {index}: {reason}")]
    Create { index: String, reason: String },

    #[error("Could not migrate {source_index} -> {destination}: {reason}")]
    Migration {
        source_index: String,
        destination: String,
        reason: String,
    },

    #[error("Could not delete index {index}: {reason}")]
    Delete { index: String, reason: String },

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Could not scale down service {service}: {reason}")]
    Scale { service: String, reason: String },

    #[error("Invalid declaration: {0}")]
    Declaration(String),

    #[error("Declarations [{}] all map to index {name}", .files.join(","))]
    DuplicateDeclaration { name: String, files: Vec<String> },

    #[error("No declaration files found in {0}")]
    NoDeclarations(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{} failures: {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<IndexctlError>),
}

pub type Result<T> = std::result::Result<T, IndexctlError>;

impl From<std::io::Error> for IndexctlError {
    fn from(e: std::io::Error) -> Self {
        IndexctlError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for IndexctlError {
    fn from(e: serde_json::Error) -> Self {
        IndexctlError::Json(e.to_string())
    }
}

impl IndexctlError {
    /// Collapse the failures of one fan-out phase into a single error.
    /// Returns `None` when the phase had no failures.
    pub fn collect(mut errors: Vec<IndexctlError>) -> Option<IndexctlError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(IndexctlError::Multiple(errors)),
        }
    }

    /// Process exit code for the surrounding CLI. Inconsistent naming gets its
    /// own code so deploy pipelines can tell it apart from transient failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            IndexctlError::Inconsistent { .. } => 2,
            IndexctlError::Multiple(errors)
                if errors
                    .iter()
                    .any(|e| matches!(e, IndexctlError::Inconsistent { .. })) =>
            {
                2
            }
            _ => 1,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            IndexctlError::Inconsistent { .. } => "drift",
            IndexctlError::Create { .. } => "create",
            IndexctlError::Migration { .. } => "migrate",
            IndexctlError::Delete { .. } => "delete",
            IndexctlError::Cluster(_) => "cluster",
            IndexctlError::Scale { .. } => "scale",
            IndexctlError::Declaration(_)
            | IndexctlError::DuplicateDeclaration { .. }
            | IndexctlError::NoDeclarations(_) => "declarations",
            IndexctlError::Io(_) | IndexctlError::Json(_) => "io",
            IndexctlError::Config(_) => "config",
            IndexctlError::Multiple(_) => "multiple",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── exit_code mapping ───────────────────────────────────────────────

    #[test]
    fn inconsistent_exits_2() {
        let e = IndexctlError::Inconsistent {
            live: vec!["a".into()],
            declared: vec!["b".into()],
        };
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn create_exits_1() {
        let e = IndexctlError::Create {
            index: "a".into(),
            reason: "exists".into(),
        };
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn multiple_containing_inconsistent_exits_2() {
        let e = IndexctlError::Multiple(vec![
            IndexctlError::Cluster("down".into()),
            IndexctlError::Inconsistent {
                live: vec![],
                declared: vec![],
            },
        ]);
        assert_eq!(e.exit_code(), 2);
    }

    // ── collect ─────────────────────────────────────────────────────────

    #[test]
    fn collect_empty_is_none() {
        assert!(IndexctlError::collect(vec![]).is_none());
    }

    #[test]
    fn collect_single_is_unwrapped() {
        let e = IndexctlError::collect(vec![IndexctlError::Cluster("x".into())]).unwrap();
        assert!(matches!(e, IndexctlError::Cluster(_)));
    }

    #[test]
    fn collect_many_is_multiple() {
        let e = IndexctlError::collect(vec![
            IndexctlError::Delete {
                index: "a".into(),
                reason: "gone".into(),
            },
            IndexctlError::Delete {
                index: "b".into(),
                reason: "gone".into(),
            },
        ])
        .unwrap();
        match e {
            IndexctlError::Multiple(inner) => assert_eq!(inner.len(), 2),
            other => panic!("expected Multiple, got {:?}", other),
        }
    }

    // ── Display ─────────────────────────────────────────────────────────

    #[test]
    fn inconsistent_message_lists_both_sides() {
        let e = IndexctlError::Inconsistent {
            live: vec!["a".into(), "b".into()],
            declared: vec!["a".into(), "c".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("[a,b]"));
        assert!(msg.contains("[a,c]"));
    }

    #[test]
    fn migration_message_names_both_indices() {
        let e = IndexctlError::Migration {
            source_index: "v1".into(),
            destination: "v2".into(),
            reason: "task failed".into(),
        };
        assert_eq!(e.to_string(), "Could not migrate v1 -> v2: task failed");
    }

    #[test]
    fn phase_labels() {
        assert_eq!(
            IndexctlError::Delete {
                index: "a".into(),
                reason: "r".into()
            }
            .phase(),
            "delete"
        );
        assert_eq!(IndexctlError::NoDeclarations("/m".into()).phase(), "declarations");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: IndexctlError = io.into();
        assert!(matches!(e, IndexctlError::Io(_)));
    }
}
