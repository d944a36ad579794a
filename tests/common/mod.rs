use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexctl::cluster::memory::InMemoryCluster;
use indexctl::{ClusterAccessor, DeclarationSet, MigrationDriver, NamingScheme, Reconciler};
use tempfile::TempDir;

pub const FAST_POLL: Duration = Duration::from_millis(5);

/// Write one declaration file per name into a fresh temp dir.
pub fn declarations_dir(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        write_declaration(dir.path(), &format!("{}.json", name));
    }
    dir
}

pub fn write_declaration(dir: &Path, file_name: &str) {
    let body = serde_json::json!({
        "mappings": {
            "properties": {
                "name": {"type": "keyword"}
            }
        },
        "settings": {
            "number_of_replicas": 0
        }
    });
    std::fs::write(dir.join(file_name), serde_json::to_vec_pretty(&body).unwrap()).unwrap();
}

pub fn load(dir: &TempDir) -> DeclarationSet {
    DeclarationSet::load(dir.path(), NamingScheme::StripExtension).unwrap()
}

pub fn reconciler(cluster: &Arc<InMemoryCluster>) -> Reconciler {
    let accessor: Arc<dyn ClusterAccessor> = cluster.clone();
    Reconciler::new(accessor, MigrationDriver::new(FAST_POLL))
}

#[allow(dead_code)]
pub fn bulk_documents(count: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|value| serde_json::json!({"name": format!("name-{}", value)}))
        .collect()
}
