//! Index declarations: one JSON file per desired index.
//!
//! A file either holds the mapping itself or an object with `mappings` and an
//! optional `settings` block. The index name is derived from the file name by
//! a [`NamingScheme`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexctlError, Result};

pub const DECLARATION_EXTENSION: &str = ".json";

/// How a declaration file name maps to a logical index name.
#[derive(Clone, Copy)]
pub enum NamingScheme {
    /// `products.json` -> `products`
    StripExtension,
    /// `products-00001.json` -> `products`
    StripSequence,
    Custom(fn(&str) -> Option<String>),
}

impl Default for NamingScheme {
    fn default() -> Self {
        NamingScheme::StripExtension
    }
}

impl fmt::Debug for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::StripExtension => f.write_str("StripExtension"),
            NamingScheme::StripSequence => f.write_str("StripSequence"),
            NamingScheme::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl FromStr for NamingScheme {
    type Err = IndexctlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "extension" | "strip-extension" => Ok(NamingScheme::StripExtension),
            "sequence" | "strip-sequence" => Ok(NamingScheme::StripSequence),
            other => Err(IndexctlError::Config(format!(
                "unknown naming scheme '{}' (expected 'extension' or 'sequence')",
                other
            ))),
        }
    }
}

impl NamingScheme {
    /// Logical index name for `file_name`, or `None` if the file does not
    /// follow the scheme.
    pub fn index_name(&self, file_name: &str) -> Option<String> {
        match self {
            NamingScheme::StripExtension => strip_extension(file_name).map(str::to_string),
            NamingScheme::StripSequence => {
                let stem = strip_extension(file_name)?;
                let (prefix, sequence) = stem.rsplit_once('-')?;
                if prefix.is_empty()
                    || sequence.is_empty()
                    || !sequence.bytes().all(|b| b.is_ascii_digit())
                {
                    return None;
                }
                Some(prefix.to_string())
            }
            NamingScheme::Custom(f) => f(file_name),
        }
    }
}

fn strip_extension(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(DECLARATION_EXTENSION)
        .filter(|stem| !stem.is_empty())
}

/// Group file names by everything before their last `-` segment.
///
/// `["index-00001.json", "index-00002.json", "another-index-00001.json"]`
/// groups into `index` and `another-index`.
pub fn group_file_names(file_names: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file_name in file_names {
        let prefix = file_name
            .rsplit_once('-')
            .map(|(prefix, _)| prefix)
            .unwrap_or("");
        groups
            .entry(prefix.to_string())
            .or_default()
            .push(file_name.clone());
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub file_name: String,
    pub mappings: serde_json::Value,
    pub settings: Option<serde_json::Value>,
}

impl Declaration {
    /// Build a declaration from a parsed file body.
    pub fn from_document(
        name: impl Into<String>,
        file_name: impl Into<String>,
        document: serde_json::Value,
    ) -> Result<Self> {
        let name = name.into();
        let file_name = file_name.into();
        let serde_json::Value::Object(mut body) = document else {
            return Err(IndexctlError::Declaration(format!(
                "{}: expected a JSON object",
                file_name
            )));
        };

        let (mappings, settings) = if body.contains_key("mappings") {
            let mappings = body.remove("mappings").unwrap_or_default();
            let settings = body.remove("settings").filter(|s| !s.is_null());
            if let Some(s) = &settings {
                if !s.is_object() {
                    return Err(IndexctlError::Declaration(format!(
                        "{}: settings must be an object",
                        file_name
                    )));
                }
            }
            (mappings, settings)
        } else {
            (serde_json::Value::Object(body), None)
        };

        Ok(Self {
            name,
            file_name,
            mappings,
            settings,
        })
    }

    /// Settings sent on index creation: the declared settings with
    /// `number_of_shards` filled in when the declaration does not set it.
    pub fn index_settings(&self, default_shards: u32) -> serde_json::Value {
        let mut settings = match &self.settings {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        let declares_shards = settings.contains_key("number_of_shards")
            || settings
                .get("index")
                .and_then(|index| index.get("number_of_shards"))
                .is_some();
        if !declares_shards {
            settings.insert(
                "number_of_shards".to_string(),
                serde_json::Value::from(default_shards),
            );
        }
        serde_json::Value::Object(settings)
    }
}

/// The desired indices for one run, keyed by index name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationSet {
    declarations: BTreeMap<String, Declaration>,
}

impl DeclarationSet {
    pub fn new(declarations: Vec<Declaration>) -> Result<Self> {
        let mut by_name: BTreeMap<String, Declaration> = BTreeMap::new();
        let mut collisions: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for declaration in declarations {
            if let Some(existing) = by_name.get(&declaration.name) {
                collisions
                    .entry(declaration.name.clone())
                    .or_insert_with(|| vec![existing.file_name.clone()])
                    .push(declaration.file_name.clone());
                continue;
            }
            by_name.insert(declaration.name.clone(), declaration);
        }

        if let Some((name, files)) = collisions.into_iter().next() {
            return Err(IndexctlError::DuplicateDeclaration { name, files });
        }

        Ok(Self {
            declarations: by_name,
        })
    }

    /// Load every `*.json` file in `folder`.
    pub fn load(folder: &Path, scheme: NamingScheme) -> Result<Self> {
        let file_names = list_declaration_files(folder)?;
        if file_names.is_empty() {
            return Err(IndexctlError::NoDeclarations(folder.display().to_string()));
        }

        let mut declarations = Vec::with_capacity(file_names.len());
        for file_name in &file_names {
            let name = scheme.index_name(file_name).ok_or_else(|| {
                IndexctlError::Declaration(format!(
                    "{}: file name does not match naming scheme {:?}",
                    file_name, scheme
                ))
            })?;
            let path: PathBuf = folder.join(file_name);
            let content = std::fs::read_to_string(&path)?;
            let document: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| IndexctlError::Declaration(format!("{}: {}", file_name, e)))?;
            declarations.push(Declaration::from_document(name, file_name.clone(), document)?);
        }

        if matches!(scheme, NamingScheme::StripSequence) {
            for (prefix, files) in group_file_names(&file_names) {
                if files.len() > 1 {
                    tracing::warn!(
                        prefix = %prefix,
                        files = %files.join(","),
                        "Several sequence-numbered declarations share a prefix"
                    );
                }
            }
        }

        let set = Self::new(declarations)?;
        tracing::info!(
            folder = %folder.display(),
            declarations = %set.names().join(","),
            "Loaded index declarations"
        );
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Index names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.declarations.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }
}

/// Sorted `*.json` regular files in `folder`. Symlinks are followed, so a
/// dangling link is an error rather than a missing declaration.
pub fn list_declaration_files(folder: &Path) -> Result<Vec<String>> {
    let read_error =
        |e: std::io::Error| IndexctlError::Io(format!("cannot read {}: {}", folder.display(), e));
    let entries = std::fs::read_dir(folder).map_err(read_error)?;

    let mut file_names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(read_error)?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') || !file_name.ends_with(DECLARATION_EXTENSION) {
            continue;
        }
        let metadata = std::fs::metadata(entry.path()).map_err(|e| {
            IndexctlError::Io(format!("cannot read {}: {}", entry.path().display(), e))
        })?;
        if metadata.is_file() {
            file_names.push(file_name);
        }
    }
    file_names.sort();
    Ok(file_names)
}
