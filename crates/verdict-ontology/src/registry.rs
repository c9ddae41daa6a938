//! Ontology registry: discovery, caching, reload.
//!
//! Documents live as `<name>.json` files in a configured directory. The
//! registry validates on first `get` and caches the result behind a
//! read-preferring lock; `reload` rebuilds the whole cache and swaps it
//! atomically, so verifications already holding an [`Arc<Ontology>`]
//! snapshot are unaffected. A malformed document fails its own `get` and is
//! skipped by `list`; well-formed siblings remain loadable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::document::{Ontology, OntologyMetadata};
use crate::error::OntologyError;
use crate::validate::validate_document;

pub struct OntologyRegistry {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Ontology>>>,
}

impl OntologyRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Metadata for every loadable document in the directory, sorted by
    /// name. Malformed documents are skipped with a warning.
    pub fn list(&self) -> Vec<OntologyMetadata> {
        let mut out = Vec::new();
        for name in self.document_names() {
            match self.get(&name) {
                Ok(ontology) => out.push(ontology.metadata()),
                Err(e) => warn!(ontology = %name, error = %e, "skipping unloadable ontology"),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Fetch a validated ontology, loading and caching it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<Ontology>, OntologyError> {
        if let Some(found) = self.cache.read().get(name) {
            return Ok(Arc::clone(found));
        }

        let loaded = Arc::new(self.load(name)?);
        self.cache
            .write()
            .insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Raw JSON of a validated document, for the `get_ontology` surface.
    pub fn get_document(&self, name: &str) -> Result<Json, OntologyError> {
        Ok(self.get(name)?.document.clone())
    }

    /// Drop the cache and rebuild it from disk, swapping atomically.
    ///
    /// Returns the metadata of everything now loadable.
    pub fn reload(&self) -> Vec<OntologyMetadata> {
        let mut fresh: HashMap<String, Arc<Ontology>> = HashMap::new();
        let mut out = Vec::new();
        for name in self.document_names() {
            match self.load(&name) {
                Ok(ontology) => {
                    out.push(ontology.metadata());
                    fresh.insert(name, Arc::new(ontology));
                }
                Err(e) => warn!(ontology = %name, error = %e, "skipping unloadable ontology"),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        *self.cache.write() = fresh;
        debug!(count = out.len(), dir = %self.dir.display(), "registry reloaded");
        out
    }

    fn document_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot read ontology directory");
                return names;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names
    }

    fn load(&self, name: &str) -> Result<Ontology, OntologyError> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.is_file() {
            return Err(OntologyError::UnknownOntology(name.to_string()));
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| OntologyError::Io {
            path: path.clone(),
            source,
        })?;
        let document: Json =
            serde_json::from_str(&raw).map_err(|source| OntologyError::Json {
                path: path.clone(),
                source,
            })?;

        let ontology =
            validate_document(document).map_err(|issues| OntologyError::Invalid {
                name: name.to_string(),
                issues,
            })?;
        debug!(
            ontology = %name,
            constraints = ontology.constraints.len(),
            extractors = ontology.extractors.len(),
            "loaded ontology"
        );
        Ok(ontology)
    }
}
