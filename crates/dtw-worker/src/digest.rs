//! Generation-over-generation input digest tracking.
//!
//! Holds the previous and current `path -> digest` generations and diffs
//! them into a [`ChangeSet`] of document identifiers. Every input takes part
//! in change detection; only document sources (by suffix) are named in the
//! change set.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use dtw_protocol::InputDescriptor;
use serde::Serialize;

/// One generation of input digests, in request order.
#[derive(Debug, Clone, Default)]
struct Generation {
    order: Vec<String>,
    digests: HashMap<String, String>,
}

impl Generation {
    /// Build a generation from request inputs. A repeated path keeps its
    /// first position and its last digest.
    fn from_inputs(inputs: &[InputDescriptor]) -> Self {
        let mut generation = Self::default();
        for input in inputs {
            if generation
                .digests
                .insert(input.path.clone(), input.digest.clone())
                .is_none()
            {
                generation.order.push(input.path.clone());
            }
        }
        generation
    }
}

/// Maps input paths to document identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNaming {
    prefix: String,
    suffixes: Vec<String>,
}

impl DocumentNaming {
    /// `source_prefix` is stripped (with its separator) from document paths;
    /// `.` or an empty prefix strips nothing.
    pub fn new(source_prefix: &str, suffixes: &[String]) -> Self {
        let prefix = source_prefix.trim_end_matches('/');
        let prefix = prefix.strip_prefix("./").unwrap_or(prefix);
        let prefix = if prefix == "." { "" } else { prefix };
        Self {
            prefix: prefix.to_string(),
            suffixes: suffixes.to_vec(),
        }
    }

    /// Document identifier for `path`, or `None` if it is not a document
    /// source.
    ///
    /// `docs/guide/intro.rst` with prefix `docs` becomes `guide/intro`.
    pub fn document_id(&self, path: &str) -> Option<String> {
        let suffix = self
            .suffixes
            .iter()
            .filter(|suffix| path.ends_with(suffix.as_str()))
            .max_by_key(|suffix| suffix.len())?;
        let stem = &path[..path.len() - suffix.len()];
        let stem = stem.strip_prefix("./").unwrap_or(stem);

        let stem = if self.prefix.is_empty() {
            stem
        } else {
            stem.strip_prefix(self.prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(stem)
        };

        if stem.is_empty() {
            None
        } else {
            Some(stem.to_string())
        }
    }
}

/// Document identifiers whose inputs changed between two generations.
///
/// Identifiers appear in diff-scan order: added and modified paths in the
/// order of the new request, then removed paths in the order of the
/// previous one. No sorting is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    documents: Vec<String>,
    #[serde(skip)]
    added: usize,
    #[serde(skip)]
    removed: usize,
    #[serde(skip)]
    modified: usize,
}

impl ChangeSet {
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Number of added inputs, documents or not.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Number of removed inputs, documents or not.
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Number of inputs whose digest changed, documents or not.
    pub fn modified(&self) -> usize {
        self.modified
    }

    /// Write the change set as a JSON array of identifiers.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec(self)?;
        fs::write(path, json)
    }

    fn push_document(&mut self, seen: &mut HashSet<String>, naming: &DocumentNaming, path: &str) {
        if let Some(id) = naming.document_id(path) {
            if seen.insert(id.clone()) {
                self.documents.push(id);
            }
        }
    }
}

/// Tracks two generations of input digests.
#[derive(Debug, Default)]
pub struct DigestTracker {
    previous: Generation,
    current: Generation,
}

impl DigestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to a new generation built from `inputs` and return what
    /// changed since the last one.
    ///
    /// There is no separate commit step: the new generation becomes the
    /// baseline even if the caller abandons the request afterwards.
    pub fn update(&mut self, inputs: &[InputDescriptor], naming: &DocumentNaming) -> ChangeSet {
        self.previous = std::mem::replace(&mut self.current, Generation::from_inputs(inputs));

        let previous = &self.previous;
        let current = &self.current;
        let mut changes = ChangeSet::default();
        let mut seen = HashSet::new();

        for path in &current.order {
            match previous.digests.get(path) {
                None => changes.added += 1,
                Some(old) if *old != current.digests[path] => changes.modified += 1,
                Some(_) => continue,
            }
            changes.push_document(&mut seen, naming, path);
        }

        for path in &previous.order {
            if !current.digests.contains_key(path) {
                changes.removed += 1;
                changes.push_document(&mut seen, naming, path);
            }
        }

        changes
    }

    /// Number of paths in the current generation.
    pub fn tracked(&self) -> usize {
        self.current.order.len()
    }

    /// Digest recorded for `path` in the current generation.
    pub fn current_digest(&self, path: &str) -> Option<&str> {
        self.current.digests.get(path).map(String::as_str)
    }
}
