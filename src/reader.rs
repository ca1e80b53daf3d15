//! Load entities from JSON files and directories

use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::GtsConfig;
use crate::entity::{JsonEntity, JsonFile};
use crate::error::Result;
use crate::registry::GtsReader;

/// Reads every object (or array of objects) in the configured paths
///
/// Files that fail to read or parse are logged and skipped. Documents without
/// a valid identifier are dropped.
pub struct FileReader {
    paths: Vec<PathBuf>,
    config: GtsConfig,
    files: Option<Vec<PathBuf>>,
    next_file: usize,
    pending: VecDeque<JsonEntity>,
}

impl FileReader {
    pub fn new<P: AsRef<Path>>(paths: &[P], config: GtsConfig) -> Self {
        Self {
            paths: paths.iter().map(|p| expand_home(p.as_ref())).collect(),
            config,
            files: None,
            next_file: 0,
            pending: VecDeque::new(),
        }
    }

    /// Candidate files, in walk order, deduplicated by canonical path
    pub fn files(&mut self) -> &[PathBuf] {
        if self.files.is_none() {
            self.files = Some(self.collect_files());
        }
        self.files.as_deref().unwrap_or_default()
    }

    fn collect_files(&self) -> Vec<PathBuf> {
        let reader = &self.config.reader;
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for root in &self.paths {
            if !root.exists() {
                warn!(path = %root.display(), "path does not exist");
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !e.file_type().is_dir()
                        || !reader.exclude_dirs.iter().any(|d| e.file_name() == d.as_str())
                });

            for entry in walker.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !entry.file_type().is_file() || !self.has_extension(path) {
                    continue;
                }
                let real = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                if seen.insert(real.clone()) {
                    files.push(real);
                }
            }
        }

        debug!(files = files.len(), "collected entity files");
        files
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.config.reader.extensions.iter().any(|e| *e == ext))
    }

    /// Entities with a valid identifier from one file
    pub fn load_file(&self, path: &Path) -> Result<Vec<JsonEntity>> {
        let text = fs::read_to_string(path)?;
        let content: Value = serde_json::from_str(&text)?;
        let file = JsonFile::new(path);
        let extraction = &self.config.extraction;

        let entities = match content {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, item)| item.is_object())
                .map(|(idx, item)| JsonEntity::with_source(item, extraction, Some(file.clone()), Some(idx)))
                .collect(),
            Value::Object(_) => vec![JsonEntity::with_source(content, extraction, Some(file), None)],
            _ => Vec::new(),
        };

        Ok(entities.into_iter().filter(|e| e.id().is_some()).collect())
    }

    fn load_or_skip(&self, path: &Path) -> Vec<JsonEntity> {
        match self.load_file(path) {
            Ok(entities) => {
                debug!(path = %path.display(), entities = entities.len(), "loaded file");
                entities
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable file");
                Vec::new()
            }
        }
    }
}

impl GtsReader for FileReader {
    fn next(&mut self) -> Option<JsonEntity> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(entity);
            }
            let idx = self.next_file;
            let path = self.files().get(idx)?.clone();
            self.next_file += 1;
            self.pending.extend(self.load_or_skip(&path));
        }
    }

    fn read_by_id(&mut self, id: &str) -> Option<JsonEntity> {
        let files = self.files().to_vec();
        files
            .iter()
            .flat_map(|path| self.load_or_skip(path))
            .find(|entity| entity.id() == Some(id))
    }

    fn reset(&mut self) {
        self.next_file = 0;
        self.pending.clear();
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
