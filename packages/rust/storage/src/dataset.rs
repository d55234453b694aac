use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use answerbank_shared::{AnswerBankError, DatasetRecord, QuestionId, Result};

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// In-memory view of the dataset file, keyed (and therefore ordered) by id.
#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    records: BTreeMap<QuestionId, DatasetRecord>,
    /// Lines dropped on load because a later line had the same id.
    duplicate_lines: usize,
}

/// Effect of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
    Unchanged,
}

/// Aggregate counts for `dataset stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub total: usize,
    pub answered: usize,
    pub pending: usize,
    /// Answered records per answer method.
    pub by_method: BTreeMap<String, usize>,
    /// Records per source.
    pub by_origin: BTreeMap<String, usize>,
}

impl Dataset {
    /// An empty dataset bound to `path`.
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            records: BTreeMap::new(),
            duplicate_lines: 0,
        }
    }

    /// Load the dataset at `path`. A missing file is an empty dataset.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("dataset file not found, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(AnswerBankError::io(path, e)),
        };

        let dataset = Self::parse(path, &contents)?;
        info!(records = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    /// Parse JSON Lines content. Blank lines are ignored; the later of two
    /// lines with the same id wins.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let mut dataset = Self::empty(path);

        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let record: DatasetRecord = serde_json::from_str(line).map_err(|e| {
                AnswerBankError::validation(format!(
                    "{}: line {}: malformed record: {e}",
                    path.display(),
                    index + 1
                ))
            })?;

            if let Some(previous) = dataset.records.insert(record.id.clone(), record) {
                warn!(id = %previous.id, line = index + 1, "duplicate id in dataset, keeping later line");
                dataset.duplicate_lines += 1;
            }
        }

        Ok(dataset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicate_lines(&self) -> usize {
        self.duplicate_lines
    }

    pub fn get(&self, id: &QuestionId) -> Option<&DatasetRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &QuestionId) -> bool {
        self.records.contains_key(id)
    }

    /// Records in identifier order.
    pub fn records(&self) -> impl Iterator<Item = &DatasetRecord> {
        self.records.values()
    }

    /// Every persisted identifier.
    pub fn known_ids(&self) -> HashSet<QuestionId> {
        self.records.keys().cloned().collect()
    }

    /// Records still waiting for an answer, in identifier order.
    pub fn pending(&self) -> Vec<&DatasetRecord> {
        self.records.values().filter(|r| r.is_pending()).collect()
    }

    /// Insert or replace a record by id.
    pub fn upsert(&mut self, record: DatasetRecord) -> UpsertKind {
        match self.records.get(&record.id) {
            Some(existing) if *existing == record => UpsertKind::Unchanged,
            Some(_) => {
                self.records.insert(record.id.clone(), record);
                UpsertKind::Updated
            }
            None => {
                self.records.insert(record.id.clone(), record);
                UpsertKind::Inserted
            }
        }
    }

    /// Canonical serialization: one record per line in id order, each line
    /// terminated by `\n`. An empty dataset renders as an empty string.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for record in self.records.values() {
            let line = serde_json::to_string(record).map_err(|e| {
                AnswerBankError::write(&self.path, format!("serializing {}: {e}", record.id))
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn stats(&self) -> DatasetStats {
        let mut stats = DatasetStats {
            total: self.records.len(),
            ..DatasetStats::default()
        };

        for record in self.records.values() {
            *stats.by_origin.entry(record.origin.clone()).or_default() += 1;
            match &record.answer {
                Some(answer) => {
                    stats.answered += 1;
                    *stats
                        .by_method
                        .entry(answer.method.as_str().to_string())
                        .or_default() += 1;
                }
                None => stats.pending += 1,
            }
        }

        stats
    }

    /// Whether `raw` is exactly the canonical rendering of this dataset.
    pub fn is_canonical(&self, raw: &str) -> Result<bool> {
        Ok(self.render()? == raw)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub path: PathBuf,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records in the dataset after the merge.
    pub total: usize,
    /// Whether the file on disk was rewritten.
    pub changed: bool,
}

/// Merges records into the dataset file.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current file, upsert `records` (later write wins) and write
    /// the result back if its bytes differ from what is on disk.
    ///
    /// Every failure, including reading the existing file, is a `Write` error.
    #[instrument(skip_all, fields(path = %self.path.display(), records = records.len()))]
    pub fn merge(&self, records: Vec<DatasetRecord>) -> Result<WriteResult> {
        let existing_raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(AnswerBankError::write(&self.path, e)),
        };

        let mut dataset = match &existing_raw {
            Some(raw) => Dataset::parse(&self.path, raw)
                .map_err(|e| AnswerBankError::write(&self.path, e))?,
            None => Dataset::empty(&self.path),
        };

        let mut result = WriteResult {
            path: self.path.clone(),
            inserted: 0,
            updated: 0,
            unchanged: 0,
            total: 0,
            changed: false,
        };

        for record in records {
            match dataset.upsert(record) {
                UpsertKind::Inserted => result.inserted += 1,
                UpsertKind::Updated => result.updated += 1,
                UpsertKind::Unchanged => result.unchanged += 1,
            }
        }
        result.total = dataset.len();

        let rendered = dataset.render()?;
        let on_disk = existing_raw.as_deref().unwrap_or("");
        if rendered == on_disk {
            debug!("dataset unchanged, skipping write");
            return Ok(result);
        }

        write_atomic(&self.path, &rendered)?;
        result.changed = true;

        info!(
            inserted = result.inserted,
            updated = result.updated,
            total = result.total,
            "dataset written"
        );

        Ok(result)
    }
}

/// Write to `.{name}.tmp` next to `path`, then rename over it.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| AnswerBankError::write(path, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| AnswerBankError::write(path, "dataset path has no file name"))?
        .to_string_lossy();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| AnswerBankError::write(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        AnswerBankError::write(path, e)
    })?;

    Ok(())
}
