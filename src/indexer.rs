use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use kdam::{BarExt, tqdm};
use rayon::prelude::*;

use crate::{
    config::{IndexConfig, SETTINGS_KEY, suffix_of},
    error::{Error, Result},
    filter::FilterCommand,
    pattern::Matcher,
    posting::PostingList,
    store::{PutMode, Store},
    tokenizer::Tokenizer,
    walker::{DiscoveredFile, WalkEvent},
};

/// Files loaded (and filtered) in parallel per batch before their postings
/// are applied in order.
const LOAD_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Index a document, assigning an id on first sight.
    Add,
    /// Remove a document's word counts from its postings.
    Subtract,
    /// Drop every posting and the name record of a document.
    Delete,
    /// Recount a document and compare against the stored postings.
    Verify,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "sub",
            Operation::Delete => "del",
            Operation::Verify => "check",
        }
    }

    fn mutates(self) -> bool {
        !matches!(self, Operation::Verify)
    }
}

/// A document whose stored postings disagree with its current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub document: String,
    pub detail: String,
}

/// Totals for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub words_written: usize,
    /// Unreadable or unfilterable files.
    pub skipped: usize,
    /// Subtract/delete targets missing from the index.
    pub not_found: usize,
    pub mismatches: Vec<Mismatch>,
}

/// One file's place inside a directory-as-document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: PathBuf,
    /// Byte offset of the file's content within the logical document.
    pub offset: u64,
}

#[derive(Debug)]
struct DirectoryDocument {
    name: String,
    counts: BTreeMap<String, u32>,
    segments: Vec<Segment>,
    sources: Vec<PathBuf>,
    pos_start: u64,
}

impl DirectoryDocument {
    fn new(directory: &Path) -> Self {
        let name = directory.to_string_lossy();
        Self {
            name: if name.is_empty() {
                ".".to_string()
            } else {
                name.into_owned()
            },
            counts: BTreeMap::new(),
            segments: Vec::new(),
            sources: Vec::new(),
            pos_start: 0,
        }
    }

    fn push(
        &mut self,
        file: &DiscoveredFile,
        counts: BTreeMap<String, u32>,
        size: u64,
    ) {
        self.segments.push(Segment {
            path: file.relative_path.clone(),
            offset: self.pos_start,
        });
        self.sources.push(file.absolute_path.clone());
        self.pos_start += size;
        for (word, n) in counts {
            *self.counts.entry(word).or_default() += n;
        }
    }
}

/// Name under which a file is recorded: its path relative to `root` when
/// it lies inside it, else the path as given.
///
/// The file itself may already be gone (Delete after removal), so only its
/// parent directory has to exist for the name to resolve.
pub fn document_name(root: Option<&Path>, path: &Path) -> String {
    if let Some(root) = root {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        if let Ok(rel) = resolve(path).strip_prefix(&root) {
            return rel.to_string_lossy().into_owned();
        }
    }
    path.to_string_lossy().into_owned()
}

fn resolve(path: &Path) -> PathBuf {
    if let Ok(full) = path.canonicalize() {
        return full;
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(file)) => dir.join(file),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// State for one index-build or update invocation.
///
/// Owns the filename -> id map loaded from the names store, the parsed
/// filters and bad-word matcher, and any directory document being
/// accumulated. Documents are applied strictly one at a time.
pub struct IndexSession<'a> {
    names: &'a Store,
    words: &'a Store,
    config: &'a IndexConfig,
    bad_words: Option<Matcher>,
    filters: HashMap<String, FilterCommand>,
    ids: HashMap<String, u32>,
    next_id: u32,
    directory: Option<DirectoryDocument>,
    last_segments: Vec<Segment>,
    config_saved: bool,
    /// doc id -> stored word counts, built on the first Verify.
    stored: Option<HashMap<u32, BTreeMap<String, u32>>>,
    report: IndexReport,
}

impl<'a> IndexSession<'a> {
    pub fn open(
        names: &'a Store,
        words: &'a Store,
        config: &'a IndexConfig,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(json) = names.get_setting(SETTINGS_KEY)? {
            let stored = IndexConfig::from_json(&json)?;
            if stored.ignore_case != config.ignore_case && !names.is_empty()? {
                return Err(Error::Config(format!(
                    "index was built with ignore_case={}",
                    stored.ignore_case
                )));
            }
        }

        let mut ids = HashMap::new();
        let mut max_id = 0;
        names.for_each(|key, value| {
            let id: u32 = key.parse().map_err(|_| {
                Error::Config(format!("invalid document id '{key}'"))
            })?;
            max_id = max_id.max(id);
            ids.insert(String::from_utf8_lossy(value).into_owned(), id);
            Ok(())
        })?;

        let mut filters = HashMap::new();
        for spec in &config.filters {
            filters.insert(
                spec.ext.trim_start_matches('.').to_ascii_lowercase(),
                FilterCommand::parse(&spec.command)?,
            );
        }

        tracing::debug!(documents = ids.len(), "index session opened");

        Ok(Self {
            names,
            words,
            config,
            bad_words: config.bad_words_matcher(),
            filters,
            ids,
            next_id: max_id + 1,
            directory: None,
            last_segments: Vec::new(),
            config_saved: false,
            stored: None,
            report: IndexReport::default(),
        })
    }

    pub fn report(&self) -> &IndexReport {
        &self.report
    }

    /// Segments of the most recently completed directory document.
    pub fn last_segments(&self) -> &[Segment] {
        &self.last_segments
    }

    pub fn document_id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn finish(self) -> IndexReport {
        self.report
    }

    /// Apply `op` to every document of a walk, showing a progress bar when
    /// `progress` is set.
    pub fn run<I>(&mut self, op: Operation, events: I, progress: bool) -> Result<()>
    where
        I: IntoIterator<Item = WalkEvent>,
    {
        self.save_config(op)?;

        let events: Vec<WalkEvent> = events.into_iter().collect();
        let total = events
            .iter()
            .filter(|e| matches!(e, WalkEvent::File(_)))
            .count();
        tracing::info!(operation = op.label(), files = total, "indexing run");

        let mut bar = tqdm!(total = total, desc = op.label(), disable = !progress);

        for chunk in events.chunks(LOAD_BATCH) {
            let loaded: Vec<Option<Result<String>>> = chunk
                .par_iter()
                .map(|event| match event {
                    WalkEvent::File(file) if op != Operation::Delete => {
                        Some(self.load(&file.absolute_path))
                    }
                    _ => None,
                })
                .collect();

            for (event, content) in chunk.iter().zip(loaded) {
                match event {
                    WalkEvent::File(file) => {
                        self.handle_file(op, file, content)?;
                        bar.update(1)?;
                    }
                    WalkEvent::DirectoryBoundary { directory } => {
                        tracing::trace!(dir = %directory.display(), "boundary");
                        self.flush_directory(op)?;
                    }
                }
            }
        }
        self.flush_directory(op)?;

        Ok(())
    }

    /// Apply `op` to a single file recorded under `name`.
    pub fn process(&mut self, op: Operation, name: &str, path: &Path) -> Result<()> {
        self.save_config(op)?;

        let counts = if op == Operation::Delete {
            None
        } else {
            match self.load(path) {
                Ok(content) => {
                    Some(self.count_words(&content, suffix_of(path)))
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping");
                    self.report.skipped += 1;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };

        self.apply(op, name, counts, &[path.to_path_buf()])
    }

    fn save_config(&mut self, op: Operation) -> Result<()> {
        if op.mutates() && !self.config_saved && !self.names.is_read_only() {
            self.names.set_setting(SETTINGS_KEY, &self.config.to_json()?)?;
            self.config_saved = true;
        }
        Ok(())
    }

    /// Read a file, running it through its suffix's filter if one is set.
    fn load(&self, path: &Path) -> Result<String> {
        let suffix = suffix_of(path).to_ascii_lowercase();
        let bytes = match self.filters.get(&suffix) {
            Some(filter) => filter.execute(path)?,
            None => std::fs::read(path)?,
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Per-word occurrence counts of `content`, after bad-word filtering
    /// and case normalization.
    pub fn count_words(&self, content: &str, suffix: &str) -> BTreeMap<String, u32> {
        let filter_bad = self.config.bad_words_active(suffix);
        let tokens = Tokenizer::new(content)
            .avoid_punctuation(true)
            .skip_tag_xml(self.config.skips_tags(suffix))
            .min_word_size(self.config.min_word_size);

        let mut counts = BTreeMap::new();
        for word in tokens {
            if filter_bad
                && let Some(bad) = &self.bad_words
                && bad.is_match(word)
            {
                continue;
            }
            *counts.entry(self.config.normalize_word(word)).or_insert(0) += 1;
        }
        counts
    }

    fn handle_file(
        &mut self,
        op: Operation,
        file: &DiscoveredFile,
        content: Option<Result<String>>,
    ) -> Result<()> {
        let content = match content {
            Some(Ok(content)) => Some(content),
            Some(Err(e)) if e.is_recoverable() => {
                tracing::warn!(
                    file = %file.relative_path.display(),
                    error = %e,
                    "skipping unreadable file"
                );
                self.report.skipped += 1;
                return Ok(());
            }
            Some(Err(e)) => return Err(e),
            None => None,
        };

        let suffix = suffix_of(&file.relative_path);
        let counts = content.as_deref().map(|c| self.count_words(c, suffix));

        if self.config.dir_content_as_doc {
            let size = content.map_or(0, |c| c.len() as u64);
            self.directory
                .get_or_insert_with(|| DirectoryDocument::new(file.relative_dir()))
                .push(file, counts.unwrap_or_default(), size);
            return Ok(());
        }

        let name = file.relative_path.to_string_lossy();
        self.apply(op, &name, counts, &[file.absolute_path.clone()])
    }

    fn flush_directory(&mut self, op: Operation) -> Result<()> {
        let Some(doc) = self.directory.take() else {
            return Ok(());
        };
        tracing::debug!(
            document = %doc.name,
            files = doc.segments.len(),
            size = doc.pos_start,
            "directory document complete"
        );
        self.apply(op, &doc.name, Some(doc.counts), &doc.sources)?;
        self.last_segments = doc.segments;
        Ok(())
    }

    fn apply(
        &mut self,
        op: Operation,
        name: &str,
        counts: Option<BTreeMap<String, u32>>,
        sources: &[PathBuf],
    ) -> Result<()> {
        let (id, created) = match self.resolve_id(op, name) {
            Ok(resolved) => resolved,
            Err(Error::NotFound { .. }) if op == Operation::Verify => {
                self.report.mismatches.push(Mismatch {
                    document: name.to_string(),
                    detail: "not indexed".to_string(),
                });
                self.report.documents += 1;
                return Ok(());
            }
            Err(e @ Error::NotFound { .. }) => {
                tracing::warn!(error = %e, "skipping");
                self.report.not_found += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let counts = counts.unwrap_or_default();
        if op.mutates() {
            self.stored = None;
        }
        match op {
            Operation::Add => self.add(id, created, &counts)?,
            Operation::Subtract => self.subtract(id, &counts)?,
            Operation::Delete => self.delete(id, name, sources)?,
            Operation::Verify => self.verify(id, name, &counts)?,
        }

        tracing::debug!(
            operation = op.label(),
            document = name,
            id,
            words = counts.len(),
            "document done"
        );
        self.report.documents += 1;
        Ok(())
    }

    /// The document's id, and whether it was assigned just now.
    fn resolve_id(&mut self, op: Operation, name: &str) -> Result<(u32, bool)> {
        if let Some(&id) = self.ids.get(name) {
            return Ok((id, false));
        }
        if op != Operation::Add {
            return Err(Error::NotFound {
                kind: "document",
                name: name.to_string(),
            });
        }

        let id = self.next_id;
        if !self
            .names
            .put(&id.to_string(), name.as_bytes(), PutMode::Insert)?
        {
            return Err(Error::Config(format!(
                "document id {id} is already assigned"
            )));
        }
        self.next_id += 1;
        self.ids.insert(name.to_string(), id);
        Ok((id, true))
    }

    /// Words whose posting list holds `id`. There is no reverse index, so
    /// this scans the whole words store.
    fn words_of(&self, id: u32) -> Result<Vec<String>> {
        let mut found = Vec::new();
        self.words.for_each(|word, bytes| {
            if PostingList::decode(word, bytes)?.frequency(id).is_some() {
                found.push(word.to_string());
            }
            Ok(())
        })?;
        Ok(found)
    }

    fn add(
        &mut self,
        id: u32,
        created: bool,
        counts: &BTreeMap<String, u32>,
    ) -> Result<()> {
        let mut keys: Vec<String> = counts.keys().cloned().collect();
        if !created {
            // Words that left the document lose their posting in the same
            // transaction.
            keys.extend(
                self.words_of(id)?
                    .into_iter()
                    .filter(|w| !counts.contains_key(w)),
            );
        }

        let written = self.words.update_batch(&keys, |word, current| {
            let mut list = match current {
                Some(bytes) => PostingList::decode(word, bytes)?,
                None => PostingList::new(),
            };
            list.set(id, counts.get(word).copied().unwrap_or(0));
            Ok((!list.is_empty()).then(|| list.encode()))
        })?;
        self.report.words_written += written;
        Ok(())
    }

    fn subtract(&mut self, id: u32, counts: &BTreeMap<String, u32>) -> Result<()> {
        let keys: Vec<&String> = counts.keys().collect();
        let written = self.words.update_batch(&keys, |word, current| {
            let Some(bytes) = current else {
                return Ok(None);
            };
            let mut list = PostingList::decode(word, bytes)?;
            let remaining = list
                .frequency(id)
                .unwrap_or(0)
                .saturating_sub(counts[word]);
            list.set(id, remaining);
            Ok((!list.is_empty()).then(|| list.encode()))
        })?;
        self.report.words_written += written;
        Ok(())
    }

    fn delete(&mut self, id: u32, name: &str, sources: &[PathBuf]) -> Result<()> {
        let touched = self.words_of(id)?;
        let written = self.words.update_batch(&touched, |word, current| {
            let Some(bytes) = current else {
                return Ok(None);
            };
            let mut list = PostingList::decode(word, bytes)?;
            list.remove(id);
            Ok((!list.is_empty()).then(|| list.encode()))
        })?;
        self.report.words_written += written;

        self.names.remove(&id.to_string())?;
        self.ids.remove(name);

        if self.config.unlink_on_delete {
            for source in sources {
                if let Err(e) = std::fs::remove_file(source) {
                    tracing::warn!(
                        file = %source.display(),
                        error = %e,
                        "could not unlink"
                    );
                }
            }
        }
        Ok(())
    }

    fn verify(
        &mut self,
        id: u32,
        name: &str,
        counts: &BTreeMap<String, u32>,
    ) -> Result<()> {
        if self.stored.is_none() {
            self.stored = Some(self.stored_counts()?);
        }
        let empty = BTreeMap::new();
        let stored = self
            .stored
            .as_ref()
            .and_then(|all| all.get(&id))
            .unwrap_or(&empty);

        let words: BTreeSet<&String> = counts.keys().chain(stored.keys()).collect();
        for word in words {
            let stored = stored.get(word).copied().unwrap_or(0);
            let computed = counts.get(word).copied().unwrap_or(0);
            if stored != computed {
                self.report.mismatches.push(Mismatch {
                    document: name.to_string(),
                    detail: format!(
                        "'{word}': stored {stored}, counted {computed}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Invert the words store into per-document word counts.
    fn stored_counts(&self) -> Result<HashMap<u32, BTreeMap<String, u32>>> {
        let mut by_doc: HashMap<u32, BTreeMap<String, u32>> = HashMap::new();
        self.words.for_each(|word, bytes| {
            for entry in PostingList::decode(word, bytes)?.iter() {
                by_doc
                    .entry(entry.doc_id)
                    .or_default()
                    .insert(word.to_string(), entry.frequency);
            }
            Ok(())
        })?;
        Ok(by_doc)
    }
}

impl std::fmt::Debug for IndexSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSession")
            .field("documents", &self.ids.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
