use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::{
    config::{IndexConfig, SETTINGS_KEY, suffix_of},
    error::Result,
    expression::{Expression, ExpressionContext},
    pattern::{MatchKind, Matcher},
    posting::PostingList,
    store::Store,
};

/// Names bound per candidate document in boolean queries. Any other name
/// resolves to the frequency of that word in the document.
const FIELDS: [&str; 4] = ["filename", "basename", "suffix", "id"];

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightedResult {
    pub filename: String,
    pub frequency: u32,
}

/// Ranked hits of one query. A malformed query yields no hits and a
/// `syntax_error` instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResults {
    pub hits: Vec<WeightedResult>,
    pub syntax_error: Option<String>,
}

impl QueryResults {
    pub fn total(&self) -> usize {
        self.hits.len()
    }

    fn syntax_error(message: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            syntax_error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Boolean,
    Wildcard,
    Exact,
}

/// Classify a trimmed query string.
pub fn classify(query: &str) -> QueryKind {
    let lower = query.to_lowercase();
    if lower.contains(" or ")
        || lower.contains(" and ")
        || lower.contains(" not ")
        || lower.starts_with("not ")
    {
        QueryKind::Boolean
    } else if query.contains(['*', '?']) {
        QueryKind::Wildcard
    } else {
        QueryKind::Exact
    }
}

/// Uppercase the boolean keywords of a query.
fn normalize_keywords(query: &str) -> String {
    query
        .split(' ')
        .map(|word| {
            if ["and", "or", "not"]
                .iter()
                .any(|k| word.eq_ignore_ascii_case(k))
            {
                word.to_ascii_uppercase()
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-query accumulation state.
#[derive(Debug, Default)]
struct QueryContext {
    check_duplicates: bool,
    seen: HashSet<String>,
    hits: Vec<WeightedResult>,
}

impl QueryContext {
    fn deduplicating() -> Self {
        Self {
            check_duplicates: true,
            ..Self::default()
        }
    }

    fn collect(&mut self, filename: &str, frequency: u32) {
        if self.check_duplicates && !self.seen.insert(filename.to_string()) {
            return;
        }
        self.hits.push(WeightedResult {
            filename: filename.to_string(),
            frequency,
        });
    }

    fn into_results(mut self) -> QueryResults {
        rank(&mut self.hits);
        QueryResults {
            hits: self.hits,
            syntax_error: None,
        }
    }
}

/// Sort by frequency descending, then filename ascending.
pub fn rank(hits: &mut [WeightedResult]) {
    hits.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Bindings for one candidate document.
struct DocumentBindings<'q> {
    id: u32,
    filename: &'q str,
    config: &'q IndexConfig,
    postings: &'q HashMap<String, PostingList>,
}

impl ExpressionContext for DocumentBindings<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "filename" => Some(self.filename.to_string()),
            "basename" => Path::new(self.filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            "suffix" => Some(suffix_of(Path::new(self.filename)).to_string()),
            "id" => Some(self.id.to_string()),
            word => self
                .postings
                .get(&self.config.normalize_word(word))
                .and_then(|list| list.frequency(self.id))
                .map(|f| f.to_string()),
        }
    }
}

/// Read-side view over the two stores.
#[derive(Debug)]
pub struct QueryEngine<'a> {
    names: &'a Store,
    words: &'a Store,
    config: IndexConfig,
}

impl<'a> QueryEngine<'a> {
    /// Open an engine using the configuration the index was built with.
    pub fn open(names: &'a Store, words: &'a Store) -> Result<Self> {
        let config = match names.get_setting(SETTINGS_KEY)? {
            Some(json) => IndexConfig::from_json(&json)?,
            None => IndexConfig::default(),
        };
        Ok(Self::with_config(names, words, config))
    }

    pub fn with_config(
        names: &'a Store,
        words: &'a Store,
        config: IndexConfig,
    ) -> Self {
        Self {
            names,
            words,
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Run a raw (possibly percent-encoded) query.
    pub fn search(&self, raw: &str) -> Result<QueryResults> {
        let decoded = percent_decode_str(raw).decode_utf8_lossy();
        let query = decoded.trim();
        if query.is_empty() {
            return Ok(QueryResults::default());
        }

        let kind = classify(query);
        tracing::debug!(query, ?kind, "running query");

        match kind {
            QueryKind::Boolean => self.boolean(query),
            QueryKind::Wildcard => self.wildcard(query),
            QueryKind::Exact => self.exact(query),
        }
    }

    fn document_names(&self) -> Result<HashMap<u32, String>> {
        let mut map = HashMap::new();
        self.names.for_each(|key, value| {
            if let Ok(id) = key.parse() {
                map.insert(id, String::from_utf8_lossy(value).into_owned());
            }
            Ok(())
        })?;
        Ok(map)
    }

    fn postings(&self, word: &str) -> Result<Option<PostingList>> {
        self.words
            .get(word)?
            .map(|bytes| PostingList::decode(word, &bytes))
            .transpose()
    }

    fn boolean(&self, query: &str) -> Result<QueryResults> {
        let parsed = Expression::parse(&normalize_keywords(query))
            .map(Expression::numbers_as_names);
        let expr = match parsed {
            Ok(expr) => expr,
            Err(e) => return Ok(QueryResults::syntax_error(e.to_string())),
        };

        let mut postings = HashMap::new();
        for name in expr.names() {
            if FIELDS.contains(&name) {
                continue;
            }
            let word = self.config.normalize_word(name);
            if let Some(list) = self.postings(&word)? {
                postings.insert(word, list);
            }
        }

        let mut ctx = QueryContext::default();
        self.names.for_each(|key, value| {
            let Ok(id) = key.parse() else {
                return Ok(());
            };
            let filename = String::from_utf8_lossy(value);
            let bindings = DocumentBindings {
                id,
                filename: &filename,
                config: &self.config,
                postings: &postings,
            };
            if expr.matches(&bindings) {
                ctx.collect(&filename, 0);
            }
            Ok(())
        })?;

        Ok(ctx.into_results())
    }

    fn wildcard(&self, query: &str) -> Result<QueryResults> {
        if query.contains(' ') {
            return Ok(QueryResults::syntax_error(
                "wildcard patterns cannot contain spaces",
            ));
        }

        let mut ctx = QueryContext::deduplicating();
        if query == "*" {
            self.names.for_each(|_, value| {
                ctx.collect(&String::from_utf8_lossy(value), 0);
                Ok(())
            })?;
            return Ok(ctx.into_results());
        }

        let matcher =
            Matcher::new(query, MatchKind::DosWithOr, self.config.match_flags());
        let names = self.document_names()?;
        self.words.for_each(|word, bytes| {
            if !matcher.is_match(word) {
                return Ok(());
            }
            for entry in PostingList::decode(word, bytes)?.iter() {
                match names.get(&entry.doc_id) {
                    Some(filename) => ctx.collect(filename, entry.frequency),
                    None => tracing::debug!(
                        word,
                        doc_id = entry.doc_id,
                        "posting for unknown document"
                    ),
                }
            }
            Ok(())
        })?;

        Ok(ctx.into_results())
    }

    fn exact(&self, query: &str) -> Result<QueryResults> {
        let mut lists = Vec::new();
        for term in query.split(' ').filter(|t| !t.is_empty()) {
            let word = self.config.normalize_word(term);
            if let Some(list) = self.postings(&word)? {
                lists.push(list);
            }
        }
        if lists.is_empty() {
            return Ok(QueryResults::default());
        }

        let names = self.document_names()?;
        let mut totals: HashMap<&str, u32> = HashMap::new();
        for entry in lists.iter().flat_map(|list| list.iter()) {
            if let Some(filename) = names.get(&entry.doc_id) {
                let total = totals.entry(filename.as_str()).or_default();
                *total = total.saturating_add(entry.frequency);
            }
        }

        let mut ctx = QueryContext::default();
        for (filename, frequency) in totals {
            ctx.collect(filename, frequency);
        }
        Ok(ctx.into_results())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        indexer::{IndexSession, Operation},
        store::StoreKind,
        walker,
    };

    struct Fixture {
        _tmp: tempfile::TempDir,
        docs: std::path::PathBuf,
        names: Store,
        words: Store,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let docs = tmp.path().join("docs");
            std::fs::create_dir(&docs).unwrap();
            for (name, content) in files {
                let path = docs.join(name);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(path, content).unwrap();
            }
            let names = Store::open(
                &tmp.path().join("names.redb"),
                StoreKind::Names,
                100,
                false,
            )
            .unwrap();
            let words = Store::open(
                &tmp.path().join("words.redb"),
                StoreKind::Words,
                100,
                false,
            )
            .unwrap();
            Self {
                _tmp: tmp,
                docs,
                names,
                words,
            }
        }

        fn index(&self, config: &IndexConfig) {
            let mut session =
                IndexSession::open(&self.names, &self.words, config).unwrap();
            session
                .run(Operation::Add, walker::walk(&self.docs).unwrap(), false)
                .unwrap();
        }

        fn search(&self, query: &str) -> QueryResults {
            QueryEngine::open(&self.names, &self.words)
                .unwrap()
                .search(query)
                .unwrap()
        }
    }

    fn hits(results: &QueryResults) -> Vec<(&str, u32)> {
        results
            .hits
            .iter()
            .map(|h| (h.filename.as_str(), h.frequency))
            .collect()
    }

    #[test]
    fn classification() {
        assert_eq!(classify("foo and bar"), QueryKind::Boolean);
        assert_eq!(classify("foo OR bar"), QueryKind::Boolean);
        assert_eq!(classify("not foo"), QueryKind::Boolean);
        assert_eq!(classify("al*"), QueryKind::Wildcard);
        assert_eq!(classify("f?o"), QueryKind::Wildcard);
        assert_eq!(classify("foo bar"), QueryKind::Exact);
        assert_eq!(classify("android"), QueryKind::Exact);
    }

    #[test]
    fn keywords_are_uppercased() {
        assert_eq!(normalize_keywords("a and b or not c"), "a AND b OR NOT c");
        assert_eq!(normalize_keywords("android"), "android");
    }

    #[test]
    fn exact_ranks_by_frequency() {
        let fx = Fixture::new(&[
            ("a.txt", "foo foo foo"),
            ("b.txt", "foo bar"),
            ("c.txt", "bar"),
        ]);
        fx.index(&IndexConfig::default());

        let results = fx.search("foo");
        assert_eq!(hits(&results), vec![("a.txt", 3), ("b.txt", 1)]);
        assert!(results.syntax_error.is_none());
    }

    #[test]
    fn exact_multi_word_accumulates() {
        let fx = Fixture::new(&[("a.txt", "foo foo"), ("b.txt", "foo bar bar")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("foo bar");
        assert_eq!(hits(&results), vec![("b.txt", 3), ("a.txt", 2)]);
        assert!(fx.search("missing").hits.is_empty());
    }

    #[test]
    fn ties_break_by_filename() {
        let fx = Fixture::new(&[("z.txt", "foo"), ("m.txt", "foo"), ("a.txt", "foo")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("foo");
        assert_eq!(
            hits(&results),
            vec![("a.txt", 1), ("m.txt", 1), ("z.txt", 1)]
        );
    }

    #[test]
    fn wildcard_deduplicates_by_filename() {
        let fx = Fixture::new(&[
            ("a.txt", "alpha algae"),
            ("b.txt", "alpha"),
            ("c.txt", "beta"),
        ]);
        fx.index(&IndexConfig::default());

        let results = fx.search("al*");
        assert_eq!(hits(&results), vec![("a.txt", 1), ("b.txt", 1)]);
    }

    #[test]
    fn wildcard_alternatives() {
        let fx = Fixture::new(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("alp*|bet?");
        assert_eq!(hits(&results), vec![("a.txt", 1), ("b.txt", 1)]);
    }

    #[test]
    fn star_returns_every_document() {
        let fx = Fixture::new(&[("b.txt", "beta"), ("a.txt", "alpha")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("*");
        assert_eq!(hits(&results), vec![("a.txt", 0), ("b.txt", 0)]);
    }

    #[test]
    fn wildcard_with_space_is_syntax_error() {
        let fx = Fixture::new(&[("a.txt", "alpha")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("al* beta");
        assert!(results.hits.is_empty());
        assert!(results.syntax_error.is_some());
    }

    #[test]
    fn boolean_queries() {
        let fx = Fixture::new(&[
            ("a.txt", "rust cargo"),
            ("b.md", "rust"),
            ("c.txt", "cargo"),
        ]);
        fx.index(&IndexConfig::default());

        assert_eq!(
            hits(&fx.search("rust and cargo")),
            vec![("a.txt", 0)]
        );
        assert_eq!(
            hits(&fx.search("rust or cargo")),
            vec![("a.txt", 0), ("b.md", 0), ("c.txt", 0)]
        );
        assert_eq!(
            hits(&fx.search("cargo and not rust")),
            vec![("c.txt", 0)]
        );
        assert_eq!(hits(&fx.search("not rust")), vec![("c.txt", 0)]);
    }

    #[test]
    fn boolean_field_bindings() {
        let fx = Fixture::new(&[
            ("a.txt", "rust rust rust"),
            ("b.md", "rust"),
            ("sub/c.md", "cargo"),
        ]);
        fx.index(&IndexConfig::default());

        assert_eq!(
            hits(&fx.search("suffix == 'md' and rust")),
            vec![("b.md", 0)]
        );
        assert_eq!(
            hits(&fx.search("rust > 2 or basename == 'c.md'")),
            vec![("a.txt", 0), ("sub/c.md", 0)]
        );
    }

    #[test]
    fn boolean_numbers_and_apostrophes_are_words() {
        let fx = Fixture::new(&[
            ("a.txt", "released 2005 rust"),
            ("b.txt", "don't panic rust rust rust"),
            ("c.txt", "cargo"),
        ]);
        fx.index(&IndexConfig::default());

        assert_eq!(hits(&fx.search("2005 or zzzz")), vec![("a.txt", 0)]);
        assert_eq!(hits(&fx.search("not 2005 and rust")), vec![("b.txt", 0)]);
        assert_eq!(hits(&fx.search("don't and rust")), vec![("b.txt", 0)]);
        assert_eq!(hits(&fx.search("rust > 2 or cargo")), vec![
            ("b.txt", 0),
            ("c.txt", 0)
        ]);
    }

    #[test]
    fn long_boolean_queries_complete() {
        let fx = Fixture::new(&[("a.txt", "alpha"), ("b.txt", "beta")]);
        fx.index(&IndexConfig::default());

        let query = vec!["alpha"; 20_000].join(" or ");
        assert_eq!(hits(&fx.search(&query)), vec![("a.txt", 0)]);
    }

    #[test]
    fn boolean_syntax_error_is_reported() {
        let fx = Fixture::new(&[("a.txt", "rust")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("rust and (cargo");
        assert!(results.hits.is_empty());
        assert!(results.syntax_error.is_some());
    }

    #[test]
    fn failing_predicate_is_false() {
        let fx = Fixture::new(&[("a.txt", "rust")]);
        fx.index(&IndexConfig::default());

        let results = fx.search("rust / 0 or not rust");
        assert!(results.hits.is_empty());
        assert!(results.syntax_error.is_none());
    }

    #[test]
    fn deleted_documents_are_never_returned() {
        let fx = Fixture::new(&[("a.txt", "foo"), ("b.txt", "foo")]);
        fx.index(&IndexConfig::default());

        let config = IndexConfig::default();
        let mut session =
            IndexSession::open(&fx.names, &fx.words, &config).unwrap();
        session
            .process(Operation::Delete, "a.txt", &fx.docs.join("a.txt"))
            .unwrap();

        for query in ["foo", "f*", "*", "foo or bar"] {
            let results = fx.search(query);
            assert!(
                results.hits.iter().all(|h| h.filename != "a.txt"),
                "{query} returned a deleted document"
            );
        }
    }

    #[test]
    fn ignore_case_index_folds_queries() {
        let fx = Fixture::new(&[("a.txt", "Rust RUST"), ("b.txt", "rusty")]);
        let config = IndexConfig {
            ignore_case: true,
            ..IndexConfig::default()
        };
        fx.index(&config);

        assert_eq!(hits(&fx.search("RuSt")), vec![("a.txt", 2)]);
        assert_eq!(
            hits(&fx.search("RUST*")),
            vec![("a.txt", 2), ("b.txt", 1)]
        );
        assert_eq!(hits(&fx.search("RUST and not RUSTY")), vec![("a.txt", 0)]);
    }

    #[test]
    fn queries_are_percent_decoded() {
        let fx = Fixture::new(&[("a.txt", "foo bar"), ("b.txt", "bar")]);
        fx.index(&IndexConfig::default());

        assert_eq!(
            hits(&fx.search("foo%20and%20bar")),
            vec![("a.txt", 0)]
        );
        assert!(fx.search("   ").hits.is_empty());
    }
}
