use serde::Serialize;

use crate::{
    error::Result,
    pagination::{Pagination, RenderedLink},
    query::{QueryEngine, WeightedResult},
};

/// A ranked hit with its 1-based position in the full result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedHit {
    pub rank: usize,
    #[serde(flatten)]
    pub hit: WeightedResult,
}

/// One page of a query's results, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub total: usize,
    pub page: usize,
    pub last_page: usize,
    /// 1-based inclusive bounds of `hits` within the full list.
    pub window: (usize, usize),
    pub hits: Vec<RankedHit>,
    pub links: Vec<RenderedLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<String>,
}

/// Run `query` and cut out page `page` of `per_page` results.
pub fn execute_search(
    engine: &QueryEngine<'_>,
    query: &str,
    page: usize,
    per_page: usize,
) -> Result<SearchPage> {
    let results = engine.search(query)?;
    let pagination = Pagination::new(results.total(), per_page, page);
    let range = pagination.range();
    let offset = range.start;

    let hits = results
        .hits
        .into_iter()
        .skip(range.start)
        .take(range.len())
        .enumerate()
        .map(|(i, hit)| RankedHit {
            rank: offset + i + 1,
            hit,
        })
        .collect();

    Ok(SearchPage {
        query: query.to_string(),
        total: pagination.total,
        page: pagination.page,
        last_page: pagination.last_page,
        window: pagination.window(),
        hits,
        links: pagination.render(query),
        syntax_error: results.syntax_error,
    })
}

/// Format a page for human-readable terminal output.
pub fn format_human(page: &SearchPage) {
    if let Some(error) = &page.syntax_error {
        println!("Syntax error: {error}");
        return;
    }
    if page.hits.is_empty() {
        println!("No results found.");
        return;
    }

    for r in &page.hits {
        if r.hit.frequency > 0 {
            println!("{:>4}. [{}] {}", r.rank, r.hit.frequency, r.hit.filename);
        } else {
            println!("{:>4}. {}", r.rank, r.hit.filename);
        }
    }

    let (start, end) = page.window;
    println!("\n{start}-{end} of {} result(s)", page.total);
    if page.last_page > 1 {
        let bar: Vec<&str> =
            page.links.iter().map(|l| l.label.as_str()).collect();
        println!("{}", bar.join(" "));
    }
}

pub fn format_json(page: &SearchPage) -> Result<()> {
    println!("{}", serde_json::to_string(page)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::IndexConfig,
        indexer::{IndexSession, Operation},
        store::{Store, StoreKind},
        walker,
    };

    fn setup(count: usize) -> (tempfile::TempDir, Store, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        for i in 0..count {
            let body = vec!["needle"; i + 1].join(" ");
            std::fs::write(docs.join(format!("doc{i:02}.txt")), body).unwrap();
        }

        let names =
            Store::open(&tmp.path().join("n.redb"), StoreKind::Names, 10, false)
                .unwrap();
        let words =
            Store::open(&tmp.path().join("w.redb"), StoreKind::Words, 10, false)
                .unwrap();
        let config = IndexConfig::default();
        let mut session = IndexSession::open(&names, &words, &config).unwrap();
        session
            .run(Operation::Add, walker::walk(&docs).unwrap(), false)
            .unwrap();
        drop(session);
        (tmp, names, words)
    }

    #[test]
    fn pages_slice_the_ranked_list() {
        let (_tmp, names, words) = setup(25);
        let engine = QueryEngine::open(&names, &words).unwrap();

        let first = execute_search(&engine, "needle", 1, 10).unwrap();
        assert_eq!(first.total, 25);
        assert_eq!(first.window, (1, 10));
        assert_eq!(first.hits.len(), 10);
        assert_eq!(first.hits[0].rank, 1);
        // Most occurrences first.
        assert_eq!(first.hits[0].hit.filename, "doc24.txt");
        assert_eq!(first.hits[0].hit.frequency, 25);

        let last = execute_search(&engine, "needle", 3, 10).unwrap();
        assert_eq!(last.window, (21, 25));
        assert_eq!(last.hits.len(), 5);
        assert_eq!(last.hits[0].rank, 21);
        assert_eq!(last.hits[4].hit.filename, "doc00.txt");
        assert!(last.links.last().unwrap().href.is_none());
    }

    #[test]
    fn syntax_errors_produce_an_empty_page() {
        let (_tmp, names, words) = setup(3);
        let engine = QueryEngine::open(&names, &words).unwrap();

        let page = execute_search(&engine, "need* le", 1, 10).unwrap();
        assert!(page.hits.is_empty());
        assert_eq!(page.total, 0);
        assert!(page.syntax_error.is_some());
    }

    #[test]
    fn json_shape() {
        let (_tmp, names, words) = setup(2);
        let engine = QueryEngine::open(&names, &words).unwrap();

        let page = execute_search(&engine, "needle", 1, 10).unwrap();
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["hits"][0]["filename"], "doc01.txt");
        assert_eq!(value["hits"][0]["rank"], 1);
        assert!(value.get("syntax_error").is_none());
    }
}
