use std::ops::Range;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

/// One element of the page-link bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageLink {
    /// `target` is `None` on the first page.
    Previous { target: Option<usize> },
    Page { number: usize, current: bool },
    /// More than one page skipped.
    Ellipsis,
    /// `target` is `None` on the last page.
    Next { target: Option<usize> },
}

impl PageLink {
    pub fn target(&self) -> Option<usize> {
        match *self {
            PageLink::Previous { target } | PageLink::Next { target } => target,
            PageLink::Page { number, current } => (!current).then_some(number),
            PageLink::Ellipsis => None,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            PageLink::Previous { .. } => "prev".to_string(),
            PageLink::Next { .. } => "next".to_string(),
            PageLink::Page { number, current: true } => format!("[{number}]"),
            PageLink::Page { number, .. } => number.to_string(),
            PageLink::Ellipsis => "...".to_string(),
        }
    }
}

/// A link rendered against a concrete query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedLink {
    pub label: String,
    pub href: Option<String>,
    #[serde(flatten)]
    pub link: PageLink,
}

/// Href for `page` of `query`.
pub fn page_href(query: &str, page: usize) -> String {
    format!(
        "?query={}&page={page}",
        utf8_percent_encode(query, NON_ALPHANUMERIC)
    )
}

/// A page of `per_page` results out of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub per_page: usize,
    /// Current page, clamped into `1..=last_page`.
    pub page: usize,
    pub last_page: usize,
}

impl Pagination {
    pub fn new(total: usize, per_page: usize, page: usize) -> Self {
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            total,
            per_page,
            page: page.clamp(1, last_page),
            last_page,
        }
    }

    /// 1-based inclusive bounds of the visible results; `(0, 0)` when
    /// there are none.
    pub fn window(&self) -> (usize, usize) {
        if self.total == 0 {
            return (0, 0);
        }
        let start = (self.page - 1) * self.per_page + 1;
        let end = (self.page * self.per_page).min(self.total);
        (start, end)
    }

    /// Zero-based slice range of the visible results.
    pub fn range(&self) -> Range<usize> {
        match self.window() {
            (0, _) => 0..0,
            (start, end) => start - 1..end,
        }
    }

    pub fn links(&self) -> Vec<PageLink> {
        let (page, last) = (self.page, self.last_page);
        let previous = PageLink::Previous {
            target: (page > 1).then(|| page - 1),
        };
        let next = PageLink::Next {
            target: (page < last).then(|| page + 1),
        };
        if last == 1 {
            return vec![previous, next];
        }

        let at = |number| PageLink::Page {
            number,
            current: number == page,
        };
        let before = page - 1;
        let after = page + 1;

        let mut links = vec![previous, at(1)];
        if before > 2 {
            links.push(if before == 3 { at(2) } else { PageLink::Ellipsis });
        }
        for n in before.max(2)..=after.min(last - 1) {
            links.push(at(n));
        }
        if after + 1 < last {
            links.push(if after + 2 == last {
                at(last - 1)
            } else {
                PageLink::Ellipsis
            });
        }
        links.push(at(last));
        links.push(next);
        links
    }

    pub fn render(&self, query: &str) -> Vec<RenderedLink> {
        self.links()
            .into_iter()
            .map(|link| RenderedLink {
                label: link.label(),
                href: link.target().map(|p| page_href(query, p)),
                link,
            })
            .collect()
    }
}
