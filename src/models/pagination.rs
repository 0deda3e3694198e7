//! List query parameters and the pagination envelope shared by every list endpoint.
//!
//! Query values arrive as raw strings so that absent, empty, non-numeric or
//! non-positive values fall back to the defaults instead of rejecting the request.

use serde::{Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_ITEMS_PER_PAGE: u32 = 10;

/// Default (first) page
pub const DEFAULT_PAGE: u32 = 1;

/// Raw list query string: `?page=&items_per_page=&search=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub items_per_page: Option<String>,
    pub search: Option<String>,
}

/// Normalized list parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub items_per_page: u32,
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            search: None,
        }
    }
}

impl From<ListQuery> for ListParams {
    fn from(query: ListQuery) -> Self {
        let search = query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            page: parse_positive(query.page.as_deref()).unwrap_or(DEFAULT_PAGE),
            items_per_page: parse_positive(query.items_per_page.as_deref())
                .unwrap_or(DEFAULT_ITEMS_PER_PAGE),
            search,
        }
    }
}

fn parse_positive(value: Option<&str>) -> Option<u32> {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v >= 1)
}

impl ListParams {
    /// Create list parameters without a search keyword.
    /// Zero values are replaced by the defaults.
    pub fn new(page: u32, items_per_page: u32) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            items_per_page: if items_per_page == 0 {
                DEFAULT_ITEMS_PER_PAGE
            } else {
                items_per_page
            },
            search: None,
        }
    }

    /// Attach a search keyword
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.trim().is_empty() {
            None
        } else {
            Some(search.trim().to_string())
        };
        self
    }

    /// Rows to skip: `(page - 1) * items_per_page`
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.items_per_page as i64
    }

    /// Rows to take
    pub fn limit(&self) -> i64 {
        self.items_per_page as i64
    }

    /// `LIKE` pattern matching the keyword anywhere in a column.
    ///
    /// `%`, `_` and `\` in the keyword are escaped with a backslash so they
    /// match literally.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|kw| {
            let mut escaped = String::with_capacity(kw.len() + 2);
            escaped.push('%');
            for c in kw.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
    }
}

/// Number of pages needed for `total` rows: `ceil(total / items_per_page)`
pub fn last_page(total: i64, items_per_page: u32) -> u32 {
    if total <= 0 || items_per_page == 0 {
        return 0;
    }
    let per_page = items_per_page as i64;
    ((total + per_page - 1) / per_page) as u32
}

/// Pagination envelope.
///
/// `next_page` is `page + 1` while that stays within `last_page`; `prev_page`
/// is `page - 1` whenever `page > 1`, even past the last page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(rename = "currentPage")]
    pub current_page: u32,
    pub items_per_page: u32,
    pub total: i64,
    pub last_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, params: &ListParams) -> Self {
        let last_page = last_page(total, params.items_per_page);
        let page = params.page;

        Self {
            data,
            current_page: page,
            items_per_page: params.items_per_page,
            total,
            last_page,
            next_page: if page < last_page { Some(page + 1) } else { None },
            prev_page: if page > 1 { Some(page - 1) } else { None },
        }
    }

    /// Convert the items while keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            items_per_page: self.items_per_page,
            total: self.total,
            last_page: self.last_page,
            next_page: self.next_page,
            prev_page: self.prev_page,
        }
    }
}
