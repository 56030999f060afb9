//! Pagination normalization.
//!
//! Callers use two styles: `page`/`pageSize` and `limit`/`offset`. Both
//! reduce to one canonical window; limit/offset wins when both are
//! supplied. Page sizes are clamped to [1, 100] and pages to >= 1 so a
//! hostile or buggy client can never request an unbounded scan.

use serde::{Deserialize, Serialize};

/// Largest page a single query may return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Page size when the caller names none.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Raw pagination parameters as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// The canonical window a query runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: usize,
    pub offset: usize,
    /// 1-based page the window corresponds to
    pub page: usize,
}

impl PageRequest {
    /// Reconciles the two request styles into one window.
    pub fn normalize(&self) -> PageWindow {
        if self.limit.is_some() || self.offset.is_some() {
            let limit = clamp_size(self.limit.unwrap_or(DEFAULT_PAGE_SIZE as u64));
            let offset = self.offset.unwrap_or(0) as usize;
            PageWindow {
                limit,
                offset,
                page: offset / limit + 1,
            }
        } else {
            let limit = clamp_size(self.page_size.unwrap_or(DEFAULT_PAGE_SIZE as u64));
            let page = self.page.unwrap_or(1).max(1) as usize;
            PageWindow {
                limit,
                // Saturate rather than overflow for absurd page numbers;
                // the window then simply lands past the data.
                offset: (page - 1).saturating_mul(limit),
                page,
            }
        }
    }
}

fn clamp_size(size: u64) -> usize {
    (size.max(1) as usize).min(MAX_PAGE_SIZE)
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Assembles a page from the bounded item slice and the unpaged total.
    pub fn new(items: Vec<T>, total: usize, window: PageWindow) -> Self {
        Self {
            items,
            total,
            page: window.page,
            page_size: window.limit,
            total_pages: total.div_ceil(window.limit),
        }
    }
}
