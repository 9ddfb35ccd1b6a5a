//! Domain models

pub mod audit;
pub mod auth;
pub mod contact;
pub mod content;
pub mod dashboard;
pub mod principal;

use serde::Serialize;

/// Paginated list envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 { 0 } else { ((total.max(0) as u64).div_ceil(limit as u64)) as u32 };
        Self { items, total, page, limit, total_pages }
    }
}

/// Clamp `page`/`limit` query values; limit is capped at 100
pub fn pagination(page: Option<u32>, limit: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let offset = ((page - 1) as i64) * (limit as i64);
    (page, limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps_limit() {
        assert_eq!(pagination(None, None), (1, 20, 0));
        assert_eq!(pagination(Some(3), Some(500)), (3, 100, 200));
        assert_eq!(pagination(Some(0), Some(0)), (1, 1, 0));
    }

    #[test]
    fn test_page_counts_total_pages() {
        let page: Page<u8> = Page::new(vec![], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
    }
}
