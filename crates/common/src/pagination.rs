use serde::{Deserialize, Serialize};

/// Pagination request params shared by every list endpoint (spec.md §6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default = "PageParams::default_page")]
    pub page: u32,
    #[serde(default = "PageParams::default_page_size")]
    pub page_size: u32,
}

impl PageParams {
    fn default_page() -> u32 {
        1
    }

    fn default_page_size() -> u32 {
        20
    }

    pub fn offset(&self) -> i64 {
        ((self.page.max(1) - 1) * self.page_size) as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size.max(1) as i64
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            page_size: Self::default_page_size(),
        }
    }
}

/// `{page, pageSize, total, totalPages}` response envelope (spec.md §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: PageParams, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as u32) + params.page_size - 1) / params.page_size.max(1)
        };
        Self {
            items,
            page: params.page,
            page_size: params.page_size,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_offset_and_limit() {
        let params = PageParams { page: 3, page_size: 10 };
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], PageParams { page: 1, page_size: 10 }, 25);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn total_pages_zero_when_empty() {
        let page: Page<i32> = Page::new(vec![], PageParams::default(), 0);
        assert_eq!(page.total_pages, 0);
    }
}
