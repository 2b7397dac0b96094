use serde::{Deserialize, Serialize};

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self { Self { page: page.max(1), per_page: per_page.max(1) } }

    /// Reads a `page=` parameter. Anything that is not a positive integer is page 1.
    pub fn from_param(page: Option<&str>, per_page: u32) -> Self {
        let page = page.and_then(|p| p.trim().parse::<u32>().ok()).unwrap_or(1);
        Self::new(page, per_page)
    }

    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page) }

    /// Same request moved onto the last page when it points past the end.
    pub fn clamp(self, total: u64) -> Self {
        let pages = page_count(total, self.per_page);
        Self { page: self.page.min(pages), ..self }
    }
}

fn page_count(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX).max(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn num_pages(&self) -> u32 { page_count(self.total, self.per_page) }

    pub fn has_next(&self) -> bool { self.page < self.num_pages() }

    pub fn has_previous(&self) -> bool { self.page > 1 }
}
