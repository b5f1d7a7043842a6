use serde::Deserialize;

/// Offset pagination as used by the listing routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub items_per_page: u32,
}

impl Page {
    pub fn new(page_number: u32, items_per_page: u32) -> Self {
        Self {
            page_number,
            items_per_page,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.items_per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page_number) * i64::from(self.items_per_page)
    }
}
