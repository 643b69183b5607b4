use serde::{Deserialize, Serialize};

pub const FALLBACK_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PaginationQuery {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let mut query = Self {
            page: page.unwrap_or_else(default_page),
            limit: limit.unwrap_or_else(default_limit),
        };
        query.validate();
        query
    }

    pub fn validate(&mut self) {
        if self.page < 1 {
            self.page = 1;
        }
        if self.limit < 1 {
            self.limit = default_limit();
        }
        if self.limit > MAX_PAGE_SIZE {
            self.limit = MAX_PAGE_SIZE;
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfos {
    pub total_count: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub page_size: i64,
}

impl PaginationInfos {
    pub fn offset(&self) -> i64 {
        (self.current_page - 1).saturating_mul(self.page_size)
    }
}

pub fn prep_pagination_infos(total_count: i64, page: i64, limit: i64) -> PaginationInfos {
    let limit = if limit <= 0 {
        FALLBACK_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };

    let mut page = page;
    if total_count < limit {
        page = 1;
    }
    if page < 1 {
        page = 1;
    }

    PaginationInfos {
        total_count,
        current_page: page,
        total_pages: total_pages(total_count.max(0), limit),
        page_size: limit,
    }
}

fn total_pages(total_count: i64, limit: i64) -> i64 {
    total_count / limit + i64::from(total_count % limit != 0)
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}
