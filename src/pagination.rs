use serde::Deserialize;

use crate::{
    config::PaginationConfig,
    error::{AppError, AppResult},
};

/// Raw paging query parameters. Kept as strings so a malformed value becomes
/// our own validation error instead of a bare extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "orderBy", alias = "order_by")]
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based.
    pub page: i64,
    pub size: i64,
}

fn parse_positive(name: &str, raw: Option<&str>, default: i64) -> AppResult<i64> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    let v: i64 = raw
        .parse()
        .map_err(|_| AppError::validation(format!("{name} must be an integer")))?;
    if v < 1 {
        return Err(AppError::validation(format!("{name} must be >= 1")));
    }
    Ok(v)
}

impl Pagination {
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size }
    }

    pub fn from_params(
        page: Option<&str>,
        size: Option<&str>,
        cfg: &PaginationConfig,
    ) -> AppResult<Self> {
        let page = parse_positive("page", page, 1)?;
        let size = parse_positive("size", size, cfg.default_size)?;
        if size > cfg.max_size {
            return Err(AppError::validation(format!(
                "size must be <= {}",
                cfg.max_size
            )));
        }
        Ok(Self::new(page, size))
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    pub fn total_pages(&self, total_count: i64) -> i64 {
        if total_count <= 0 {
            return 0;
        }
        (total_count + self.size - 1) / self.size
    }

    pub fn has_more(&self, total_count: i64) -> bool {
        self.page < self.total_pages(total_count)
    }
}
