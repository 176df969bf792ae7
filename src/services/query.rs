//! Member query service: filtered, paged, sorted admin search.

use std::sync::Arc;

use crate::db::{self, Repository};
use crate::errors::AppError;
use crate::models::{Member, MemberFilter, PageResponse};

pub struct MemberQueryService {
    repo: Arc<Repository>,
}

impl MemberQueryService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Run the admin search. Page size is clamped to 1..=100 and unknown
    /// sort columns fall back to the registration date.
    pub async fn search(&self, filter: &MemberFilter) -> Result<PageResponse<Member>, AppError> {
        let page = filter.page.unwrap_or(0).max(0);
        let size = filter.size.unwrap_or(20).clamp(1, 100);
        let (sort_col, descending) = resolve_sort(filter);

        let total = self.repo.count_members(filter).await?;
        let content = self
            .repo
            .find_members(filter, sort_col, descending, Some((size, page * size)))
            .await?;

        Ok(PageResponse::new(content, page, size, total))
    }
}

/// Resolve the requested sort against the column whitelist.
pub(crate) fn resolve_sort(filter: &MemberFilter) -> (&'static str, bool) {
    let sort_col = filter
        .sort_by
        .as_deref()
        .and_then(db::sort_column)
        .unwrap_or("registration_date");
    let descending = filter
        .dir
        .as_deref()
        .is_some_and(|d| d.eq_ignore_ascii_case("desc"));
    (sort_col, descending)
}
