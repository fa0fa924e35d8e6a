//! Offset pagination types for list endpoints.

use serde::{Deserialize, Serialize};

/// Largest page an admin list endpoint will return.
pub const MAX_LIMIT: u64 = 100;

/// Request parameters for offset-paginated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of rows to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of rows to return.
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_limit(),
        }
    }
}

impl PageRequest {
    /// Creates a request, clamping `limit` to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Returns the clamped limit for database queries.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

/// Response wrapper for offset-paginated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPage<T> {
    /// The items in the current page.
    pub items: Vec<T>,
    /// Offset that produced this page.
    pub offset: u64,
    /// Limit that produced this page.
    pub limit: u64,
    /// Total number of matching items.
    pub total: u64,
    /// Whether another page exists past this one.
    pub has_more: bool,
}

impl<T> OffsetPage<T> {
    /// Creates a new page.
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let limit = request.limit();
        Self {
            items,
            offset: request.offset,
            limit,
            total,
            has_more: request.offset.saturating_add(limit) < total,
        }
    }
}
