//! Backend-agnostic persistence contract for farm aggregates.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{VALIDATION_DUPLICATE_ID, VALIDATION_NEGATIVE_VALUE, VALIDATION_PAGE};
use crate::model::Farm;
use crate::{AppError, AppResult};

pub mod remote;
pub mod snapshot;
pub mod sqlite;

pub use remote::RemoteGateway;
pub use snapshot::{FileSnapshot, MemorySnapshot, SnapshotGateway, SnapshotStore};
pub use sqlite::SqliteGateway;

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> AppResult<Self> {
        if page == 0 || limit == 0 {
            return Err(AppError::new(
                VALIDATION_PAGE,
                "Page and limit must both be at least 1",
            )
            .with_context("page", page.to_string())
            .with_context("limit", limit.to_string()));
        }
        Ok(PageRequest { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmPage {
    pub farms: Vec<Farm>,
    pub total_pages: u32,
}

pub fn total_pages(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(limit));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Checks a submitted aggregate before any store is touched.
pub fn validate_farm(farm: &Farm) -> AppResult<()> {
    if farm.id.trim().is_empty() {
        return Err(AppError::missing_field("id"));
    }
    if farm.name.trim().is_empty() {
        return Err(AppError::missing_field("name").with_context("id", farm.id.clone()));
    }

    let negative = |field: &str, plot_id: &str| {
        AppError::new(
            VALIDATION_NEGATIVE_VALUE,
            format!("`{field}` must not be negative"),
        )
        .with_context("field", field)
        .with_context("id", farm.id.clone())
        .with_context("plot_id", plot_id)
    };

    let mut plot_ids = HashSet::new();
    for plot in &farm.plots {
        if !plot_ids.insert(plot.id.as_str()) {
            return Err(AppError::new(
                VALIDATION_DUPLICATE_ID,
                "Plot identifiers must be unique within a farm",
            )
            .with_context("id", farm.id.clone())
            .with_context("plot_id", plot.id.clone()));
        }
        if plot.area_pyeong < 0.0 {
            return Err(negative("areaPyeong", &plot.id));
        }
        if plot.tree_count < 0 {
            return Err(negative("treeCount", &plot.id));
        }
        for program in &plot.support_programs {
            if program.local_govt_fund < 0 {
                return Err(negative("localGovtFund", &plot.id));
            }
            if program.self_fund < 0 {
                return Err(negative("selfFund", &plot.id));
            }
        }
    }
    Ok(())
}

#[async_trait]
pub trait FarmGateway: Send + Sync {
    /// All farms, or one page of farms ordered by name.
    async fn load_all(&self, page: Option<PageRequest>) -> AppResult<FarmPage>;

    /// Insert or fully replace a farm and its owned children.
    async fn save(&self, farm: Farm) -> AppResult<Farm>;

    /// Insert only; an existing identifier is a `FARM/CONFLICT`.
    async fn create(&self, farm: Farm) -> AppResult<Farm>;

    /// Deleting an unknown identifier succeeds.
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Swap the whole collection, leaving the store untouched on failure.
    async fn replace_all(&self, farms: Vec<Farm>) -> AppResult<()>;
}
