//! Citrus farm records: version-tolerant loading, filtering, persistence
//! gateways, backup/restore and spreadsheet reports.

use std::sync::Arc;

use tracing::info;

pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod http;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod report;
pub mod state;
pub mod time;

pub use error::{AppError, AppResult};

use config::{AppConfig, Backend};
use gateway::{FarmGateway, FileSnapshot, MemorySnapshot, RemoteGateway, SnapshotGateway, SqliteGateway};

/// Builds the gateway selected by `config.backend`.
///
/// The SQLite backend is migrated to the latest schema before it is returned.
pub async fn open_gateway(config: &AppConfig) -> AppResult<Arc<dyn FarmGateway>> {
    let gateway: Arc<dyn FarmGateway> = match config.backend {
        Backend::Sqlite => {
            let pool = db::open_sqlite_pool(&config.database_url).await?;
            migrate::apply_migrations(&pool).await?;
            Arc::new(SqliteGateway::new(pool))
        }
        Backend::File => Arc::new(SnapshotGateway::open(FileSnapshot::new(config.snapshot_path()))?),
        Backend::Memory => Arc::new(SnapshotGateway::open(MemorySnapshot::new())?),
        Backend::Remote => {
            let url = config
                .remote_url
                .as_deref()
                .ok_or_else(|| AppError::missing_field("remote_url"))?;
            Arc::new(RemoteGateway::new(url)?.with_page_size(config.page_size))
        }
    };
    info!(target: "citrus_farms", event = "gateway_opened", backend = ?config.backend);
    Ok(gateway)
}
