use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::{total_pages, validate_farm, FarmGateway, FarmPage, PageRequest};
use crate::error::RESTORE_NOT_ARRAY;
use crate::model::Farm;
use crate::normalize::normalize_with_changes;
use crate::{AppError, AppResult};

/// Durable home of the JSON array snapshot.
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing has been persisted yet.
    fn load(&self) -> AppResult<Option<String>>;
    fn persist(&self, snapshot: &str) -> AppResult<()>;
}

#[derive(Default)]
pub struct MemorySnapshot {
    data: Mutex<Option<String>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(snapshot: impl Into<String>) -> Self {
        MemorySnapshot {
            data: Mutex::new(Some(snapshot.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SnapshotStore for MemorySnapshot {
    fn load(&self) -> AppResult<Option<String>> {
        Ok(self.contents())
    }

    fn persist(&self, snapshot: &str) -> AppResult<()> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(snapshot.to_string());
        Ok(())
    }
}

/// Snapshot kept in a single JSON file, replaced atomically on every write.
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshot { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshot {
    fn load(&self) -> AppResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(AppError::from(err).with_context("path", self.path.display().to_string()))
            }
        }
    }

    fn persist(&self, snapshot: &str) -> AppResult<()> {
        let with_path = |err: std::io::Error| {
            AppError::from(err).with_context("path", self.path.display().to_string())
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(with_path)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(with_path)?;
        tmp.write_all(snapshot.as_bytes()).map_err(with_path)?;
        tmp.as_file().sync_all().map_err(with_path)?;
        tmp.persist(&self.path).map_err(|err| with_path(err.error))?;
        Ok(())
    }
}

/// Gateway over an in-memory collection that writes through to a [`SnapshotStore`].
pub struct SnapshotGateway<S: SnapshotStore> {
    store: S,
    farms: Mutex<Vec<Farm>>,
}

impl<S: SnapshotStore> SnapshotGateway<S> {
    /// Loads and upgrades the persisted snapshot, writing it back when the upgrade changed it.
    pub fn open(store: S) -> AppResult<Self> {
        let farms = match store.load()? {
            None => {
                store.persist("[]")?;
                info!(target: "citrus_farms", event = "snapshot_seeded");
                Vec::new()
            }
            Some(text) => {
                let raw: Value = serde_json::from_str(&text)
                    .map_err(|e| AppError::from(e).with_context("source", "snapshot"))?;
                let Value::Array(records) = raw else {
                    return Err(AppError::new(
                        RESTORE_NOT_ARRAY,
                        "Persisted snapshot is not a JSON array",
                    )
                    .with_context("source", "snapshot"));
                };
                let normalized = normalize_with_changes(&records);
                if normalized.changed {
                    store.persist(&encode(&normalized.farms)?)?;
                    info!(
                        target: "citrus_farms",
                        event = "snapshot_upgraded",
                        records = normalized.farms.len()
                    );
                }
                normalized.farms
            }
        };

        Ok(SnapshotGateway {
            store,
            farms: Mutex::new(farms),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Farm>> {
        self.farms.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `change` and persists; the in-memory collection is restored if either fails.
    fn mutate<R>(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut Vec<Farm>) -> AppResult<R>,
    ) -> AppResult<R> {
        let mut guard = self.lock();
        let previous = guard.clone();
        let result = change(&mut *guard).and_then(|value| {
            let text = encode(&guard)?;
            self.store.persist(&text)?;
            Ok(value)
        });
        if let Err(err) = &result {
            *guard = previous;
            warn!(
                target: "citrus_farms",
                event = "snapshot_write_failed",
                operation,
                error = %err
            );
        }
        result.map_err(|err| err.with_context("operation", operation))
    }
}

fn encode(farms: &[Farm]) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(farms)?)
}

#[async_trait]
impl<S: SnapshotStore> FarmGateway for SnapshotGateway<S> {
    async fn load_all(&self, page: Option<PageRequest>) -> AppResult<FarmPage> {
        let farms = self.lock().clone();
        let total = farms.len() as u64;
        let Some(page) = page else {
            let total_pages = if farms.is_empty() { 0 } else { 1 };
            return Ok(FarmPage { farms, total_pages });
        };

        let mut sorted = farms;
        sorted.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
        let start = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let farms = sorted
            .into_iter()
            .skip(start)
            .take(page.limit as usize)
            .collect();
        Ok(FarmPage {
            farms,
            total_pages: total_pages(total, page.limit),
        })
    }

    async fn save(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let saved = farm.clone();
        self.mutate("save", move |farms| {
            match farms.iter().position(|existing| existing.id == farm.id) {
                Some(index) => farms[index] = farm,
                None => farms.push(farm),
            }
            Ok(())
        })?;
        info!(target: "citrus_farms", event = "farm_saved", id = %saved.id);
        Ok(saved)
    }

    async fn create(&self, farm: Farm) -> AppResult<Farm> {
        validate_farm(&farm)?;
        let saved = farm.clone();
        self.mutate("create", move |farms| {
            if farms.iter().any(|existing| existing.id == farm.id) {
                return Err(AppError::conflict(&farm.id));
            }
            farms.push(farm);
            Ok(())
        })?;
        info!(target: "citrus_farms", event = "farm_created", id = %saved.id);
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.lock().iter().any(|farm| farm.id == id) {
            return Ok(());
        }
        self.mutate("delete", |farms| {
            farms.retain(|farm| farm.id != id);
            Ok(())
        })
        .map_err(|err| err.with_context("id", id))?;
        info!(target: "citrus_farms", event = "farm_deleted", id = %id);
        Ok(())
    }

    async fn replace_all(&self, farms: Vec<Farm>) -> AppResult<()> {
        for farm in &farms {
            validate_farm(farm)?;
        }
        let count = farms.len();
        self.mutate("replace_all", move |current| {
            let duplicate = {
                let mut seen = std::collections::HashSet::new();
                farms
                    .iter()
                    .find(|farm| !seen.insert(farm.id.as_str()))
                    .map(|farm| farm.id.clone())
            };
            if let Some(id) = duplicate {
                return Err(AppError::conflict(&id));
            }
            *current = farms;
            Ok(())
        })?;
        info!(target: "citrus_farms", event = "restore_applied", records = count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm(id: &str, name: &str) -> Farm {
        Farm {
            id: id.into(),
            name: name.into(),
            ..Farm::default()
        }
    }

    #[tokio::test]
    async fn seeds_empty_snapshot() {
        let gateway = SnapshotGateway::open(MemorySnapshot::new()).expect("open");
        assert_eq!(gateway.store().contents().as_deref(), Some("[]"));
        let page = gateway.load_all(None).await.expect("load");
        assert!(page.farms.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn save_is_upsert_in_stored_order() {
        let gateway = SnapshotGateway::open(MemorySnapshot::new()).expect("open");
        gateway.save(farm("b", "Zeta")).await.expect("save b");
        gateway.save(farm("a", "Alpha")).await.expect("save a");
        gateway.save(farm("b", "Beta")).await.expect("update b");

        let all = gateway.load_all(None).await.expect("load");
        let names: Vec<_> = all.farms.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);

        let page = gateway
            .load_all(Some(PageRequest::new(1, 1).expect("page")))
            .await
            .expect("page");
        assert_eq!(page.farms[0].name, "Alpha");
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn create_rejects_existing_identifier() {
        let gateway = SnapshotGateway::open(MemorySnapshot::new()).expect("open");
        gateway.create(farm("a", "Alpha")).await.expect("create");
        let err = gateway.create(farm("a", "Again")).await.expect_err("conflict");
        assert!(err.is_conflict());
        let all = gateway.load_all(None).await.expect("load");
        assert_eq!(all.farms[0].name, "Alpha");
    }

    #[tokio::test]
    async fn delete_unknown_id_is_noop() {
        let gateway = SnapshotGateway::open(MemorySnapshot::new()).expect("open");
        gateway.delete("missing").await.expect("idempotent delete");
    }
}
