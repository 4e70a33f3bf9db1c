use std::sync::Mutex;

use uuid::Uuid;

use super::{upsert, SceneStore};
use crate::error::{Result, VideoError};
use crate::scene::Scene;

#[derive(Debug, Default)]
pub struct MemorySceneStore {
    records: Mutex<Vec<Scene>>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Vec<Scene>) -> T) -> Result<T> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| VideoError::StoreError("scene store lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

impl SceneStore for MemorySceneStore {
    async fn get_all(&self) -> Result<Vec<Scene>> {
        self.with_records(|records| records.clone())
    }

    async fn put(&self, scene: Scene) -> Result<()> {
        self.with_records(|records| upsert(records, scene))
    }

    async fn bulk_put(&self, scenes: Vec<Scene>) -> Result<()> {
        self.with_records(|records| {
            for scene in scenes {
                upsert(records, scene);
            }
        })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.with_records(|records| records.retain(|s| s.id != id))
    }

    async fn clear(&self) -> Result<()> {
        self.with_records(|records| records.clear())
    }
}
