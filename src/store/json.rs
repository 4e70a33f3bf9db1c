use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{upsert, SceneStore};
use crate::error::Result;
use crate::scene::Scene;

/// Scene records kept in one pretty-printed JSON file, rewritten on every change.
/// Image bytes are stored as base64 strings.
#[derive(Debug)]
pub struct JsonSceneStore {
    path: PathBuf,
    records: Mutex<Vec<Scene>>,
}

impl JsonSceneStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable scene store {}: {}", path.display(), e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &[Scene]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

impl SceneStore for JsonSceneStore {
    async fn get_all(&self) -> Result<Vec<Scene>> {
        Ok(self.records.lock().await.clone())
    }

    async fn put(&self, scene: Scene) -> Result<()> {
        let mut records = self.records.lock().await;
        upsert(&mut records, scene);
        self.persist(&records).await
    }

    async fn bulk_put(&self, scenes: Vec<Scene>) -> Result<()> {
        let mut records = self.records.lock().await;
        for scene in scenes {
            upsert(&mut records, scene);
        }
        self.persist(&records).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock().await;
        records.retain(|s| s.id != id);
        self.persist(&records).await
    }

    async fn clear(&self) -> Result<()> {
        let mut records = self.records.lock().await;
        records.clear();
        self.persist(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneImage, Transition};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("scene-video-{}-{}", name, Uuid::new_v4()))
            .join("scenes.json")
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let path = temp_path("reopen");
        let mut scene = Scene::new("d".into(), "p".into(), 4.5, Transition::WipeDown);
        scene.image = Some(SceneImage::new("image/png", vec![9, 8, 7]));

        {
            let store = JsonSceneStore::open(&path).await.unwrap();
            store.bulk_put(vec![scene.clone()]).await.unwrap();
        }

        let reopened = JsonSceneStore::open(&path).await.unwrap();
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all, vec![scene.clone()]);
        assert_eq!(all[0].duration, 4.5);
        assert_eq!(all[0].transition, Transition::WipeDown);
        assert_eq!(all[0].image.as_ref().unwrap().data, vec![9, 8, 7]);

        reopened.clear().await.unwrap();
        let cleared = JsonSceneStore::open(&path).await.unwrap();
        assert!(cleared.get_all().await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn file_size_tracks_image_size() {
        let path = temp_path("size");
        let bytes: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut scene = Scene::new("d".into(), "p".into(), 3.0, Transition::Fade);
        scene.image = Some(SceneImage::new("image/png", bytes.clone()));

        let store = JsonSceneStore::open(&path).await.unwrap();
        store.put(scene).await.unwrap();

        let file_len = std::fs::metadata(&path).unwrap().len() as usize;
        assert!(
            file_len < bytes.len() * 3 / 2,
            "{} bytes on disk for a {} byte image",
            file_len,
            bytes.len()
        );

        let reopened = JsonSceneStore::open(&path).await.unwrap();
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all[0].image.as_ref().unwrap().data, bytes);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn unreadable_file_starts_empty() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = JsonSceneStore::open(&path).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
