mod json;
mod memory;

pub use json::JsonSceneStore;
pub use memory::MemorySceneStore;

use uuid::Uuid;

use crate::error::Result;
use crate::scene::Scene;

/// Whole-job scene records keyed by `Scene::id`.
#[allow(async_fn_in_trait)]
pub trait SceneStore {
    async fn get_all(&self) -> Result<Vec<Scene>>;
    async fn put(&self, scene: Scene) -> Result<()>;
    async fn bulk_put(&self, scenes: Vec<Scene>) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Inserts or replaces `scene`, keeping first-insertion order.
fn upsert(records: &mut Vec<Scene>, scene: Scene) {
    match records.iter_mut().find(|s| s.id == scene.id) {
        Some(existing) => *existing = scene,
        None => records.push(scene),
    }
}
