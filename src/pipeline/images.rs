use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tracing::{info, warn};

use crate::api::ImageSynthesizer;
use crate::error::{Result, VideoError};
use crate::scene::{AcquisitionProgress, Scene};

/// Requests one image per scene concurrently.
///
/// A failed request leaves that scene without an image and never aborts its
/// siblings. `on_progress` fires once up front with `current == 0` and then
/// once per settled request. Output order always matches input order.
pub async fn acquire_all<S: ImageSynthesizer>(
    synthesizer: &S,
    scenes: Vec<Scene>,
    on_progress: &dyn Fn(AcquisitionProgress),
) -> Vec<Scene> {
    let total = scenes.len();
    let settled = AtomicUsize::new(0);
    on_progress(AcquisitionProgress { current: 0, total });

    let requests = scenes.iter().enumerate().map(|(index, scene)| {
        let settled = &settled;
        async move {
            let image = match synthesizer.synthesize(&scene.image_prompt).await {
                Ok(Some(image)) => Some(image),
                Ok(None) => {
                    warn!("Scene {} image response carried no image data", index);
                    None
                }
                Err(e) => {
                    warn!("Scene {} image generation failed: {}", index, e);
                    None
                }
            };
            let current = settled.fetch_add(1, Ordering::SeqCst) + 1;
            on_progress(AcquisitionProgress { current, total });
            image
        }
    });

    let images = join_all(requests).await;

    let acquired = images.iter().filter(|i| i.is_some()).count();
    info!("Acquired {}/{} scene images", acquired, total);

    scenes
        .into_iter()
        .zip(images)
        .map(|(mut scene, image)| {
            scene.image = image;
            scene
        })
        .collect()
}

/// Batch gate: any scene without an image fails the whole set.
pub fn ensure_complete(scenes: &[Scene]) -> Result<()> {
    let missing = scenes.iter().filter(|s| !s.has_image()).count();
    if missing > 0 {
        return Err(VideoError::IncompleteImageSetError {
            missing,
            total: scenes.len(),
        });
    }
    Ok(())
}
