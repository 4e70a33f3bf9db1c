use std::cell::Cell;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::timeline::Timeline;
use super::RenderBackend;
use crate::error::{Result, VideoError};
use crate::scene::{Scene, SceneImage, VideoArtifact};

/// A still handed to the backend, held for `hold_secs`.
#[derive(Debug, Clone)]
pub struct RenderInput<'a> {
    pub image: &'a SceneImage,
    pub hold_secs: f64,
}

/// Everything the backend needs for one render.
#[derive(Debug, Clone)]
pub struct RenderJob<'a> {
    pub inputs: Vec<RenderInput<'a>>,
    pub filter_graph: String,
    pub total_duration: f64,
}

/// Converts ordered scenes into a crossfade timeline and drives the backend.
#[derive(Debug, Clone)]
pub struct Assembler {
    crossfade_secs: f64,
}

impl Assembler {
    pub fn new(crossfade_secs: f64) -> Self {
        Self { crossfade_secs }
    }

    pub fn crossfade_secs(&self) -> f64 {
        self.crossfade_secs
    }

    pub fn plan<'a>(&self, scenes: &'a [Scene]) -> Result<RenderJob<'a>> {
        let timeline = Timeline::build(scenes, self.crossfade_secs)?;

        for fade in timeline.crossfades.iter().filter(|c| !c.declared.is_rendered()) {
            debug!(
                "Transition {:?} into {} rendered as fade",
                fade.declared, fade.to
            );
        }

        let inputs = scenes
            .iter()
            .zip(&timeline.inputs)
            .enumerate()
            .map(|(i, (scene, input))| {
                let image = scene.image.as_ref().ok_or_else(|| {
                    VideoError::RenderError(format!("scene {} has no image", i))
                })?;
                Ok(RenderInput {
                    image,
                    hold_secs: input.hold_secs,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RenderJob {
            inputs,
            filter_graph: timeline.filter_graph(),
            total_duration: timeline.total_duration,
        })
    }

    /// Renders `scenes` into one video.
    ///
    /// `on_progress` sees a non-decreasing percentage; 100 is only reported
    /// after the backend finished successfully.
    pub async fn assemble<B: RenderBackend>(
        &self,
        backend: &B,
        scenes: &[Scene],
        on_progress: &dyn Fn(u8),
        cancel: &CancellationToken,
    ) -> Result<VideoArtifact> {
        if !backend.is_ready() {
            return Err(VideoError::RenderError(format!(
                "render backend is not ready ({:?})",
                backend.state()
            )));
        }

        let job = self.plan(scenes)?;
        info!(
            "Assembling {} scenes into {}s of video",
            job.inputs.len(),
            job.total_duration
        );

        let reported = Cell::new(0u8);
        on_progress(0);
        let track = |fraction: f64| {
            let percent = to_percent(fraction).min(99);
            if percent > reported.get() {
                reported.set(percent);
                on_progress(percent);
            }
        };

        let artifact = backend.render(&job, &track, cancel).await?;
        on_progress(100);
        Ok(artifact)
    }
}

fn to_percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transition;
    use crate::video::BackendState;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedBackend {
        state: BackendState,
        fractions: Vec<f64>,
        fail_with: Option<String>,
        seen: Mutex<Option<(String, f64, Vec<f64>)>>,
    }

    impl ScriptedBackend {
        fn ready(fractions: Vec<f64>) -> Self {
            Self {
                state: BackendState::Ready,
                fractions,
                fail_with: None,
                seen: Mutex::new(None),
            }
        }
    }

    impl RenderBackend for ScriptedBackend {
        fn state(&self) -> BackendState {
            self.state.clone()
        }

        async fn render(
            &self,
            job: &RenderJob<'_>,
            progress: &dyn Fn(f64),
            _cancel: &CancellationToken,
        ) -> Result<VideoArtifact> {
            *self.seen.lock().unwrap() = Some((
                job.filter_graph.clone(),
                job.total_duration,
                job.inputs.iter().map(|i| i.hold_secs).collect(),
            ));
            for f in &self.fractions {
                progress(*f);
            }
            if let Some(msg) = &self.fail_with {
                return Err(VideoError::RenderError(msg.clone()));
            }
            Ok(VideoArtifact {
                path: PathBuf::from("output.mp4"),
                duration_secs: job.total_duration,
            })
        }
    }

    fn imaged(durations: &[f64]) -> Vec<Scene> {
        durations
            .iter()
            .map(|d| {
                let mut s = Scene::new("d".into(), "p".into(), *d, Transition::Dissolve);
                s.image = Some(SceneImage::new("image/png", vec![1, 2, 3]));
                s
            })
            .collect()
    }

    #[tokio::test]
    async fn single_scene_renders_without_crossfade() {
        let backend = ScriptedBackend::ready(vec![1.0]);
        let artifact = Assembler::new(1.0)
            .assemble(&backend, &imaged(&[4.0]), &|_| {}, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifact.duration_secs, 4.0);
        let (graph, total, holds) = backend.seen.lock().unwrap().clone().unwrap();
        assert_eq!(graph, "[0:v]format=yuv420p");
        assert!(!graph.contains("xfade"));
        assert_eq!(total, 4.0);
        assert_eq!(holds, vec![4.0]);
    }

    #[tokio::test]
    async fn backend_receives_clamped_total_and_per_input_holds() {
        let backend = ScriptedBackend::ready(vec![]);
        Assembler::new(1.0)
            .assemble(&backend, &imaged(&[5.0, 8.0, 6.0]), &|_| {}, &CancellationToken::new())
            .await
            .unwrap();

        let (graph, total, holds) = backend.seen.lock().unwrap().clone().unwrap();
        assert_eq!(total, 19.0);
        assert_eq!(holds, vec![5.0, 8.0, 6.0]);
        assert!(graph.contains("offset=4[v1]"));
        assert!(graph.contains("offset=12[v2]"));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let backend = ScriptedBackend::ready(vec![0.1, 0.5, 0.3, f64::NAN, 1.2, 1.0]);
        let seen = Mutex::new(Vec::new());
        Assembler::new(1.0)
            .assemble(
                &backend,
                &imaged(&[3.0, 3.0]),
                &|p| seen.lock().unwrap().push(p),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![0, 10, 50, 99, 100]);
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
    }

    #[tokio::test]
    async fn not_ready_backend_is_render_error() {
        let mut backend = ScriptedBackend::ready(vec![]);
        backend.state = BackendState::Uninitialized;
        let err = Assembler::new(1.0)
            .assemble(&backend, &imaged(&[3.0]), &|_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::RenderError(_)));
        assert!(backend.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn backend_failure_surfaces_diagnostic_without_reaching_100() {
        let mut backend = ScriptedBackend::ready(vec![0.4]);
        backend.fail_with = Some("Invalid data found when processing input".into());
        let seen = Mutex::new(Vec::new());
        let err = Assembler::new(1.0)
            .assemble(
                &backend,
                &imaged(&[3.0, 3.0]),
                &|p| seen.lock().unwrap().push(p),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid data found"));
        assert_eq!(seen.into_inner().unwrap(), vec![0, 40]);
    }

    #[test]
    fn plan_rejects_missing_images() {
        let mut scenes = imaged(&[2.0, 2.0]);
        scenes[1].image = None;
        let err = Assembler::new(1.0).plan(&scenes).unwrap_err();
        assert!(matches!(err, VideoError::RenderError(_)));
    }
}
