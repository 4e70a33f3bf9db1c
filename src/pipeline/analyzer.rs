use serde::Deserialize;
use tracing::{info, warn};

use crate::api::ScriptModel;
use crate::error::{Result, VideoError};
use crate::scene::{Scene, Transition};

/// Sums closer than this to the requested total are left untouched.
const DURATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneData {
    description: String,
    image_prompt: String,
    duration: f64,
    transition: Transition,
}

pub fn system_instruction(target_duration_secs: u32) -> String {
    let labels = Transition::ALL
        .iter()
        .map(|t| format!("\"{}\"", t.label()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a script-parsing assistant for a video generator.
The user will provide a script. Convert it into a JSON array of scenes.
The total duration of the video must be exactly {total} seconds. Distribute this total among the scenes based on the script's content; the sum of all scene durations must equal {total}.
Each scene is an object with:
- "description": a short summary of the scene.
- "imagePrompt": a detailed English prompt for an AI image generator describing the visual of the scene.
- "duration": the duration of this scene in seconds.
- "transition": the transition into the next scene, one of {labels}. Use "Fade" for the last scene.
Return only the JSON array, without any other text."#,
        total = target_duration_secs,
        labels = labels,
    )
}

/// Asks the model for a scene breakdown of `script` lasting `target_duration_secs`.
pub async fn analyze<M: ScriptModel>(
    model: &M,
    script: &str,
    target_duration_secs: u32,
) -> Result<Vec<Scene>> {
    check_target(target_duration_secs)?;
    let raw = model
        .complete(&system_instruction(target_duration_secs), script)
        .await?;
    let scenes = parse_scenes(&raw, target_duration_secs)?;
    info!("Script analyzed into {} scenes", scenes.len());
    Ok(scenes)
}

/// Parses the model's answer into ordered scenes whose durations sum to the target.
pub fn parse_scenes(raw: &str, target_duration_secs: u32) -> Result<Vec<Scene>> {
    check_target(target_duration_secs)?;

    let json_text = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let scene_data: Vec<SceneData> = serde_json::from_str(json_text)
        .map_err(|e| VideoError::AnalysisError(format!("Failed to parse scenes JSON: {}", e)))?;

    if scene_data.is_empty() {
        return Err(VideoError::EmptyScriptError);
    }

    let mut durations: Vec<f64> = scene_data.iter().map(|s| s.duration).collect();
    check_durations(&durations)?;
    reconcile_durations(&mut durations, f64::from(target_duration_secs));
    // Rescaling extreme proportions can round a scene down to nothing.
    check_durations(&durations)?;

    Ok(scene_data
        .into_iter()
        .zip(durations)
        .map(|(data, duration)| {
            Scene::new(data.description, data.image_prompt, duration, data.transition)
        })
        .collect())
}

fn check_target(target_duration_secs: u32) -> Result<()> {
    if target_duration_secs == 0 {
        return Err(VideoError::AnalysisError(
            "target duration must be greater than 0 seconds".into(),
        ));
    }
    Ok(())
}

fn check_durations(durations: &[f64]) -> Result<()> {
    match durations
        .iter()
        .enumerate()
        .find(|(_, d)| !d.is_finite() || **d <= 0.0)
    {
        Some((i, bad)) => Err(VideoError::AnalysisError(format!(
            "scene {} has invalid duration {}",
            i, bad
        ))),
        None => Ok(()),
    }
}

/// Rescales `durations` so they sum to `target`, keeping their proportions.
/// The last entry absorbs the floating point remainder.
pub fn reconcile_durations(durations: &mut [f64], target: f64) {
    let sum: f64 = durations.iter().sum();
    if (sum - target).abs() <= DURATION_TOLERANCE || durations.is_empty() {
        return;
    }

    warn!(
        "Scene durations sum to {}s instead of {}s; rescaling",
        sum, target
    );

    let scale = target / sum;
    let last = durations.len() - 1;
    let mut head = 0.0;
    for d in &mut durations[..last] {
        *d *= scale;
        head += *d;
    }
    durations[last] = target - head;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedModel {
        answer: String,
        seen_instruction: Mutex<Option<String>>,
    }

    impl CannedModel {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                seen_instruction: Mutex::new(None),
            }
        }
    }

    impl ScriptModel for CannedModel {
        async fn complete(&self, system_instruction: &str, _script: &str) -> Result<String> {
            *self.seen_instruction.lock().unwrap() = Some(system_instruction.to_string());
            Ok(self.answer.clone())
        }
    }

    fn scene_json(durations: &[f64]) -> String {
        let items: Vec<_> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                serde_json::json!({
                    "description": format!("scene {}", i),
                    "imagePrompt": format!("prompt {}", i),
                    "duration": d,
                    "transition": if i + 1 == durations.len() { "Fade" } else { "Slide Left" },
                })
            })
            .collect();
        serde_json::to_string(&items).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_ordered_scenes_without_images() {
        let model = CannedModel::new(&scene_json(&[6.0, 4.0]));
        let scenes = analyze(&model, "two scenes", 10).await.unwrap();

        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].description, "scene 0");
        assert_eq!(scenes[1].image_prompt, "prompt 1");
        assert_eq!(scenes[0].transition, Transition::SlideLeft);
        assert_eq!(scenes[1].transition, Transition::Fade);
        assert!(scenes.iter().all(|s| s.image.is_none()));
        assert_ne!(scenes[0].id, scenes[1].id);

        let instruction = model.seen_instruction.lock().unwrap().clone().unwrap();
        assert!(instruction.contains("exactly 10 seconds"));
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = format!("```json\n{}\n```", scene_json(&[5.0]));
        let scenes = parse_scenes(&raw, 5).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].duration, 5.0);
    }

    #[test]
    fn malformed_json_is_analysis_error() {
        let err = parse_scenes("here are your scenes!", 10).unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));

        let err = parse_scenes(r#"[{"description": "x"}]"#, 10).unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));
    }

    #[test]
    fn unknown_transition_is_analysis_error() {
        let raw = r#"[{"description":"a","imagePrompt":"b","duration":3,"transition":"Spin"}]"#;
        let err = parse_scenes(raw, 3).unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));
    }

    #[test]
    fn empty_array_is_empty_script_error() {
        let err = parse_scenes("[]", 10).unwrap_err();
        assert!(matches!(err, VideoError::EmptyScriptError));
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let err = parse_scenes(&scene_json(&[10.0, 0.0]), 10).unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));
    }

    #[test]
    fn zero_target_is_rejected() {
        let err = parse_scenes(&scene_json(&[5.0, 5.0]), 0).unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));
    }

    #[tokio::test]
    async fn zero_target_never_reaches_the_model() {
        let model = CannedModel::new(&scene_json(&[5.0, 5.0]));
        let err = analyze(&model, "two scenes", 0).await.unwrap_err();
        assert!(matches!(err, VideoError::AnalysisError(_)));
        assert!(model.seen_instruction.lock().unwrap().is_none());
    }

    #[test]
    fn lopsided_rescale_never_yields_empty_scenes() {
        for durations in [[1e12, 1e-12], [1e15, 1e-9], [3.0, 1e-300]] {
            match parse_scenes(&scene_json(&durations), 10) {
                Ok(scenes) => assert!(scenes.iter().all(|s| s.duration > 0.0 && s.duration.is_finite())),
                Err(e) => assert!(matches!(e, VideoError::AnalysisError(_))),
            }
        }
    }

    #[test]
    fn exact_sums_are_untouched() {
        let scenes = parse_scenes(&scene_json(&[5.0, 8.0, 6.0]), 19).unwrap();
        let durations: Vec<f64> = scenes.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![5.0, 8.0, 6.0]);
    }

    #[test]
    fn mismatched_sum_is_rescaled_to_target() {
        let scenes = parse_scenes(&scene_json(&[5.0, 5.0]), 30).unwrap();
        let durations: Vec<f64> = scenes.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![15.0, 15.0]);
    }

    #[test]
    fn durations_always_sum_to_requested_total() {
        // Deterministic pseudo-random analyzer answers.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..500 {
            let target = (next() % 600 + 1) as u32;
            let count = (next() % 12 + 1) as usize;
            let durations: Vec<f64> = (0..count)
                .map(|_| (next() % 10_000 + 1) as f64 / 100.0)
                .collect();

            let scenes = parse_scenes(&scene_json(&durations), target).unwrap();
            let sum: f64 = scenes.iter().map(|s| s.duration).sum();
            assert!(
                (sum - f64::from(target)).abs() < 1e-9,
                "sum {} != target {}",
                sum,
                target
            );
            assert!(scenes.iter().all(|s| s.duration > 0.0));
        }
    }
}
