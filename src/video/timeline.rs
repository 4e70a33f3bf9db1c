use std::fmt::Write as _;

use crate::error::{Result, VideoError};
use crate::scene::{Scene, Transition};

/// One looped still, held for `hold_secs`.
#[derive(Debug, Clone, PartialEq)]
pub struct StillInput {
    pub index: usize,
    pub hold_secs: f64,
}

/// Pairwise merge of the running stream with the next still.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossfade {
    pub from: String,
    pub to: String,
    pub output: String,
    /// Seconds into the running timeline, never negative
    pub offset: f64,
    pub duration: f64,
    /// Label declared on the scene; rendered as a fade regardless
    pub declared: Transition,
}

/// Single-stream timeline chaining every still with crossfades.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub inputs: Vec<StillInput>,
    pub crossfades: Vec<Crossfade>,
    /// Output clamp: the plain sum of scene durations
    pub total_duration: f64,
}

impl Timeline {
    pub fn build(scenes: &[Scene], crossfade_secs: f64) -> Result<Self> {
        let durations: Vec<(f64, Transition)> =
            scenes.iter().map(|s| (s.duration, s.transition)).collect();
        Self::from_durations(&durations, crossfade_secs)
    }

    pub fn from_durations(scenes: &[(f64, Transition)], crossfade_secs: f64) -> Result<Self> {
        if scenes.is_empty() {
            return Err(VideoError::RenderError("no scenes to render".into()));
        }
        if !crossfade_secs.is_finite() || crossfade_secs <= 0.0 {
            return Err(VideoError::RenderError(format!(
                "crossfade length must be positive, got {}",
                crossfade_secs
            )));
        }
        if let Some((i, (d, _))) = scenes
            .iter()
            .enumerate()
            .find(|(_, (d, _))| !d.is_finite() || *d <= 0.0)
        {
            return Err(VideoError::RenderError(format!(
                "scene {} has unsupported duration {}",
                i, d
            )));
        }

        let inputs = scenes
            .iter()
            .enumerate()
            .map(|(index, (hold_secs, _))| StillInput {
                index,
                hold_secs: *hold_secs,
            })
            .collect();

        let mut crossfades = Vec::with_capacity(scenes.len().saturating_sub(1));
        let mut last_stream = input_label(0);
        let mut cumulative = 0.0;
        for i in 0..scenes.len().saturating_sub(1) {
            cumulative += scenes[i].0;
            let output = format!("v{}", i + 1);
            crossfades.push(Crossfade {
                from: last_stream,
                to: input_label(i + 1),
                output: output.clone(),
                offset: (cumulative - crossfade_secs).max(0.0),
                duration: crossfade_secs,
                declared: scenes[i].1,
            });
            last_stream = output;
        }

        Ok(Self {
            inputs,
            crossfades,
            total_duration: scenes.iter().map(|(d, _)| d).sum(),
        })
    }

    /// Label of the stream that carries the finished picture.
    pub fn output_stream(&self) -> String {
        self.crossfades
            .last()
            .map(|c| c.output.clone())
            .unwrap_or_else(|| input_label(0))
    }

    /// ffmpeg `-filter_complex` description of the chain.
    pub fn filter_graph(&self) -> String {
        let mut graph = String::new();
        for fade in &self.crossfades {
            let _ = write!(
                graph,
                "[{}][{}]xfade=transition=fade:duration={}:offset={}[{}];",
                fade.from, fade.to, fade.duration, fade.offset, fade.output
            );
        }
        let _ = write!(graph, "[{}]format=yuv420p", self.output_stream());
        graph
    }
}

fn input_label(index: usize) -> String {
    format!("{}:v", index)
}
