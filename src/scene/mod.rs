mod job;

pub use job::{AcquisitionProgress, JobRequest, JobSnapshot, Phase, VideoArtifact};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transition into the following scene.
///
/// Only a linear fade is rendered; every other label is accepted from the
/// analyzer and stored, but renders as `Fade` until its visual is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transition {
    #[default]
    Fade,
    Dissolve,
    #[serde(rename = "Slide Left")]
    SlideLeft,
    #[serde(rename = "Slide Right")]
    SlideRight,
    #[serde(rename = "Wipe Up")]
    WipeUp,
    #[serde(rename = "Wipe Down")]
    WipeDown,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Fade,
        Transition::Dissolve,
        Transition::SlideLeft,
        Transition::SlideRight,
        Transition::WipeUp,
        Transition::WipeDown,
    ];

    /// Label used in analyzer responses.
    pub fn label(self) -> &'static str {
        match self {
            Transition::Fade => "Fade",
            Transition::Dissolve => "Dissolve",
            Transition::SlideLeft => "Slide Left",
            Transition::SlideRight => "Slide Right",
            Transition::WipeUp => "Wipe Up",
            Transition::WipeDown => "Wipe Down",
        }
    }

    pub fn is_rendered(self) -> bool {
        self == Transition::Fade
    }
}

/// Synthesized image bytes for one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneImage {
    pub mime_type: String,
    /// Serialized as standard base64
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

impl SceneImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// File extension ffmpeg can probe the staged input by.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        }
    }
}

/// One timed unit of the video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: Uuid,
    /// Short human-readable summary
    pub description: String,
    /// Instruction sent to the image synthesizer
    pub image_prompt: String,
    pub image: Option<SceneImage>,
    /// Seconds, always positive
    pub duration: f64,
    /// Transition into the next scene; ignored on the last one
    pub transition: Transition,
}

impl Scene {
    pub fn new(
        description: String,
        image_prompt: String,
        duration: f64,
        transition: Transition,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            description,
            image_prompt,
            image: None,
            duration,
            transition,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

impl PartialEq for Scene {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Scene {}
