use crate::api::{ImageSynthesizer, ScriptModel};
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use crate::scene::SceneImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const QWEN_TEXT_API: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
const QWEN_IMAGE_API: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text2image/image-synthesis";
const QWEN_TASK_API: &str = "https://dashscope.aliyuncs.com/api/v1/tasks";

/// DashScope client backing both the script model and the image synthesizer.
#[derive(Debug, Clone)]
pub struct QwenClient {
    api_key: String,
    client: Client,
    text_model: String,
    image_model: String,
    image_size: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    output: ImageOutput,
}

#[derive(Debug, Deserialize)]
struct ImageOutput {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct ImageTaskResponse {
    output: ImageTaskOutput,
}

#[derive(Debug, Deserialize)]
struct ImageTaskOutput {
    task_status: String,
    results: Option<Vec<ImageResult>>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    url: Option<String>,
}

impl QwenClient {
    pub fn new(api_key: String, config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            api_key,
            client,
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            image_size: config.image_size.clone(),
            poll_interval: config.image_poll_interval,
            max_polls: config.image_max_polls,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn submit_image_task(&self, prompt: &str) -> Result<String> {
        let request_body = json!({
            "model": self.image_model,
            "input": {
                "prompt": prompt
            },
            "parameters": {
                "size": self.image_size,
                "n": 1
            }
        });

        let response = self
            .client
            .post(QWEN_IMAGE_API)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json")
            .header("X-DashScope-Async", "enable")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(VideoError::ApiError(format!(
                "Image generation API error: {}",
                error_text
            )));
        }

        let task_response: ImageGenerationResponse = response.json().await?;
        Ok(task_response.output.task_id)
    }

    /// Polls the task until it settles. `Ok(None)` when it succeeded without a result URL.
    async fn wait_for_image_task(&self, task_id: &str) -> Result<Option<String>> {
        let get_url = format!("{}/{}", QWEN_TASK_API, task_id);

        for i in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&get_url)
                .header("Authorization", self.bearer())
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await?;
                warn!("Failed to get task status (HTTP {}): {}", status, error_text);
                continue;
            }

            let response_text = response.text().await?;
            debug!("Task response: {}", response_text);

            let task_result: ImageTaskResponse = serde_json::from_str(&response_text)
                .map_err(|e| VideoError::ApiError(format!("Failed to parse task response: {}", e)))?;

            match task_result.output.task_status.as_str() {
                "SUCCEEDED" => {
                    let url = task_result
                        .output
                        .results
                        .unwrap_or_default()
                        .into_iter()
                        .find_map(|r| r.url);
                    return Ok(url);
                }
                "FAILED" | "CANCELED" | "UNKNOWN" => {
                    return Err(VideoError::ApiError(format!(
                        "Image task {} ended as {}",
                        task_id, task_result.output.task_status
                    )));
                }
                other => {
                    debug!("Task {} status: {} (poll {}/{})", task_id, other, i + 1, self.max_polls);
                }
            }
        }

        Err(VideoError::ApiError(format!("Image task {} timed out", task_id)))
    }
}

impl ScriptModel for QwenClient {
    async fn complete(&self, system_instruction: &str, script: &str) -> Result<String> {
        info!("Requesting scene breakdown from {}", self.text_model);

        let request_body = json!({
            "model": self.text_model,
            "input": {
                "messages": [
                    { "role": "system", "content": system_instruction },
                    { "role": "user", "content": script }
                ]
            },
            "parameters": {
                "result_format": "message"
            }
        });

        let response = self
            .client
            .post(QWEN_TEXT_API)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(VideoError::AnalysisError(format!(
                "Qwen API error: {}",
                error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await?;

        let generated_text = response_json["output"]["choices"][0]["message"]["content"]
            .as_str()
            .or_else(|| response_json["output"]["text"].as_str())
            .ok_or_else(|| {
                VideoError::AnalysisError("Failed to extract generated text".to_string())
            })?;

        debug!("Generated scenes text: {}", generated_text);
        Ok(generated_text.to_string())
    }
}

impl ImageSynthesizer for QwenClient {
    async fn synthesize(&self, prompt: &str) -> Result<Option<SceneImage>> {
        let task_id = self.submit_image_task(prompt).await?;
        info!("Image generation task submitted: {}", task_id);

        let Some(image_url) = self.wait_for_image_task(&task_id).await? else {
            return Ok(None);
        };

        debug!("Downloading image from: {}", image_url);
        let response = self.client.get(&image_url).send().await?;
        if !response.status().is_success() {
            return Err(VideoError::ApiError(format!(
                "Image download failed with HTTP {}",
                response.status()
            )));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let data = response.bytes().await?.to_vec();

        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(SceneImage::new(mime_type, data)))
    }
}
