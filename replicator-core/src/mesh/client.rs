//! MeshClient talks to the image host and the reconstruction service
//!
//! One `process_3d` request runs four phases:
//!
//! 1. **Upload** - push the frame to the image host, get a public URL
//! 2. **Submit** - create an `image_to_model` task, get a task id
//! 3. **Poll** - query the task every interval until terminal or out of budget
//! 4. **Fetch** - download the model into the room's output directory
//!
//! Upload and submit failures surface immediately. Only the poll loop retries.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::MeshError;
use crate::frames::Frame;

use super::poll::{StatusReport, poll_until_terminal};
use super::types::{
    ApiEnvelope, BalanceData, MeshOutcome, ReconstructionTask, TaskCreated, TaskData, TaskStatus,
    UploadEnvelope,
};

/// Default reconstruction service API base
pub const DEFAULT_API_BASE: &str = "https://api.tripo3d.ai/v2/openapi";
/// Default image host upload endpoint
pub const DEFAULT_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

/// The pipeline phases, as seen by the orchestrator
#[async_trait]
pub trait MeshGenerator: Send + Sync {
    /// Upload phase: returns a publicly fetchable image URL
    async fn upload(&self, frame: &Frame) -> Result<String, MeshError>;

    /// Submit, poll and fetch phases
    ///
    /// `Ok` carries the distinguishable outcome; `Err` is a typed failure of
    /// the submit or fetch phase.
    async fn reconstruct(
        &self,
        image_url: &str,
        output_path: &Path,
    ) -> Result<MeshOutcome, MeshError>;
}

/// Endpoints, credentials and poll budget for [`MeshClient`]
#[derive(Clone)]
pub struct MeshClientConfig {
    pub api_base: String,
    pub upload_url: String,
    pub api_key: String,
    pub upload_key: String,
    pub poll: PollPolicy,
}

impl MeshClientConfig {
    pub fn new(api_key: impl Into<String>, upload_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            api_key: api_key.into(),
            upload_key: upload_key.into(),
            poll: PollPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

impl fmt::Debug for MeshClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshClientConfig")
            .field("api_base", &self.api_base)
            .field("upload_url", &self.upload_url)
            .field("api_key", &"<redacted>")
            .field("upload_key", &"<redacted>")
            .field("poll", &self.poll)
            .finish()
    }
}

/// HTTP client for the mesh generation pipeline
pub struct MeshClient {
    config: MeshClientConfig,
    client: reqwest::Client,
}

impl MeshClient {
    pub fn new(config: MeshClientConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &MeshClientConfig {
        &self.config
    }

    /// Remaining credits on the reconstruction service
    pub async fn check_balance(&self) -> Result<u64, MeshError> {
        let url = format!("{}/user/balance", self.config.api_base);
        let envelope: ApiEnvelope<BalanceData> = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?
            .json()
            .await?;

        if envelope.code != 0 {
            return Err(MeshError::Balance(format!("code {}", envelope.code)));
        }

        let balance = envelope
            .data
            .and_then(|data| data.credits())
            .ok_or_else(|| MeshError::Balance("unreadable balance".to_string()))?;

        debug!(balance, "Fetched reconstruction balance");
        Ok(balance)
    }

    /// Submit phase: create a task for `image_url`
    pub async fn submit(&self, image_url: &str) -> Result<ReconstructionTask, MeshError> {
        let url = format!("{}/task", self.config.api_base);
        let payload = json!({
            "type": "image_to_model",
            "file": { "type": "jpg", "url": image_url },
        });

        let envelope: ApiEnvelope<TaskCreated> = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if envelope.code != 0 {
            return Err(MeshError::Submit {
                code: envelope.code,
            });
        }

        let created = envelope.data.ok_or(MeshError::Submit {
            code: envelope.code,
        })?;

        info!(task_id = %created.task_id, "Reconstruction task submitted");
        Ok(ReconstructionTask::new(created.task_id))
    }

    /// One status query for `task_id`
    pub async fn query_status(&self, task_id: &str) -> Result<StatusReport, MeshError> {
        let url = format!("{}/task/{}", self.config.api_base, task_id);
        let envelope: ApiEnvelope<TaskData> = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?
            .json()
            .await?;

        if envelope.code != 0 {
            return Err(MeshError::Upstream {
                code: envelope.code,
            });
        }

        let data = envelope
            .data
            .ok_or(MeshError::Upstream { code: envelope.code })?;
        let status = TaskStatus::from_upstream(&data.status);
        let model_url = match status {
            TaskStatus::Success => data.output.model_url(),
            _ => None,
        };

        Ok(StatusReport { status, model_url })
    }

    /// Poll phase
    pub async fn poll(&self, task: &mut ReconstructionTask) -> TaskStatus {
        let task_id = task.task_id.clone();
        poll_until_terminal(task, self.config.poll, || self.query_status(&task_id)).await
    }

    /// Fetch phase: download `model_url` to `output_path`
    pub async fn fetch(&self, model_url: &str, output_path: &Path) -> Result<(), MeshError> {
        let response = self
            .client
            .get(model_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MeshError::Download(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MeshError::Download(e.to_string()))?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, &bytes).await?;

        info!(path = %output_path.display(), size = bytes.len(), "Model downloaded");
        Ok(())
    }
}

#[async_trait]
impl MeshGenerator for MeshClient {
    async fn upload(&self, frame: &Frame) -> Result<String, MeshError> {
        let mime = frame.mime.as_deref().unwrap_or("image/jpeg");
        let part = Part::bytes(frame.bytes.clone())
            .file_name("capture.jpg")
            .mime_str(mime)
            .map_err(|e| MeshError::Upload(e.to_string()))?;
        let form = Form::new()
            .text("key", self.config.upload_key.clone())
            .part("image", part);

        let response = self
            .client
            .post(&self.config.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MeshError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeshError::Upload(format!("image host returned {status}")));
        }

        let envelope: UploadEnvelope = response
            .json()
            .await
            .map_err(|e| MeshError::Upload(e.to_string()))?;

        match envelope.data {
            Some(data) if envelope.success => {
                info!(room_id = %frame.room_id, "Frame uploaded");
                Ok(data.url)
            }
            _ => Err(MeshError::Upload("image host rejected the upload".to_string())),
        }
    }

    async fn reconstruct(
        &self,
        image_url: &str,
        output_path: &Path,
    ) -> Result<MeshOutcome, MeshError> {
        let mut task = self.submit(image_url).await?;

        match self.poll(&mut task).await {
            TaskStatus::Success => {
                let model_url = task
                    .output_url()
                    .map(str::to_string)
                    .ok_or(MeshError::MissingModelUrl)?;
                self.fetch(&model_url, output_path).await?;
                Ok(MeshOutcome::Success {
                    path: output_path.to_path_buf(),
                    model_url,
                })
            }
            TaskStatus::Timeout => {
                warn!(
                    task_id = %task.task_id,
                    attempts = task.attempts(),
                    "Reconstruction timed out"
                );
                Ok(MeshOutcome::Timeout {
                    attempts: task.attempts(),
                    task_id: task.task_id,
                })
            }
            _ => {
                warn!(task_id = %task.task_id, "Reconstruction failed upstream");
                Ok(MeshOutcome::Failed {
                    task_id: task.task_id,
                })
            }
        }
    }
}
