//! Reconstruction task model and upstream response envelopes

use std::path::PathBuf;

use serde::Deserialize;

/// Lifecycle of one reconstruction task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Submitted,
    Running,
    Success,
    Failed,
    Timeout,
}

impl TaskStatus {
    /// Map an upstream status string
    ///
    /// Anything that is not a known terminal status counts as still running.
    pub fn from_upstream(status: &str) -> Self {
        match status {
            "success" => Self::Success,
            "failed" | "banned" | "expired" | "cancelled" => Self::Failed,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Running => 1,
            Self::Success | Self::Failed | Self::Timeout => 2,
        }
    }
}

/// One invocation of the external mesh-generation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructionTask {
    pub task_id: String,
    status: TaskStatus,
    /// Every status the task has held, oldest first
    history: Vec<TaskStatus>,
    output_url: Option<String>,
    attempts: u32,
}

impl ReconstructionTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Submitted,
            history: vec![TaskStatus::Submitted],
            output_url: None,
            attempts: 0,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Statuses held so far, starting with `Submitted`
    pub fn history(&self) -> &[TaskStatus] {
        &self.history
    }

    /// Model URL, present only once the task succeeded
    pub fn output_url(&self) -> Option<&str> {
        self.output_url.as_deref()
    }

    /// Status queries made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Apply an observed status
    ///
    /// Status only moves forward: `Submitted → Running → terminal`. A terminal
    /// status is passed through `Running` first. Returns false, leaving the
    /// task untouched, when the move would go backwards or leave a terminal state.
    pub fn observe(&mut self, next: TaskStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return false;
        }
        if self.status == TaskStatus::Submitted && next.is_terminal() {
            self.enter(TaskStatus::Running);
        }
        self.enter(next);
        true
    }

    fn enter(&mut self, status: TaskStatus) {
        if self.status != status {
            self.history.push(status);
        }
        self.status = status;
    }

    /// Mark the task successful with the resolved model URL
    pub fn succeed(&mut self, model_url: String) -> bool {
        if !self.observe(TaskStatus::Success) {
            return false;
        }
        self.output_url = Some(model_url);
        true
    }
}

/// Result of one run of the reconstruction phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshOutcome {
    /// Model downloaded to `path`
    Success { path: PathBuf, model_url: String },
    /// Upstream reported a terminal failure
    Failed { task_id: String },
    /// Poll budget exhausted without a terminal status
    Timeout { task_id: String, attempts: u32 },
}

impl MeshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short uppercase label, used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::Failed { .. } => "FAILED",
            Self::Timeout { .. } => "TIMEOUT",
        }
    }
}

/// `{code, data}` envelope used by the reconstruction service
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub code: i64,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceData {
    pub balance: serde_json::Value,
}

impl BalanceData {
    /// Balance arrives as an integer string; plain numbers are accepted too
    pub fn credits(&self) -> Option<u64> {
        match &self.balance {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskCreated {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskData {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: TaskOutput,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskOutput {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub pbr_model: Option<String>,
    #[serde(default)]
    pub base_model: Option<String>,
}

impl TaskOutput {
    /// Primary model, then PBR model, then base model; empty strings skipped
    pub fn model_url(&self) -> Option<String> {
        [&self.model, &self.pbr_model, &self.base_model]
            .into_iter()
            .flatten()
            .find(|url| !url.is_empty())
            .cloned()
    }
}

/// `{success, data:{url}}` envelope used by the image host
#[derive(Debug, Deserialize)]
pub(crate) struct UploadEnvelope {
    #[serde(default)]
    pub success: bool,
    pub data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadData {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== TaskStatus Tests ====================

    #[test]
    fn upstream_statuses_map() {
        assert_eq!(TaskStatus::from_upstream("success"), TaskStatus::Success);
        assert_eq!(TaskStatus::from_upstream("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_upstream("banned"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_upstream("queued"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_upstream("running"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_upstream(""), TaskStatus::Running);
    }

    // ==================== ReconstructionTask Tests ====================

    #[test]
    fn task_moves_forward() {
        let mut task = ReconstructionTask::new("t1");
        assert_eq!(task.status(), TaskStatus::Submitted);

        assert!(task.observe(TaskStatus::Running));
        assert!(task.observe(TaskStatus::Running));
        assert!(task.succeed("https://cdn/model.glb".to_string()));

        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(task.output_url(), Some("https://cdn/model.glb"));
    }

    #[test]
    fn terminal_status_is_final() {
        let mut task = ReconstructionTask::new("t1");
        task.observe(TaskStatus::Running);
        task.observe(TaskStatus::Failed);

        assert!(!task.observe(TaskStatus::Running));
        assert!(!task.succeed("late".to_string()));
        assert!(!task.observe(TaskStatus::Timeout));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.output_url().is_none());
    }

    #[test]
    fn terminal_from_submitted_passes_through_running() {
        let mut task = ReconstructionTask::new("t1");

        assert!(task.observe(TaskStatus::Timeout));

        assert_eq!(
            task.history(),
            &[TaskStatus::Submitted, TaskStatus::Running, TaskStatus::Timeout]
        );
    }

    #[test]
    fn repeated_running_is_recorded_once() {
        let mut task = ReconstructionTask::new("t1");
        task.observe(TaskStatus::Running);
        task.observe(TaskStatus::Running);
        task.observe(TaskStatus::Failed);

        assert_eq!(
            task.history(),
            &[TaskStatus::Submitted, TaskStatus::Running, TaskStatus::Failed]
        );
    }

    #[test]
    fn running_cannot_go_back_to_submitted() {
        let mut task = ReconstructionTask::new("t1");
        task.observe(TaskStatus::Running);
        assert!(!task.observe(TaskStatus::Submitted));
    }

    // ==================== Envelope Tests ====================

    #[test]
    fn model_url_falls_back_to_pbr() {
        let output: TaskOutput = serde_json::from_str(
            r#"{"model": "", "pbr_model": "https://cdn/pbr.glb"}"#,
        )
        .unwrap();
        assert_eq!(output.model_url().as_deref(), Some("https://cdn/pbr.glb"));
    }

    #[test]
    fn model_url_prefers_primary() {
        let output: TaskOutput = serde_json::from_str(
            r#"{"model": "https://cdn/a.glb", "pbr_model": "https://cdn/b.glb"}"#,
        )
        .unwrap();
        assert_eq!(output.model_url().as_deref(), Some("https://cdn/a.glb"));
    }

    #[test]
    fn model_url_missing_everywhere() {
        let output = TaskOutput::default();
        assert!(output.model_url().is_none());
    }

    #[test]
    fn balance_parses_string_and_number() {
        let data: BalanceData = serde_json::from_str(r#"{"balance": "42"}"#).unwrap();
        assert_eq!(data.credits(), Some(42));
        let data: BalanceData = serde_json::from_str(r#"{"balance": 7}"#).unwrap();
        assert_eq!(data.credits(), Some(7));
        let data: BalanceData = serde_json::from_str(r#"{"balance": "lots"}"#).unwrap();
        assert_eq!(data.credits(), None);
    }

    #[test]
    fn envelope_without_data() {
        let env: ApiEnvelope<TaskCreated> = serde_json::from_str(r#"{"code": 2010}"#).unwrap();
        assert_eq!(env.code, 2010);
        assert!(env.data.is_none());
    }
}
