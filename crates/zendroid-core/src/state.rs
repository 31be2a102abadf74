use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Lifecycle status of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Passed,
    Failed,
    Timeout,
}

impl RunStatus {
    /// Map a status string from the wire. Returns `None` for values that do
    /// not describe run state (e.g. `not_found`).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" | "starting" | "started" | "planning" => Some(Self::Running),
            "passed" | "completed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Timeout)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: u32,
    pub total: u32,
}

/// Canonical snapshot of one run. Only the reconciler writes to it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    /// Latest frame, base64 as received. No history is kept.
    pub screenshot: Option<String>,
    pub current_task: Option<String>,
    pub task_progress: TaskProgress,
}

impl RunState {
    /// Decode the latest screenshot. `None` when there is none or it is not
    /// valid base64.
    pub fn screenshot_bytes(&self) -> Option<Vec<u8>> {
        let encoded = self.screenshot.as_deref()?;
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(error = %e, "screenshot is not valid base64");
                None
            }
        }
    }
}
