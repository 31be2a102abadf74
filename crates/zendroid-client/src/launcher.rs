use tracing::{info, warn};
use zendroid_core::{ClientError, RunId};

use crate::api::ApiClient;

/// Issues run-creation requests.
#[derive(Clone, Debug)]
pub struct RunLauncher {
    api: ApiClient,
}

impl RunLauncher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Validate inputs locally, then ask the server for a run. One request,
    /// no retry.
    pub async fn start_run(&self, apk_path: &str, instructions: &str) -> Result<RunId, ClientError> {
        if apk_path.trim().is_empty() {
            return Err(ClientError::validation("apk path is required"));
        }
        if instructions.trim().is_empty() {
            return Err(ClientError::validation("test instructions are required"));
        }

        match self.api.create_run(apk_path, instructions).await {
            Ok(run_id) => {
                info!(run_id = %run_id, "run created");
                Ok(run_id)
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "run creation failed");
                Err(e)
            }
        }
    }
}
