//! Pipeline configuration
//!
//! Timing limits, backend location and codec preferences for capture
//! sessions. Loaded from JSON; every field has a default.

use crate::capture::{CodecDescriptor, VideoConstraints};
use crate::publish::{Endpoints, PollConfig};
use crate::recorder::RecorderConfig;
use crate::utils::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration shared by all capture sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Base URL of the publish backend
    pub api_base_url: String,

    /// Hard-stop ceiling for a take
    pub max_clip_duration_ms: u64,

    /// How often recorded data is flushed
    pub flush_interval_ms: u64,

    /// Delay between moderation status requests
    pub poll_interval_ms: u64,

    /// Give up polling after this long
    pub poll_timeout_ms: u64,

    /// HTTP request timeout
    pub request_timeout_ms: u64,

    /// Codecs to try, best first
    pub codec_preferences: Vec<CodecDescriptor>,

    /// Camera request
    pub camera: VideoConstraints,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            max_clip_duration_ms: 30_000,
            flush_interval_ms: 100,
            poll_interval_ms: 2_000,
            poll_timeout_ms: 5 * 60 * 1000,
            request_timeout_ms: 60_000,
            codec_preferences: CodecDescriptor::default_preferences(),
            camera: VideoConstraints::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(CaptureError::Config("apiBaseUrl is empty".to_string()));
        }
        if self.flush_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(CaptureError::Config(
                "flush and poll intervals must be non-zero".to_string(),
            ));
        }
        if self.flush_interval_ms >= self.max_clip_duration_ms {
            return Err(CaptureError::Config(format!(
                "flush interval {}ms must be shorter than max clip duration {}ms",
                self.flush_interval_ms, self.max_clip_duration_ms
            )));
        }
        if self.codec_preferences.is_empty() {
            return Err(CaptureError::Config(
                "codecPreferences must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            max_duration: Duration::from_millis(self.max_clip_duration_ms),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            ceiling: Duration::from_millis(self.poll_timeout_ms),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.api_base_url.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
