//! Speech engine backends.
//!
//! The engine is an opaque external capability: it takes text, it either
//! speaks it or fails. Only the delivery worker ever holds one.

use async_trait::async_trait;
use tracing::info;

use crate::error::{Result, SpeechError};

/// One blocking synthesis call. The caller (the delivery worker) awaits
/// completion before touching the next queued text, which is what serializes
/// all access to the underlying audio device.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// Backend label for logs and the status endpoint.
    fn name(&self) -> &'static str;
}

/// Spawns an external synthesis program per delivery, with the text as the
/// final argument (e.g. `espeak-ng -v ko "약 드실 시간입니다"`).
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .output()
            .await
            .map_err(|e| SpeechError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SpeechError::Synthesis {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Logs the text instead of speaking it, for hosts without a synthesizer
/// installed. Always succeeds.
pub struct NullSpeech;

#[async_trait]
impl SpeechEngine for NullSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        info!(%text, "null speech backend: delivery text");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
