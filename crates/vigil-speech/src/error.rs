use thiserror::Error;

/// Errors from a single synthesis attempt.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// The synthesis program could not be spawned at all.
    #[error("Failed to spawn synthesis program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The synthesis program ran but exited with a failure status.
    #[error("Synthesis program exited with {status}: {stderr}")]
    Synthesis { status: String, stderr: String },
}

pub type Result<T> = std::result::Result<T, SpeechError>;
