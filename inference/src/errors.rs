use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("artifact {name} digest mismatch (expected {expected}, got {actual})")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("manifest targets cloud {manifest} but the agent is configured for {configured}")]
    CloudMismatch {
        manifest: String,
        configured: String,
    },

    #[error("manifest is missing required artifact {0:?}")]
    MissingArtifact(String),

    #[error("invalid action vocabulary: {0}")]
    Vocabulary(String),

    #[error("feature vector shape mismatch (model expects {expected}, got {got})")]
    FeatureShape { expected: usize, got: usize },

    #[error("model output shape mismatch (expected {expected} values, got {got})")]
    OutputShape { expected: usize, got: usize },
}
