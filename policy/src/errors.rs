use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("policy parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid action vocabulary: {0}")]
    Vocabulary(String),

    #[error("q-value width {got} does not match vocabulary width {expected}")]
    QWidth { expected: usize, got: usize },
}
