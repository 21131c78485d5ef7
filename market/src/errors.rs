use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid scenario: {0}")]
    Scenario(String),

    #[error("price series exhausted for {0}")]
    Exhausted(String),

    #[error("scripted step failed: {0}")]
    Step(String),

    #[error("no price data for {instance_type} in {zone}")]
    NoData {
        instance_type: String,
        zone: String,
    },

    #[error("invalid vendor payload: {0}")]
    InvalidPayload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
