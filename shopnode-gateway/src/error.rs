use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
}
