// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failure taxonomy for model providers.
///
/// `RateLimited` and `Transport` are retried with bounded backoff inside the
/// driver; `Schema` and `Unauthorized` surface immediately.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("response did not conform to the requested schema: {0}")]
    Schema(String),

    #[error("unauthorized: check the configured API key")]
    Unauthorized,

    #[error("transport error: {0}")]
    Transport(String),
}

impl ModelError {
    /// Whether the driver may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ModelError::RateLimited.is_retryable());
        assert!(ModelError::Transport("reset".into()).is_retryable());
        assert!(!ModelError::Unauthorized.is_retryable());
        assert!(!ModelError::Schema("bad".into()).is_retryable());
    }
}
