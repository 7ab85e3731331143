use thiserror::Error;

/// Failure taxonomy for third-party fetches.
///
/// `Expired` is deliberately distinct from the generic variants: the
/// orchestrator reacts to it by re-authenticating instead of retrying the
/// same rejected credential.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("credential expired or rejected by the platform")]
    Expired,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_expired(&self) -> bool {
        matches!(self, FetchError::Expired)
    }

    /// Map a non-success HTTP status to the right variant.
    pub fn from_status(status: u16, body: String) -> FetchError {
        if status == 401 || status == 403 {
            FetchError::Expired
        } else {
            FetchError::Api { status, body }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rejection_is_expired() {
        assert!(FetchError::from_status(401, String::new()).is_expired());
        assert!(FetchError::from_status(403, String::new()).is_expired());
        assert!(!FetchError::from_status(500, String::new()).is_expired());
        assert!(!FetchError::from_status(429, String::new()).is_expired());
    }
}
