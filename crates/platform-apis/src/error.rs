//! Error type shared by every admin API client.

use thiserror::Error;

/// Errors that can occur while talking to a platform admin API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success response.
    #[error("{service} API error: {status} - {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Authentication against the admin API failed.
    #[error("{service} authentication failed: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },

    /// The API answered 2xx but the body was not what we expected.
    #[error("Unexpected response from {service}: {message}")]
    UnexpectedResponse {
        service: &'static str,
        message: String,
    },

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the API reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the API reported a conflict (resource already exists).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub(crate) fn unexpected(service: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            service,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        let err = ApiError::Api {
            service: "keycloak",
            status: 409,
            message: "Client already exists".into(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.status(), Some(409));

        let err = ApiError::Config("missing url".into());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_display_includes_service() {
        let err = ApiError::Api {
            service: "harbor",
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "harbor API error: 500 - boom");
    }
}
