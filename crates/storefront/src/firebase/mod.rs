//! Firebase REST clients: Firestore (document store) and Identity Toolkit
//! (sign-in).
//!
//! # Architecture
//!
//! - Plain `reqwest` calls against the public REST endpoints; no SDK
//! - Firestore is source of truth - NO local copy, no response cache
//! - Every Firestore call carries the signed-in user's ID token, so the
//!   project's security rules decide what each shopper may read or write
//!
//! # Example
//!
//! ```rust,ignore
//! use yss_storefront::firebase::{FirestoreClient, IdentityClient, Precondition};
//!
//! let identity = IdentityClient::new(&config.firebase);
//! let user = identity.sign_in_with_password("shopper@example.com", "hunter22").await?;
//!
//! let firestore = FirestoreClient::new(&config.firebase);
//! let cart = firestore
//!     .get_document::<Cart>(user.id_token.expose_secret(), "carts", user.uid.as_str())
//!     .await?;
//! ```

mod firestore;
mod identity;
#[cfg(test)]
pub(crate) mod mock;
pub mod value;

pub use firestore::{FirestoreClient, Precondition, Snapshot};
pub use identity::{AuthErrorCode, IdentityClient, SignedInUser};

use thiserror::Error;

/// Errors that can occur when talking to Firebase.
#[derive(Debug, Error)]
pub enum FirebaseError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A Firestore value could not be converted.
    #[error("value codec error: {0}")]
    Codec(String),

    /// The ID token was missing, expired or rejected.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Security rules denied the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Document does not exist (for operations that require it).
    #[error("not found: {0}")]
    NotFound(String),

    /// The document changed since it was read (precondition failed).
    #[error("document was modified concurrently")]
    Conflict,

    /// Rate limited by Google.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Sign-in rejected by the identity service.
    #[error("sign-in failed: {}", .0.code())]
    Auth(AuthErrorCode),

    /// Any other API error.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status or Google RPC status name.
        status: String,
        /// Message returned by the service.
        message: String,
    },
}

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Truncate a response body for logging.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firebase_error_display() {
        assert_eq!(
            FirebaseError::NotFound("carts/u1".to_string()).to_string(),
            "not found: carts/u1"
        );
        assert_eq!(
            FirebaseError::Auth(AuthErrorCode::WrongPassword).to_string(),
            "sign-in failed: auth/wrong-password"
        );
        assert_eq!(
            FirebaseError::Api {
                status: "INTERNAL".to_string(),
                message: "boom".to_string()
            }
            .to_string(),
            "API error INTERNAL: boom"
        );
    }

    #[test]
    fn test_preview_truncates() {
        let body = "x".repeat(2000);
        assert_eq!(preview(&body).len(), 500);
    }
}
