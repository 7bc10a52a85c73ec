//! Identity Toolkit REST client (email/password sign-in and token refresh).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use yss_core::UserUid;

use super::{ErrorEnvelope, FirebaseError, preview};
use crate::config::FirebaseConfig;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A successful sign-in or token refresh.
#[derive(Debug, Clone)]
pub struct SignedInUser {
    pub uid: UserUid,
    /// Only present on sign-in; the refresh endpoint does not return it.
    pub email: Option<String>,
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

/// Sign-in failure reasons, named after the client SDK error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    UserDisabled,
    InvalidEmail,
    TooManyRequests,
    Internal,
}

impl AuthErrorCode {
    /// Map a service error message such as `EMAIL_NOT_FOUND` or
    /// `TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account...`.
    #[must_use]
    pub fn from_service_message(message: &str) -> Self {
        let code = message.split(" : ").next().unwrap_or_default().trim();
        match code {
            "EMAIL_NOT_FOUND" => Self::UserNotFound,
            "INVALID_PASSWORD" => Self::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredential,
            "USER_DISABLED" => Self::UserDisabled,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyRequests,
            _ => Self::Internal,
        }
    }

    /// Client SDK style code, e.g. `auth/wrong-password`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::InvalidCredential => "auth/invalid-credential",
            Self::UserDisabled => "auth/user-disabled",
            Self::InvalidEmail => "auth/invalid-email",
            Self::TooManyRequests => "auth/too-many-requests",
            Self::Internal => "auth/internal-error",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// The secure-token endpoint answers in `snake_case`.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

fn expires_at(expires_in: &str) -> DateTime<Utc> {
    let seconds = expires_in.parse::<i64>().unwrap_or(3600);
    Utc::now() + Duration::seconds(seconds)
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for email/password sign-in.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    api_key: SecretString,
    toolkit_url: String,
    token_url: String,
}

impl IdentityClient {
    /// Create a new identity client.
    #[must_use]
    pub fn new(config: &FirebaseConfig) -> Self {
        let (toolkit_url, token_url) = config.auth_emulator_host.as_ref().map_or_else(
            || (IDENTITY_TOOLKIT_URL.to_string(), SECURE_TOKEN_URL.to_string()),
            |host| {
                (
                    format!("http://{host}/identitytoolkit.googleapis.com/v1"),
                    format!("http://{host}/securetoken.googleapis.com/v1/token"),
                )
            },
        );

        Self {
            inner: Arc::new(IdentityClientInner {
                client: reqwest::Client::new(),
                api_key: config.api_key.clone(),
                toolkit_url,
                token_url,
            }),
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`FirebaseError::Auth`] if the credentials are rejected, or a
    /// transport error.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedInUser, FirebaseError> {
        let url = format!("{}/accounts:signInWithPassword", self.inner.toolkit_url);
        let response = self
            .inner
            .client
            .post(&url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(auth_error(status, &text));
        }

        let body: SignInResponse = serde_json::from_str(&text)?;
        debug!(uid = %body.local_id, "Signed in");

        Ok(SignedInUser {
            uid: UserUid::new(body.local_id),
            email: body.email,
            expires_at: expires_at(&body.expires_in),
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
        })
    }

    /// Exchange a refresh token for a fresh ID token.
    ///
    /// # Errors
    ///
    /// Returns [`FirebaseError::Unauthenticated`] if the refresh token is no
    /// longer valid, or a transport error.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<SignedInUser, FirebaseError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .inner
            .client
            .post(&self.inner.token_url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, body = %preview(&text), "Token refresh rejected");
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    FirebaseError::Unauthenticated
                }
                _ => auth_error(status, &text),
            });
        }

        let body: RefreshResponse = serde_json::from_str(&text)?;
        Ok(SignedInUser {
            uid: UserUid::new(body.user_id),
            email: None,
            expires_at: expires_at(&body.expires_in),
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
        })
    }
}

/// Map a failed identity response. Client errors carry an auth code in the
/// message; anything else is reported as an API error.
fn auth_error(status: StatusCode, body: &str) -> FirebaseError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return FirebaseError::Auth(AuthErrorCode::TooManyRequests);
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if status.is_client_error() => {
            FirebaseError::Auth(AuthErrorCode::from_service_message(&envelope.error.message))
        }
        Ok(envelope) => FirebaseError::Api {
            status: envelope
                .error
                .status
                .unwrap_or_else(|| envelope.error.code.to_string()),
            message: envelope.error.message,
        },
        Err(_) => FirebaseError::Api {
            status: status.as_u16().to_string(),
            message: preview(body),
        },
    }
}
