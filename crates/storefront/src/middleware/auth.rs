//! Authentication middleware and extractors.
//!
//! Provides extractors for requiring a signed-in shopper in route handlers.
//! Both extractors refresh an ID token that is about to expire and write
//! the new tokens back to the session.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::error::set_sentry_user;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in shopper.
///
/// If nobody is signed in, HTML requests are redirected to `/login` and
/// event streams get `401`.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but nobody is signed in.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for event streams).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// Event-stream clients cannot follow a redirect to an HTML page.
fn wants_event_stream(parts: &Parts) -> bool {
    parts.uri.path().ends_with("/events")
        || parts
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/event-stream"))
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::Unauthorized)?;

        let user = current_user(&session, state).await.ok_or_else(|| {
            if wants_event_stream(parts) {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin
            }
        })?;

        set_sentry_user(&user.uid, Some(&user.email));
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     OptionalAuth(user): OptionalAuth,
/// ) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}!", u.email),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>().cloned() {
            Some(session) => current_user(&session, state).await,
            None => None,
        };

        Ok(Self(user))
    }
}

/// Load the signed-in user, refreshing the ID token if needed.
///
/// A failed refresh signs the user out.
async fn current_user(session: &Session, state: &AppState) -> Option<CurrentUser> {
    let mut user: CurrentUser = session
        .get(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()?;

    if !user.needs_refresh(Utc::now()) {
        return Some(user);
    }

    match state
        .identity()
        .refresh(user.refresh_token.expose_secret())
        .await
    {
        Ok(refreshed) => {
            debug!(uid = %user.uid, "Refreshed ID token");
            user.apply_refresh(refreshed);
            if let Err(e) = set_current_user(session, &user).await {
                warn!(error = %e, "Failed to store refreshed tokens");
            }
            Some(user)
        }
        Err(e) => {
            warn!(uid = %user.uid, error = %e, "Token refresh failed, signing out");
            if let Err(e) = clear_current_user(session).await {
                warn!(error = %e, "Failed to clear session");
            }
            None
        }
    }
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session
        .remove::<serde_json::Value>(session_keys::CHECKOUT)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, accept: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_event_stream_detection() {
        assert!(wants_event_stream(&parts("/cart/events", None)));
        assert!(wants_event_stream(&parts(
            "/cart",
            Some("text/event-stream")
        )));
        assert!(!wants_event_stream(&parts("/orders", Some("text/html"))));
    }
}
