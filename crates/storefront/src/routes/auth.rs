//! Sign-in route handlers.
//!
//! Email/password sign-in through the identity service. The ID and refresh
//! tokens are kept in the session so later document store calls run as the
//! shopper.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};
use yss_core::Email;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::firebase::{AuthErrorCode, FirebaseError};
use crate::middleware::{
    CspNonce, OptionalAuth, clear_current_user, set_current_user, take_flash,
};
use crate::models::{CurrentUser, Flash};
use crate::routes::PageContext;
use crate::state::AppState;

/// Seconds the success notice stays up before moving on to the dashboard.
const SUCCESS_REDIRECT: &str = "3.5;url=/dashboard";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub email: String,
    pub error: Option<&'static str>,
}

/// Shown after a successful sign-in, before the delayed redirect.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signed_in.html")]
pub struct SignedInTemplate {
    pub page: PageContext,
    pub email: String,
}

/// User-facing message for a failed sign-in.
#[must_use]
pub const fn sign_in_error_message(code: AuthErrorCode) -> &'static str {
    match code {
        AuthErrorCode::UserNotFound => "User not found! Please check your email.",
        AuthErrorCode::WrongPassword => "Incorrect password! Please try again.",
        _ => "An error occurred during sign-in.",
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page, or go straight to the dashboard when signed in.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    session: Session,
    nonce: CspNonce,
) -> Response {
    if user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }

    LoginTemplate {
        page: PageContext::new(nonce, take_flash(&session).await, false),
        email: String::new(),
        error: None,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
    Form(form): Form<LoginForm>,
) -> Response {
    let result = match Email::parse(&form.email) {
        Ok(email) => state
            .identity()
            .sign_in_with_password(email.as_str(), &form.password)
            .await
            .map(|signed_in| CurrentUser::from_sign_in(signed_in, email.as_str())),
        Err(e) => {
            warn!(error = %e, "Rejected malformed email");
            Err(FirebaseError::Auth(AuthErrorCode::InvalidEmail))
        }
    };

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Sign-in failed");
            let code = match e {
                FirebaseError::Auth(code) => code,
                _ => AuthErrorCode::Internal,
            };
            let template = LoginTemplate {
                page: PageContext::new(nonce, None, false),
                email: form.email,
                error: Some(sign_in_error_message(code)),
            };
            return (StatusCode::UNAUTHORIZED, template).into_response();
        }
    };

    // New identity, new session id.
    if let Err(e) = session.cycle_id().await {
        warn!(error = %e, "Failed to cycle session id");
    }
    if let Err(e) = set_current_user(&session, &user).await {
        tracing::error!(error = %e, "Failed to store signed-in user");
        let template = LoginTemplate {
            page: PageContext::new(nonce, None, false),
            email: form.email,
            error: Some(sign_in_error_message(AuthErrorCode::Internal)),
        };
        return (StatusCode::INTERNAL_SERVER_ERROR, template).into_response();
    }

    set_sentry_user(&user.uid, Some(&user.email));
    info!(uid = %user.uid, "Signed in");

    (
        [(HeaderName::from_static("refresh"), SUCCESS_REDIRECT)],
        SignedInTemplate {
            page: PageContext::new(nonce, Some(Flash::success("Sign In Successful!")), true),
            email: user.email,
        },
    )
        .into_response()
}

/// Sign out and return to the login page.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        warn!(error = %e, "Failed to clear user from session");
    }
    if let Err(e) = session.flush().await {
        warn!(error = %e, "Failed to flush session");
    }
    clear_sentry_user();

    Redirect::to("/login").into_response()
}
