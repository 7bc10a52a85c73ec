//! Session middleware configuration and one-shot notices.
//!
//! Sessions live in process memory (`MemoryStore`); the only state they
//! carry is the signed-in user's tokens, the checkout hand-off and a flash
//! notice. A restart signs everyone out.

use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::warn;

use crate::config::StorefrontConfig;
use crate::models::{Flash, session_keys};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "fs_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with an in-memory store.
#[must_use]
pub fn create_session_layer(config: &StorefrontConfig) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Queue a notice for the next rendered page.
pub async fn set_flash(session: &Session, flash: Flash) {
    if let Err(e) = session.insert(session_keys::FLASH, flash).await {
        warn!(error = %e, "Failed to store flash notice");
    }
}

/// Take the pending notice, if any.
pub async fn take_flash(session: &Session) -> Option<Flash> {
    match session.remove::<Flash>(session_keys::FLASH).await {
        Ok(flash) => flash,
        Err(e) => {
            warn!(error = %e, "Failed to read flash notice");
            None
        }
    }
}
