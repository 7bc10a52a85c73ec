//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Cart
//! GET  /cart                   - Cart page (empty when signed out)
//! GET  /cart/events            - Live cart fragments (SSE, requires auth)
//! POST /cart/remove            - Remove a line (fragment or redirect)
//! POST /cart/update            - Change a line's quantity (fragment or redirect)
//!
//! # Checkout
//! POST /checkout               - Hand the cart to checkout (requires auth)
//! GET  /checkout               - Checkout summary of the hand-off
//!
//! # Orders
//! GET  /orders                 - Order history (requires auth)
//!
//! # Auth
//! GET  /login                  - Sign-in page (redirects when signed in)
//! POST /login                  - Sign-in action (rate limited)
//! POST /logout                 - Sign out
//!
//! # Pages
//! GET  /dashboard              - Signed-in landing page
//! GET  /shop                   - Catalog landing
//! ```
//!
//! Handlers that mutate the cart answer `HX-Request` calls with the
//! `cart_body` fragment and plain form posts with a redirect.

pub mod auth;
pub mod cart;
pub mod orders;
pub mod pages;

use axum::{
    Router,
    http::HeaderMap,
    routing::{get, post},
};

use crate::middleware::{CspNonce, login_rate_limiter};
use crate::models::Flash;
use crate::state::AppState;

/// Data every full page needs for the layout.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub nonce: String,
    pub flash: Option<Flash>,
    pub signed_in: bool,
}

impl PageContext {
    #[must_use]
    pub fn new(nonce: CspNonce, flash: Option<Flash>, signed_in: bool) -> Self {
        Self {
            nonce: nonce.0,
            flash,
            signed_in,
        }
    }
}

/// Whether the request came from the page script rather than a plain form.
pub(crate) fn is_fragment_request(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/events", get(cart::events))
        .route("/remove", post(cart::remove))
        .route("/update", post(cart::update))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/login",
            get(auth::login_page).merge(post(auth::login).layer(login_rate_limiter())),
        )
        .route("/logout", post(auth::logout))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout hand-off
        .route("/checkout", get(pages::checkout).post(cart::checkout))
        // Orders
        .route("/orders", get(orders::index))
        // Pages
        .route("/dashboard", get(pages::dashboard))
        .route("/shop", get(pages::shop))
        // Auth routes
        .merge(auth_routes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use axum::{Router, body::Body, http::Request, response::Response};
    use tower::ServiceExt;

    use crate::middleware::create_session_layer;
    use crate::state::AppState;

    /// The full route tree with sessions, as served.
    pub fn app() -> Router {
        let config = crate::config::test_config();
        let session_layer = create_session_layer(&config);
        super::routes()
            .layer(session_layer)
            .with_state(AppState::new(config))
    }

    pub async fn send(request: Request<Body>) -> Response {
        app().oneshot(request).await.unwrap()
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn location(response: &Response) -> Option<&str> {
        response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}
