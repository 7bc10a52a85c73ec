//! Supporting page handlers: dashboard, shop landing, checkout summary and
//! the health check.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::filters;
use crate::middleware::{CspNonce, OptionalAuth, RequireAuth, take_flash};
use crate::models::{CheckoutHandoff, session_keys};
use crate::routes::PageContext;
use crate::routes::cart::CartView;
use crate::state::AppState;

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub email: String,
}

/// Shop landing template.
#[derive(Template, WebTemplate)]
#[template(path = "shop.html")]
pub struct ShopTemplate {
    pub page: PageContext,
}

/// Checkout summary template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub cart: CartView,
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not call Firebase.
pub async fn health() -> &'static str {
    "ok"
}

/// Signed-in landing page.
pub async fn dashboard(
    RequireAuth(user): RequireAuth,
    session: Session,
    nonce: CspNonce,
) -> impl IntoResponse {
    DashboardTemplate {
        page: PageContext::new(nonce, take_flash(&session).await, true),
        email: user.email,
    }
}

/// Catalog landing.
pub async fn shop(
    OptionalAuth(user): OptionalAuth,
    session: Session,
    nonce: CspNonce,
) -> impl IntoResponse {
    ShopTemplate {
        page: PageContext::new(nonce, take_flash(&session).await, user.is_some()),
    }
}

/// Show what the cart handed to checkout.
///
/// Without a hand-off for this user (or with an empty one) there is nothing
/// to check out, so the shopper goes back to the cart.
#[instrument(skip_all, fields(uid = %user.uid))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    nonce: CspNonce,
) -> Response {
    let handoff = match session.get::<CheckoutHandoff>(session_keys::CHECKOUT).await {
        Ok(handoff) => handoff,
        Err(e) => {
            warn!(error = %e, "Failed to read checkout hand-off");
            None
        }
    };

    let Some(handoff) = handoff.filter(|h| h.uid == user.uid && !h.items.is_empty()) else {
        return Redirect::to("/cart").into_response();
    };

    CheckoutTemplate {
        page: PageContext::new(nonce, take_flash(&session).await, true),
        cart: CartView::new(&handoff.cart(), state.config().currency),
    }
    .into_response()
}
