//! Cart route handlers.
//!
//! The cart page renders once on the server and then follows the live feed
//! over Server-Sent Events. Remove and quantity changes re-read the stored
//! cart, transform it and write it back (see `services::cart`).

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Redirect, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};
use yss_core::{Cart, CartItem, CartItemId, CurrencyCode, Price};

use crate::error::{AppError, add_breadcrumb};
use crate::firebase::FirebaseError;
use crate::filters;
use crate::middleware::{CspNonce, OptionalAuth, RequireAuth, set_flash, take_flash};
use crate::models::{CheckoutHandoff, Flash, session_keys};
use crate::routes::{PageContext, is_fragment_request};
use crate::services::cart::{self as cart_service, CartOutcome};
use crate::state::AppState;

/// Cart line display data for templates.
#[derive(Debug, Clone)]
pub struct CartItemView {
    pub id: String,
    pub key: String,
    pub name: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
    pub price: String,
    pub line_total: String,
}

impl CartItemView {
    fn new(item: &CartItem, index: usize, currency: CurrencyCode) -> Self {
        Self {
            id: item.id.to_string(),
            key: item.line_key(index),
            name: item.name.clone(),
            image: item.image_src().map(String::from),
            size: item.size.clone(),
            quantity: item.quantity,
            price: Price::new(item.price, currency).display(),
            line_total: Price::new(item.line_total(), currency).display(),
        }
    }

    /// The decrement button is disabled at one; removal is explicit.
    #[must_use]
    pub const fn can_decrement(&self) -> bool {
        self.quantity > 1
    }

    #[must_use]
    pub const fn decremented(&self) -> u32 {
        self.quantity.saturating_sub(1)
    }

    #[must_use]
    pub const fn incremented(&self) -> u32 {
        self.quantity.saturating_add(1)
    }
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
}

impl CartView {
    #[must_use]
    pub fn new(cart: &Cart, currency: CurrencyCode) -> Self {
        Self {
            items: cart
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| CartItemView::new(item, index, currency))
                .collect(),
            subtotal: cart.subtotal_price(currency).display(),
            item_count: cart.item_count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Forms
// =============================================================================

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub item_id: String,
}

/// Update quantity form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub page: PageContext,
    pub cart: CartView,
    pub notice: Option<String>,
    pub live: bool,
}

/// Cart body fragment: item list and order summary.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_body.html")]
pub struct CartBodyTemplate {
    pub cart: CartView,
    pub notice: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the cart page.
///
/// Signed-out visitors see an empty cart; nothing is fetched for them.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    nonce: CspNonce,
) -> Response {
    let currency = state.config().currency;
    let flash = take_flash(&session).await;

    let (cart, notice, status) = match &user {
        Some(user) => match cart_service::load(&state, &user.uid, &user.id_token).await {
            Ok(cart) => (cart, None, StatusCode::OK),
            Err(e) => {
                warn!(error = %e, "Failed to load cart");
                (
                    Cart::default(),
                    Some("We couldn't load your cart. Please refresh the page.".to_string()),
                    StatusCode::BAD_GATEWAY,
                )
            }
        },
        None => (Cart::default(), None, StatusCode::OK),
    };

    let template = CartShowTemplate {
        page: PageContext::new(nonce, flash, user.is_some()),
        cart: CartView::new(&cart, currency),
        notice,
        live: user.is_some(),
    };
    (status, template).into_response()
}

/// Stream rendered cart bodies whenever the stored cart changes.
///
/// The stream (and with it the subscription) ends when the browser
/// disconnects.
///
/// # Errors
///
/// Returns an error if the initial cart fetch fails.
#[instrument(skip_all, fields(uid = %user.uid))]
pub async fn events(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut subscription = state
        .cart_feed()
        .subscribe(&user.uid, &user.id_token)
        .await?;
    let currency = state.config().currency;

    let stream = async_stream::stream! {
        loop {
            let cart = subscription.current().into_cart();
            let fragment = CartBodyTemplate {
                cart: CartView::new(&cart, currency),
                notice: None,
            };
            match fragment.render() {
                Ok(html) => yield Ok(Event::default().event("cart").data(html)),
                Err(e) => warn!(error = %e, "Failed to render cart fragment"),
            }

            if !subscription.changed().await {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Remove a line from the cart.
#[instrument(skip_all, fields(uid = %user.uid, item_id = %form.item_id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    headers: HeaderMap,
    nonce: CspNonce,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let item_id = CartItemId::new(form.item_id);
    add_breadcrumb("cart", "Removed item", Some(&[("item_id", item_id.as_str())]));

    let outcome =
        cart_service::remove_item(&state, &user.uid, &user.id_token, &item_id).await;
    respond(&state, &session, &headers, nonce, outcome).await
}

/// Change the quantity of a line.
///
/// Quantities below one are rejected with `400` and the unchanged cart.
#[instrument(skip_all, fields(uid = %user.uid, item_id = %form.item_id, quantity = form.quantity))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    headers: HeaderMap,
    nonce: CspNonce,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let item_id = CartItemId::new(form.item_id);
    let outcome = cart_service::update_quantity(
        &state,
        &user.uid,
        &user.id_token,
        &item_id,
        form.quantity,
    )
    .await;
    respond(&state, &session, &headers, nonce, outcome).await
}

/// Turn a mutation outcome into a fragment (scripted) or redirect (plain form).
async fn respond(
    state: &AppState,
    session: &Session,
    headers: &HeaderMap,
    nonce: CspNonce,
    outcome: Result<CartOutcome, FirebaseError>,
) -> Response {
    let (cart, notice, status) = match &outcome {
        Ok(outcome) => {
            let status = match outcome {
                CartOutcome::Rejected { .. } => StatusCode::BAD_REQUEST,
                CartOutcome::Conflict(_) => StatusCode::CONFLICT,
                CartOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
                CartOutcome::Saved(_) | CartOutcome::NoCart => StatusCode::OK,
            };
            (outcome.cart(), outcome.notice(), status)
        }
        Err(e) => {
            warn!(error = %e, "Failed to read cart for update");
            (
                Cart::default(),
                Some("We couldn't update your cart. Please try again."),
                StatusCode::BAD_GATEWAY,
            )
        }
    };

    if is_fragment_request(headers) {
        let fragment = CartBodyTemplate {
            cart: CartView::new(&cart, state.config().currency),
            notice: notice.map(String::from),
        };
        return (status, fragment).into_response();
    }

    // A rejected change wrote nothing, so the page can be rendered in place.
    if status == StatusCode::BAD_REQUEST {
        let template = CartShowTemplate {
            page: PageContext::new(nonce, None, true),
            cart: CartView::new(&cart, state.config().currency),
            notice: notice.map(String::from),
            live: true,
        };
        return (status, template).into_response();
    }

    if let Some(notice) = notice {
        set_flash(session, Flash::error(notice)).await;
    }
    Redirect::to("/cart").into_response()
}

/// Hand the cart to checkout.
///
/// The stored cart is re-read, so the hand-off carries what another tab may
/// have written since the page rendered. Signed-out visitors are sent to sign
/// in with a notice.
#[instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Response, AppError> {
    let Some(user) = user else {
        set_flash(
            &session,
            Flash::info("You must be logged in to proceed to checkout."),
        )
        .await;
        return Ok(Redirect::to("/login").into_response());
    };

    let cart = cart_service::load(&state, &user.uid, &user.id_token).await?;
    let handoff = CheckoutHandoff::new(user.uid.clone(), &cart);
    session.insert(session_keys::CHECKOUT, &handoff).await?;

    Ok(Redirect::to("/checkout").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_text, location, send};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use rust_decimal::Decimal;

    fn sample_cart() -> Cart {
        Cart::new(vec![
            CartItem {
                id: CartItemId::new("tee"),
                name: "Oversized Tee".to_string(),
                image: Some("https://firebasestorage.googleapis.com/tee.png".to_string()),
                image_url: None,
                price: Decimal::new(7995, 1),
                size: Some("M".to_string()),
                quantity: 1,
                extra: Default::default(),
            },
            CartItem {
                id: CartItemId::new("cap"),
                name: "Cap".to_string(),
                image: None,
                image_url: None,
                price: Decimal::from(450),
                size: None,
                quantity: 3,
                extra: Default::default(),
            },
        ])
    }

    #[test]
    fn test_cart_view_formats_prices() {
        let view = CartView::new(&sample_cart(), CurrencyCode::PHP);

        assert_eq!(view.subtotal, "₱2149.50");
        assert_eq!(view.item_count, 4);
        assert_eq!(view.items[0].price, "₱799.50");
        assert_eq!(view.items[1].line_total, "₱1350.00");
        assert_eq!(view.items[0].key, "tee-M");
        assert_eq!(view.items[1].key, "cap-1");
    }

    #[test]
    fn test_decrement_disabled_at_one() {
        let view = CartView::new(&sample_cart(), CurrencyCode::PHP);
        assert!(!view.items[0].can_decrement());
        assert!(view.items[1].can_decrement());
        assert_eq!(view.items[1].decremented(), 2);
        assert_eq!(view.items[1].incremented(), 4);
    }

    #[test]
    fn test_cart_body_renders_summary() {
        let html = CartBodyTemplate {
            cart: CartView::new(&sample_cart(), CurrencyCode::PHP),
            notice: Some("Quantity must be at least 1.".to_string()),
        }
        .render()
        .unwrap();

        assert!(html.contains("Subtotal (4 items)"));
        assert!(html.contains("Cash On Delivery"));
        assert!(html.contains("Proceed to Checkout"));
        assert!(html.contains("Quantity must be at least 1."));
        assert!(html.contains("Oversized Tee"));
    }

    #[test]
    fn test_empty_cart_body() {
        let html = CartBodyTemplate {
            cart: CartView::new(&Cart::default(), CurrencyCode::PHP),
            notice: None,
        }
        .render()
        .unwrap();

        assert!(html.contains("Your cart is empty"));
        assert!(html.contains("Start Shopping"));
        assert!(!html.contains("Proceed to Checkout"));
    }

    #[tokio::test]
    async fn test_signed_out_cart_is_empty() {
        let response = send(Request::get("/cart").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Your cart is empty"));
    }

    #[tokio::test]
    async fn test_signed_out_checkout_redirects_to_login() {
        let response = send(
            Request::builder()
                .method(Method::POST)
                .uri("/checkout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/login"));
    }

    #[tokio::test]
    async fn test_signed_out_events_are_unauthorized() {
        let response = send(Request::get("/cart/events").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_out_mutation_redirects_to_login() {
        let response = send(
            Request::builder()
                .method(Method::POST)
                .uri("/cart/remove")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("item_id=tee"))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/login"));
    }

    #[tokio::test]
    async fn test_checkout_hands_off_the_stored_cart() {
        use axum::Router;
        use axum::http::header;
        use axum::routing::get;
        use chrono::{Duration, Utc};
        use secrecy::SecretString;
        use serde_json::json;
        use tower::ServiceExt;
        use yss_core::UserUid;

        use crate::firebase::mock::{MockFirestore, document};
        use crate::middleware::create_session_layer;
        use crate::models::CurrentUser;

        // Another tab raised the quantity after this page rendered.
        let mock = MockFirestore::start().await;
        mock.respond(
            StatusCode::OK,
            document(
                "carts/uid-1",
                "2026-10-19T08:00:00.000001Z",
                json!({
                    "items": { "arrayValue": { "values": [{
                        "mapValue": { "fields": {
                            "id": { "stringValue": "tee" },
                            "name": { "stringValue": "Oversized Tee" },
                            "price": { "doubleValue": 799.5 },
                            "size": { "stringValue": "M" },
                            "quantity": { "integerValue": "5" }
                        } }
                    }] } }
                }),
            ),
        );

        let config = mock.config();
        let user = CurrentUser {
            uid: UserUid::new("uid-1"),
            email: "shopper@example.com".to_string(),
            id_token: SecretString::from("id-token-1"),
            refresh_token: SecretString::from("refresh-token-1"),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let app = Router::new()
            .route(
                "/sign-in-as",
                get(move |session: Session| {
                    let user = user.clone();
                    async move {
                        session
                            .insert(session_keys::CURRENT_USER, user)
                            .await
                            .unwrap();
                    }
                }),
            )
            .route(
                "/handoff",
                get(|session: Session| async move {
                    axum::Json(
                        session
                            .get::<CheckoutHandoff>(session_keys::CHECKOUT)
                            .await
                            .unwrap(),
                    )
                }),
            )
            .merge(crate::routes::routes())
            .layer(create_session_layer(&config))
            .with_state(AppState::new(config));

        let response = app
            .clone()
            .oneshot(Request::get("/sign-in-as").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/checkout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/checkout"));

        let response = app
            .oneshot(
                Request::get("/handoff")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let handoff: CheckoutHandoff =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(handoff.uid, UserUid::new("uid-1"));
        assert_eq!(handoff.items.len(), 1);
        assert_eq!(handoff.items[0].quantity, 5);
        assert_eq!(handoff.subtotal, Decimal::new(39975, 1));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].path.ends_with("/documents/carts/uid-1"));
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Bearer id-token-1")
        );
    }
}
