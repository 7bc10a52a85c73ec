//! Order history route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::Value;
use tower_sessions::Session;
use tracing::{error, instrument};
use yss_core::order::sort_newest_first;
use yss_core::{CurrencyCode, Order, OrderItem, OrderStatus, Price, ShippingAddress};

use crate::filters;
use crate::firebase::Snapshot;
use crate::middleware::{CspNonce, RequireAuth, take_flash};
use crate::routes::PageContext;
use crate::state::AppState;

/// Collection holding every order, filtered by `userUID`.
pub const ORDERS: &str = "orders";

const FETCH_FAILED: &str = "Failed to fetch orders. Please try again.";

/// Order line display data.
#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub name: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
    pub price: String,
}

/// Shipping address display data.
#[derive(Debug, Clone)]
pub struct AddressView {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub delivery_date: String,
}

/// Order display data.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: String,
    pub status: String,
    pub status_class: &'static str,
    pub date: String,
    pub items: Vec<OrderItemView>,
    pub address: AddressView,
    pub total: String,
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(
        || "N/A".to_string(),
        |d| d.format("%B %-d, %Y").to_string(),
    )
}

const fn status_class(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "status--pending",
        OrderStatus::Processing => "status--processing",
        OrderStatus::Shipped => "status--shipped",
        OrderStatus::Delivered => "status--delivered",
        OrderStatus::Cancelled => "status--cancelled",
        OrderStatus::Other(_) => "status--other",
    }
}

impl OrderItemView {
    fn new(item: &OrderItem, currency: CurrencyCode) -> Self {
        Self {
            name: item.name.clone(),
            image: item.image.clone(),
            size: item.size.clone(),
            quantity: item.quantity,
            price: Price::new(item.price, currency).display(),
        }
    }
}

impl From<&ShippingAddress> for AddressView {
    fn from(address: &ShippingAddress) -> Self {
        Self {
            name: address.name.clone(),
            phone: address.phone.clone(),
            email: address.email.clone(),
            street: address.street.clone(),
            city: address.city.clone(),
            delivery_date: format_date(address.delivery_date),
        }
    }
}

impl OrderView {
    fn new(order: &Order, currency: CurrencyCode) -> Self {
        Self {
            id: order
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            status: order.status.label().to_string(),
            status_class: status_class(&order.status),
            date: format_date(order.timestamp),
            items: order
                .items
                .iter()
                .map(|item| OrderItemView::new(item, currency))
                .collect(),
            address: AddressView::from(&order.address),
            total: Price::new(order.subtotal, currency).display(),
        }
    }
}

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersTemplate {
    pub page: PageContext,
    pub orders: Vec<OrderView>,
    pub error: Option<&'static str>,
}

/// Attach document ids and sort newest first.
fn into_orders(snapshots: Vec<Snapshot<Order>>) -> Vec<Order> {
    let mut orders: Vec<Order> = snapshots
        .into_iter()
        .map(|s| s.data.with_id(s.id.into()))
        .collect();
    sort_newest_first(&mut orders);
    orders
}

/// Display the signed-in shopper's orders.
#[instrument(skip_all, fields(uid = %user.uid))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    nonce: CspNonce,
) -> Response {
    let page = PageContext::new(nonce, take_flash(&session).await, true);
    let currency = state.config().currency;

    let result = state
        .firestore()
        .query_equal::<Order>(
            user.id_token.expose_secret(),
            ORDERS,
            "userUID",
            &Value::String(user.uid.to_string()),
        )
        .await;

    match result {
        Ok(snapshots) => {
            let orders = into_orders(snapshots)
                .iter()
                .map(|order| OrderView::new(order, currency))
                .collect();
            OrdersTemplate {
                page,
                orders,
                error: None,
            }
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch orders");
            (
                StatusCode::BAD_GATEWAY,
                OrdersTemplate {
                    page,
                    orders: Vec::new(),
                    error: Some(FETCH_FAILED),
                },
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::routes::test_support::{location, send};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn snapshot(id: &str, timestamp: Value) -> Snapshot<Order> {
        let data: Order = serde_json::from_value(json!({
            "userUID": "uid-1",
            "items": [{"name": "Tee", "size": "L", "quantity": 1, "price": 799}],
            "address": {"name": "Juan", "city": "Manila", "deliveryDate": "2024-12-28"},
            "subtotal": 799,
            "timestamp": timestamp,
            "status": "Shipped"
        }))
        .unwrap();
        Snapshot {
            id: id.to_string(),
            update_time: String::new(),
            data,
        }
    }

    #[test]
    fn test_orders_get_ids_and_newest_first() {
        let orders = into_orders(vec![
            snapshot("old", json!("2024-01-05T00:00:00Z")),
            snapshot("new", json!("2024-11-30T00:00:00Z")),
        ]);
        let ids: Vec<_> = orders
            .iter()
            .map(|o| o.id.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_order_view_formatting() {
        let order = into_orders(vec![snapshot("o-1", json!("2024-11-30T08:00:00Z"))]);
        let view = OrderView::new(&order[0], CurrencyCode::PHP);

        assert_eq!(view.id, "o-1");
        assert_eq!(view.status, "Shipped");
        assert_eq!(view.date, "November 30, 2024");
        assert_eq!(view.total, "₱799.00");
        assert_eq!(view.address.delivery_date, "December 28, 2024");
        assert_eq!(view.items[0].price, "₱799.00");
    }

    #[test]
    fn test_missing_dates_render_placeholder() {
        assert_eq!(format_date(None), "N/A");
    }

    #[test]
    fn test_empty_and_error_states_render() {
        let html = OrdersTemplate {
            page: PageContext::default(),
            orders: Vec::new(),
            error: None,
        }
        .render()
        .unwrap();
        assert!(html.contains("No orders found."));

        let html = OrdersTemplate {
            page: PageContext::default(),
            orders: Vec::new(),
            error: Some(FETCH_FAILED),
        }
        .render()
        .unwrap();
        assert!(html.contains(FETCH_FAILED));
        assert!(!html.contains("No orders found."));
    }

    #[tokio::test]
    async fn test_signed_out_orders_redirect_to_login() {
        let response = send(Request::get("/orders").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/login"));
    }
}
