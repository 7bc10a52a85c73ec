//! Order documents.
//!
//! Orders are created by the checkout flow and are read-only in the
//! storefront. The document ID is not part of the body; the reader fills in
//! [`Order::id`] from the document name.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderStatus, UserUid, timestamp};

/// A snapshot of a purchased line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default, alias = "imageUrl")]
    pub image: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Where the order is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub street: String,
    pub city: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub delivery_date: Option<DateTime<Utc>>,
}

/// An order as stored at `orders/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Filled from the document name, never stored in the body.
    #[serde(skip)]
    pub id: Option<OrderId>,
    #[serde(rename = "userUID")]
    pub user_uid: UserUid,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub address: ShippingAddress,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Attach the document ID.
    #[must_use]
    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Sort orders newest first; orders without a timestamp go last.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_json(timestamp: serde_json::Value) -> serde_json::Value {
        json!({
            "userUID": "uid-1",
            "items": [
                {"name": "Tee", "imageUrl": "https://img/tee.png", "size": "M",
                 "quantity": 2, "price": 799}
            ],
            "address": {
                "name": "Juan Dela Cruz",
                "phone": "09171234567",
                "email": "juan@example.com",
                "street": "1 Rizal St",
                "city": "Manila",
                "deliveryDate": "2024-12-28"
            },
            "subtotal": 1598,
            "timestamp": timestamp,
            "status": "Processing"
        })
    }

    #[test]
    fn test_decode_full_order() {
        let order = serde_json::from_value::<Order>(order_json(json!("2024-12-20T10:00:00Z")))
            .unwrap()
            .with_id(OrderId::new("o-1"));

        assert_eq!(order.id, Some(OrderId::new("o-1")));
        assert_eq!(order.user_uid.as_str(), "uid-1");
        assert_eq!(order.items[0].image.as_deref(), Some("https://img/tee.png"));
        assert_eq!(order.subtotal, Decimal::from(1598));
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(
            order.address.delivery_date.unwrap().format("%Y-%m-%d").to_string(),
            "2024-12-28"
        );
    }

    #[test]
    fn test_missing_optional_fields() {
        let order: Order = serde_json::from_value(json!({
            "userUID": "uid-1",
            "subtotal": 0
        }))
        .unwrap();

        assert!(order.items.is_empty());
        assert!(order.timestamp.is_none());
        assert_eq!(order.address, ShippingAddress::default());
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_sort_newest_first() {
        let mut orders = vec![
            serde_json::from_value::<Order>(order_json(json!("2024-01-01T00:00:00Z"))).unwrap(),
            serde_json::from_value::<Order>(order_json(json!(null))).unwrap(),
            serde_json::from_value::<Order>(order_json(json!("2024-06-01T00:00:00Z"))).unwrap(),
        ];
        sort_newest_first(&mut orders);

        let years: Vec<_> = orders
            .iter()
            .map(|o| o.timestamp.map(|t| t.format("%m").to_string()))
            .collect();
        assert_eq!(
            years,
            vec![Some("06".to_string()), Some("01".to_string()), None]
        );
    }
}
