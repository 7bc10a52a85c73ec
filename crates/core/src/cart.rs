//! The per-user cart document.
//!
//! A cart lives at `carts/{uid}` and holds an ordered list of line items.
//! It is always rewritten wholesale: read the list, transform it, write the
//! whole list back. The helpers here are the transforms.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{CartItemId, CurrencyCode, Price};

/// Errors from cart transforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantities below one are not allowed; remove the line instead.
    #[error("quantity must be at least 1 (got {0})")]
    InvalidQuantity(i64),
}

/// A single cart line.
///
/// Lines are written by other parts of the site too, so fields this crate
/// does not know about are kept in `extra` and written back unchanged. The
/// image may be stored under either `image` or `imageUrl`; each key round-trips
/// as it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product identifier; also the key used by remove and update.
    pub id: CartItemId,
    /// Display name.
    pub name: String,
    /// Product image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Product image URL as written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Unit price.
    #[serde(
        serialize_with = "number::serialize",
        deserialize_with = "rust_decimal::serde::float::deserialize"
    )]
    pub price: Decimal,
    /// Selected size, if the product has sizes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Number of units.
    pub quantity: u32,
    /// Any other stored fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CartItem {
    /// The image to display, whichever key it was stored under.
    #[must_use]
    pub fn image_src(&self) -> Option<&str> {
        self.image.as_deref().or(self.image_url.as_deref())
    }

    /// Price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Stable key for rendering: `{id}-{size}`, or `{id}-{index}` without a size.
    #[must_use]
    pub fn line_key(&self, index: usize) -> String {
        match self.size.as_deref() {
            Some(size) if !size.is_empty() => format!("{}-{size}", self.id),
            _ => format!("{}-{index}", self.id),
        }
    }
}

/// Whole amounts are written as integers and the rest as doubles, the
/// same split the web client's SDK makes.
mod number {
    use rust_decimal::Decimal;
    use rust_decimal::prelude::ToPrimitive;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        match value.fract().is_zero().then(|| value.to_i64()).flatten() {
            Some(whole) => serializer.serialize_i64(whole),
            None => rust_decimal::serde::float::serialize(value, serializer),
        }
    }
}

/// The cart document body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Create a cart from line items.
    #[must_use]
    pub const fn new(items: Vec<CartItem>) -> Self {
        Self { items }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A copy of the cart without any line whose id matches.
    ///
    /// Every line sharing the id is dropped, including other sizes of the
    /// same product.
    #[must_use]
    pub fn without_item(&self, id: &CartItemId) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|item| &item.id != id)
                .cloned()
                .collect(),
        }
    }

    /// A copy of the cart with the quantity of every matching line replaced.
    ///
    /// An id that matches nothing leaves the cart unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `quantity` is below one.
    pub fn with_quantity(&self, id: &CartItemId, quantity: i64) -> Result<Self, CartError> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or(CartError::InvalidQuantity(quantity))?;

        Ok(Self {
            items: self
                .items
                .iter()
                .map(|item| {
                    if &item.id == id {
                        CartItem {
                            quantity,
                            ..item.clone()
                        }
                    } else {
                        item.clone()
                    }
                })
                .collect(),
        })
    }

    /// Σ price × quantity.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Subtotal as a [`Price`].
    #[must_use]
    pub fn subtotal_price(&self, currency: CurrencyCode) -> Price {
        Price::new(self.subtotal(), currency)
    }

    /// Σ quantity.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
