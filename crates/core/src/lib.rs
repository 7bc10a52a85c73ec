//! YSS Core - Shared domain types for the storefront.
//!
//! The cart and order records live in the hosted document store; this crate
//! describes their shape and the small amount of logic the storefront applies
//! to them (filtering, quantity changes, totals).
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. This keeps it lightweight and trivially testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for document IDs, prices, emails, and statuses
//! - [`cart`] - The per-user cart document and its line-item operations
//! - [`order`] - Read-only order documents shown in the order history

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod types;

pub use cart::{Cart, CartError, CartItem};
pub use order::{Order, OrderItem, ShippingAddress};
pub use types::*;
