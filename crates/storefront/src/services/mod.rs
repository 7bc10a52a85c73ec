//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Cart reads and read-transform-write mutations
//! - `cart_feed` - Shared per-user watchers that push cart changes to open tabs

pub mod cart;
pub mod cart_feed;
