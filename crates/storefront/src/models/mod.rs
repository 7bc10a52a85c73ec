//! Session-held models for the storefront.
//!
//! Cart and order records are defined in `yss_core`; the types here only
//! live in the browser session.

pub mod session;

pub use session::{CheckoutHandoff, CurrentUser, Flash, FlashKind, keys as session_keys};
