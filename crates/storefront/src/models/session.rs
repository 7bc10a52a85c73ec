//! Session-related types.
//!
//! Types stored in the session for authentication state, the checkout
//! hand-off and one-shot notices.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use yss_core::{Cart, CartItem, UserUid};

use crate::firebase::SignedInUser;

/// Tokens are refreshed when they expire within this window.
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Session-stored user identity.
///
/// Holds the identity service tokens so every document store call can be
/// made on the shopper's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: UserUid,
    pub email: String,
    #[serde(with = "secret")]
    pub id_token: SecretString,
    #[serde(with = "secret")]
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Build from a fresh sign-in. `entered_email` is used if the service
    /// did not echo the address back.
    #[must_use]
    pub fn from_sign_in(user: SignedInUser, entered_email: &str) -> Self {
        Self {
            uid: user.uid,
            email: user.email.unwrap_or_else(|| entered_email.to_string()),
            id_token: user.id_token,
            refresh_token: user.refresh_token,
            expires_at: user.expires_at,
        }
    }

    /// Whether the ID token expires within the refresh margin of `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(REFRESH_MARGIN_SECONDS)
    }

    /// Replace the tokens with refreshed ones, keeping the email.
    pub fn apply_refresh(&mut self, refreshed: SignedInUser) {
        self.id_token = refreshed.id_token;
        self.refresh_token = refreshed.refresh_token;
        self.expires_at = refreshed.expires_at;
    }
}

/// `SecretString` only leaves memory when the session store serialises it.
mod secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
        String::deserialize(deserializer).map(SecretString::from)
    }
}

/// What the cart page hands to checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutHandoff {
    pub uid: UserUid,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
}

impl CheckoutHandoff {
    /// Snapshot the cart for checkout.
    #[must_use]
    pub fn new(uid: UserUid, cart: &Cart) -> Self {
        Self {
            uid,
            items: cart.items.clone(),
            subtotal: cart.subtotal(),
            created_at: Utc::now(),
        }
    }

    /// The handed-off items as a cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        Cart::new(self.items.clone())
    }
}

/// Severity of a one-shot notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Info,
    Error,
}

impl FlashKind {
    /// CSS modifier for the notice banner.
    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Success => "notice--success",
            Self::Info => "notice--info",
            Self::Error => "notice--error",
        }
    }
}

/// A notice shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the cart hand-off read by the checkout page.
    pub const CHECKOUT: &str = "checkout";

    /// Key for the one-shot notice.
    pub const FLASH: &str = "flash";
}
