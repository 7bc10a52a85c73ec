//! Cart reads and read-transform-write mutations.
//!
//! Every mutation re-reads `carts/{uid}`, applies a pure transform from
//! `yss_core::Cart`, and writes the whole `items` list back with an
//! update-time precondition. A concurrent writer is detected, never merged.

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};
use yss_core::{Cart, CartError, CartItemId, UserUid};

use crate::firebase::{FirebaseError, Precondition, Snapshot};
use crate::state::AppState;

/// Collection holding one cart document per user, keyed by uid.
pub const CARTS: &str = "carts";

/// Result of a cart mutation that got as far as reading the cart.
#[derive(Debug)]
pub enum CartOutcome {
    /// The transformed cart was written.
    Saved(Cart),
    /// No cart document exists; nothing was written.
    NoCart,
    /// The transform rejected the change; the cart is unchanged.
    Rejected { cart: Cart, error: CartError },
    /// Someone else wrote the cart between our read and write. Carries the
    /// freshly read cart.
    Conflict(Cart),
    /// The write failed; carries the cart as it was read.
    Failed { cart: Cart, error: FirebaseError },
}

impl CartOutcome {
    /// The cart to render after this outcome.
    #[must_use]
    pub fn cart(&self) -> Cart {
        match self {
            Self::Saved(cart)
            | Self::Conflict(cart)
            | Self::Rejected { cart, .. }
            | Self::Failed { cart, .. } => cart.clone(),
            Self::NoCart => Cart::default(),
        }
    }

    /// User-facing notice for outcomes that did not save.
    #[must_use]
    pub const fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Saved(_) | Self::NoCart => None,
            Self::Rejected { .. } => Some("Quantity must be at least 1."),
            Self::Conflict(_) => {
                Some("Your cart was changed in another window. Please review it and try again.")
            }
            Self::Failed { .. } => Some("We couldn't update your cart. Please try again."),
        }
    }
}

/// Fetch the shopper's cart. A missing document is an empty cart.
///
/// # Errors
///
/// Returns an error if the document cannot be read.
#[instrument(skip_all, fields(uid = %uid))]
pub async fn load(
    state: &AppState,
    uid: &UserUid,
    id_token: &SecretString,
) -> Result<Cart, FirebaseError> {
    let snapshot = state
        .firestore()
        .get_document::<Cart>(id_token.expose_secret(), CARTS, uid.as_str())
        .await?;
    Ok(snapshot.map(|s| s.data).unwrap_or_default())
}

/// Remove every line with this item id.
///
/// # Errors
///
/// Returns an error if the cart cannot be read.
#[instrument(skip(state, id_token), fields(uid = %uid, item_id = %item_id))]
pub async fn remove_item(
    state: &AppState,
    uid: &UserUid,
    id_token: &SecretString,
    item_id: &CartItemId,
) -> Result<CartOutcome, FirebaseError> {
    mutate(state, uid, id_token, |cart| Ok(cart.without_item(item_id))).await
}

/// Set the quantity of every line with this item id.
///
/// # Errors
///
/// Returns an error if the cart cannot be read.
#[instrument(skip(state, id_token), fields(uid = %uid, item_id = %item_id))]
pub async fn update_quantity(
    state: &AppState,
    uid: &UserUid,
    id_token: &SecretString,
    item_id: &CartItemId,
    quantity: i64,
) -> Result<CartOutcome, FirebaseError> {
    mutate(state, uid, id_token, |cart| cart.with_quantity(item_id, quantity)).await
}

async fn mutate<F>(
    state: &AppState,
    uid: &UserUid,
    id_token: &SecretString,
    transform: F,
) -> Result<CartOutcome, FirebaseError>
where
    F: FnOnce(&Cart) -> Result<Cart, CartError>,
{
    let firestore = state.firestore();
    let token = id_token.expose_secret();

    let Some(current) = firestore
        .get_document::<Cart>(token, CARTS, uid.as_str())
        .await?
    else {
        info!("No cart document, nothing to write");
        return Ok(CartOutcome::NoCart);
    };

    let updated = match transform(&current.data) {
        Ok(cart) => cart,
        Err(error) => {
            return Ok(CartOutcome::Rejected {
                cart: current.data,
                error,
            });
        }
    };

    let precondition = Precondition::UpdateTime(current.update_time.clone());
    match firestore
        .update_fields(token, CARTS, uid.as_str(), &updated, &precondition)
        .await
    {
        Ok(written) => {
            let cart = written.data.clone();
            state.cart_feed().publish(uid, written);
            Ok(CartOutcome::Saved(cart))
        }
        Err(FirebaseError::Conflict) => {
            warn!("Cart changed concurrently, write rejected");
            let fresh = reread(state, uid, token).await.unwrap_or(current);
            Ok(CartOutcome::Conflict(fresh.data))
        }
        Err(error) => {
            warn!(error = %error, "Cart write failed");
            Ok(CartOutcome::Failed {
                cart: current.data,
                error,
            })
        }
    }
}

async fn reread(state: &AppState, uid: &UserUid, token: &str) -> Option<Snapshot<Cart>> {
    match state
        .firestore()
        .get_document::<Cart>(token, CARTS, uid.as_str())
        .await
    {
        Ok(Some(snapshot)) => {
            state.cart_feed().publish(uid, snapshot.clone());
            Some(snapshot)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Re-read after conflict failed");
            None
        }
    }
}
