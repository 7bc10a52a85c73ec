//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::firebase::{FirestoreClient, IdentityClient};
use crate::services::cart_feed::CartFeed;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// Firebase clients, the live cart feed and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    firestore: FirestoreClient,
    identity: IdentityClient,
    cart_feed: CartFeed,
}

impl AppState {
    /// Create a new application state.
    ///
    /// No network calls are made here; clients connect lazily.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let firestore = FirestoreClient::new(&config.firebase);
        let identity = IdentityClient::new(&config.firebase);
        let cart_feed = CartFeed::new(firestore.clone(), config.cart_poll_interval);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                firestore,
                identity,
                cart_feed,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the Firestore client.
    #[must_use]
    pub fn firestore(&self) -> &FirestoreClient {
        &self.inner.firestore
    }

    /// Get a reference to the identity client.
    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }

    /// Get a reference to the live cart feed registry.
    #[must_use]
    pub fn cart_feed(&self) -> &CartFeed {
        &self.inner.cart_feed
    }
}
