//! Live cart feed.
//!
//! Each signed-in shopper with an open cart page gets a watcher task that
//! polls `carts/{uid}` and publishes changes on a `tokio::sync::watch`
//! channel. All tabs of the same shopper share one watcher. The task exits
//! and unregisters itself once the last [`CartSubscription`] is dropped, or
//! when Firestore rejects its ID token; subscribers then see the feed end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use yss_core::{Cart, UserUid};

use crate::firebase::{FirebaseError, FirestoreClient, Snapshot};
use crate::services::cart::CARTS;

/// A change on the cart document.
#[derive(Debug, Clone, PartialEq)]
pub enum CartEvent {
    /// Current cart contents.
    Snapshot(Cart),
    /// The cart document does not exist.
    Missing,
}

impl CartEvent {
    /// The cart to render; a missing document renders as empty.
    #[must_use]
    pub fn into_cart(self) -> Cart {
        match self {
            Self::Snapshot(cart) => cart,
            Self::Missing => Cart::default(),
        }
    }
}

/// Remembers the last observed `update_time` so unchanged polls are dropped.
#[derive(Debug, Default)]
struct FeedState {
    /// `None` while the document is missing.
    last_update: Option<String>,
}

impl FeedState {
    fn seeded(snapshot: Option<&Snapshot<Cart>>) -> Self {
        Self {
            last_update: snapshot.map(|s| s.update_time.clone()),
        }
    }

    /// Record a poll result, returning the event to publish if it differs.
    fn observe(&mut self, snapshot: Option<Snapshot<Cart>>) -> Option<CartEvent> {
        match snapshot {
            Some(snapshot) => {
                if self.last_update.as_deref() == Some(snapshot.update_time.as_str()) {
                    return None;
                }
                self.last_update = Some(snapshot.update_time);
                Some(CartEvent::Snapshot(snapshot.data))
            }
            None => self.last_update.take().map(|_| CartEvent::Missing),
        }
    }
}

/// Receiving end of a cart feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct CartSubscription {
    receiver: watch::Receiver<CartEvent>,
}

impl CartSubscription {
    /// The latest event, marking it as seen.
    #[must_use]
    pub fn current(&mut self) -> CartEvent {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next change. Returns `false` once the watcher is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

struct Watcher {
    generation: u64,
    sender: Arc<watch::Sender<CartEvent>>,
    id_token: Arc<Mutex<SecretString>>,
    state: Arc<Mutex<FeedState>>,
}

/// Registry of per-user cart watchers.
#[derive(Clone)]
pub struct CartFeed {
    inner: Arc<CartFeedInner>,
}

struct CartFeedInner {
    firestore: FirestoreClient,
    poll_interval: Duration,
    next_generation: AtomicU64,
    watchers: Mutex<HashMap<UserUid, Watcher>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CartFeed {
    /// Create an empty registry.
    #[must_use]
    pub fn new(firestore: FirestoreClient, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(CartFeedInner {
                firestore,
                poll_interval,
                next_generation: AtomicU64::new(0),
                watchers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to a shopper's cart.
    ///
    /// The first value of the subscription is the current cart. A new watcher
    /// fetches it before registering; an existing watcher is shared and
    /// picks up the caller's (possibly fresher) ID token.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial fetch for a new watcher fails.
    #[instrument(skip_all, fields(uid = %uid))]
    pub async fn subscribe(
        &self,
        uid: &UserUid,
        id_token: &SecretString,
    ) -> Result<CartSubscription, FirebaseError> {
        if let Some(subscription) = self.join_existing(uid, id_token) {
            return Ok(subscription);
        }

        let snapshot = self
            .inner
            .firestore
            .get_document::<Cart>(id_token.expose_secret(), CARTS, uid.as_str())
            .await?;

        // Another request may have registered a watcher while we fetched.
        if let Some(subscription) = self.join_existing(uid, id_token) {
            return Ok(subscription);
        }

        let state = FeedState::seeded(snapshot.as_ref());
        let initial = snapshot.map_or(CartEvent::Missing, |s| CartEvent::Snapshot(s.data));
        Ok(self.start_watcher(uid.clone(), id_token.clone(), initial, state))
    }

    fn join_existing(&self, uid: &UserUid, id_token: &SecretString) -> Option<CartSubscription> {
        let mut watchers = lock(&self.inner.watchers);
        let watcher = watchers.get(uid)?;
        // The task is shutting down once its last subscriber is gone.
        if watcher.sender.is_closed() {
            watchers.remove(uid);
            return None;
        }
        *lock(&watcher.id_token) = id_token.clone();
        Some(CartSubscription {
            receiver: watcher.sender.subscribe(),
        })
    }

    fn start_watcher(
        &self,
        uid: UserUid,
        id_token: SecretString,
        initial: CartEvent,
        state: FeedState,
    ) -> CartSubscription {
        let (sender, receiver) = watch::channel(initial);
        let sender = Arc::new(sender);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let id_token = Arc::new(Mutex::new(id_token));
        let state = Arc::new(Mutex::new(state));

        lock(&self.inner.watchers).insert(
            uid.clone(),
            Watcher {
                generation,
                sender: Arc::clone(&sender),
                id_token: Arc::clone(&id_token),
                state: Arc::clone(&state),
            },
        );

        debug!(uid = %uid, "Starting cart watcher");
        tokio::spawn(
            self.clone()
                .run_watcher(uid, generation, sender, id_token, state),
        );

        CartSubscription { receiver }
    }

    async fn run_watcher(
        self,
        uid: UserUid,
        generation: u64,
        sender: Arc<watch::Sender<CartEvent>>,
        id_token: Arc<Mutex<SecretString>>,
        state: Arc<Mutex<FeedState>>,
    ) {
        let period = self.inner.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = sender.closed() => break,
                _ = interval.tick() => {}
            }

            let token = lock(&id_token).clone();
            match self
                .inner
                .firestore
                .get_document::<Cart>(token.expose_secret(), CARTS, uid.as_str())
                .await
            {
                Ok(snapshot) => {
                    if let Some(event) = lock(&state).observe(snapshot) {
                        debug!(uid = %uid, "Cart changed");
                        sender.send_replace(event);
                    }
                }
                // Subscribers reconnect through the token-refreshing extractor.
                Err(FirebaseError::Unauthenticated) => {
                    info!(uid = %uid, "Cart watcher token expired, closing feed");
                    break;
                }
                Err(e) => warn!(uid = %uid, error = %e, "Cart poll failed"),
            }
        }

        let mut watchers = lock(&self.inner.watchers);
        if watchers.get(&uid).is_some_and(|w| w.generation == generation) {
            watchers.remove(&uid);
        }
        debug!(uid = %uid, "Cart watcher stopped");
    }

    /// Push a freshly written cart to every open tab of this shopper.
    ///
    /// Does nothing if nobody is watching.
    pub fn publish(&self, uid: &UserUid, snapshot: Snapshot<Cart>) {
        let watchers = lock(&self.inner.watchers);
        let Some(watcher) = watchers.get(uid) else {
            return;
        };
        if let Some(event) = lock(&watcher.state).observe(Some(snapshot)) {
            watcher.sender.send_replace(event);
        }
    }

    /// Number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        lock(&self.inner.watchers).len()
    }
}
