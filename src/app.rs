//! New-card discovery: load what a destination already saw, fetch the set,
//! persist the union, then hand the new cards to the paced dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::destination::Destination;
use crate::dispatch::{DispatchHandle, DispatchReport, Dispatcher, Shutdown};
use crate::models::{Card, CatalogResult, SetCode};
use crate::mtg::Catalog;
use crate::store::{DedupStore, SeenSet, StoreKey};

/// How a discovery run ended.
pub enum Discovery {
    /// The seen-card record could not be read; nothing was fetched.
    StoreUnavailable,
    /// The catalog could not be reached or answered garbage.
    FetchFailed,
    /// The catalog has no cards for the set.
    NothingFound,
    /// Every card was already announced.
    NoNewCards,
    /// New cards were found but the record could not be saved, so none
    /// were announced.
    PersistFailed,
    Announcing {
        count: usize,
        dispatch: DispatchHandle,
    },
}

impl Discovery {
    /// Waits for announcements to finish, if any were started.
    pub async fn finished(self) -> Option<DispatchReport> {
        match self {
            Discovery::Announcing { dispatch, .. } => Some(dispatch.finished().await),
            _ => None,
        }
    }
}

pub struct App {
    store: Arc<dyn DedupStore>,
    catalog: Arc<dyn Catalog>,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
    runs: RunGuard,
}

impl App {
    pub fn new(
        store: Arc<dyn DedupStore>,
        catalog: Arc<dyn Catalog>,
        dispatcher: Dispatcher,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            catalog,
            dispatcher,
            shutdown,
            runs: RunGuard::default(),
        }
    }

    /// Finds cards of `set` not yet posted to `destination` and starts
    /// posting them. Running it twice never announces a card twice.
    pub async fn discover(
        &self,
        set: &SetCode,
        destination: Arc<dyn Destination>,
        verbose: bool,
    ) -> Discovery {
        let span = info_span!(
            "discover",
            run = %Uuid::new_v4(),
            set = %set,
            destination = destination.id()
        );
        self.run(set, destination, verbose).instrument(span).await
    }

    async fn run(&self, set: &SetCode, destination: Arc<dyn Destination>, verbose: bool) -> Discovery {
        let key = StoreKey::new(set.clone(), destination.id());
        let ticket = self.runs.acquire(key.clone()).await;

        let mut seen = match self.store.load(&key).await {
            Ok(seen) => seen,
            Err(e) => {
                error!("could not load already posted cards: {e}");
                notify(
                    destination.as_ref(),
                    &format!(
                        "Error reading the already posted cards for set code {set}.\n\
                         Check the console for more details."
                    ),
                )
                .await;
                return Discovery::StoreUnavailable;
            }
        };

        if verbose {
            notify(
                destination.as_ref(),
                &format!("Trying to get newly spoiled cards from set with code {set}..."),
            )
            .await;
        }

        let cards = match self.catalog.fetch_spoiled_cards(set).await {
            Ok(CatalogResult::Cards { cards, total }) => {
                debug!(fetched = cards.len(), total, "catalog answered");
                cards
            }
            Ok(CatalogResult::Empty) => {
                info!("no cards found for set");
                if verbose {
                    notify(
                        destination.as_ref(),
                        &format!("Did not find any card with set code {set}."),
                    )
                    .await;
                }
                return Discovery::NothingFound;
            }
            Err(e) => {
                error!("could not fetch cards: {e}");
                notify(
                    destination.as_ref(),
                    &format!(
                        "Error trying to get cards with set code {set}.\n\
                         Check the console for more details."
                    ),
                )
                .await;
                return Discovery::FetchFailed;
            }
        };

        let batch = select_new(cards, &mut seen);
        if batch.is_empty() {
            info!("no new cards were found");
            if verbose {
                notify(
                    destination.as_ref(),
                    &format!("No new cards were found with set code {set}."),
                )
                .await;
            }
            return Discovery::NoNewCards;
        }
        info!(count = batch.len(), "new cards were found");

        if let Err(e) = self.store.save(&key, &seen).await {
            error!("could not save posted cards, not announcing: {e}");
            notify(
                destination.as_ref(),
                &format!(
                    "Error saving the posted cards for set code {set}.\n\
                     Check the console for more details."
                ),
            )
            .await;
            return Discovery::PersistFailed;
        }
        drop(ticket);

        let count = batch.len();
        let dispatch = self
            .dispatcher
            .dispatch(batch, destination, self.shutdown.clone());
        Discovery::Announcing { count, dispatch }
    }
}

/// Cards whose identifier is not in `seen`, in catalog order. Their
/// identifiers are added to `seen`, so repeats within one fetch count once.
fn select_new(cards: Vec<Card>, seen: &mut SeenSet) -> Vec<Card> {
    let mut batch = Vec::new();
    for card in cards {
        let is_new = match card.identifier() {
            Some(id) => seen.insert(id),
            None => {
                warn!(card = %card.name, "card has no identifier, skipping");
                false
            }
        };
        if is_new {
            batch.push(card);
        }
    }
    batch
}

async fn notify(destination: &dyn Destination, text: &str) {
    if let Err(e) = destination.send(text).await {
        warn!("could not send notice: {e}");
    }
}

/// Keys with a run between load and save. A second run on a busy key waits
/// until the first one releases it.
#[derive(Default)]
pub struct RunGuard {
    active: Mutex<HashMap<StoreKey, Arc<Notify>>>,
}

/// Marks a key busy until dropped.
pub struct RunTicket<'a> {
    guard: &'a RunGuard,
    key: StoreKey,
}

impl RunGuard {
    pub async fn acquire(&self, key: StoreKey) -> RunTicket<'_> {
        loop {
            let released = match self.try_acquire(&key) {
                Ok(ticket) => return ticket,
                Err(released) => released,
            };

            let notified = released.notified();
            tokio::pin!(notified);
            // registered before the re-check, so a release in between is not missed
            notified.as_mut().enable();
            if self.is_held_by(&key, &released) {
                debug!(key = %key, "waiting for the previous run on this key");
                notified.await;
            }
        }
    }

    #[cfg(test)]
    pub fn is_running(&self, key: &StoreKey) -> bool {
        self.active().contains_key(key)
    }

    fn try_acquire(&self, key: &StoreKey) -> Result<RunTicket<'_>, Arc<Notify>> {
        let mut active = self.active();
        if let Some(released) = active.get(key) {
            return Err(Arc::clone(released));
        }
        active.insert(key.clone(), Arc::new(Notify::new()));
        Ok(RunTicket {
            guard: self,
            key: key.clone(),
        })
    }

    fn is_held_by(&self, key: &StoreKey, released: &Arc<Notify>) -> bool {
        self.active()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, released))
    }

    fn release(&self, key: &StoreKey) {
        if let Some(released) = self.active().remove(key) {
            released.notify_waiters();
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<StoreKey, Arc<Notify>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        self.guard.release(&self.key);
    }
}
