//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::destination::Destination;
use crate::error::{Result, SpoilerError};
use crate::mtg::Catalog;
use crate::models::{Card, CatalogResult, SetCode};
use crate::store::{DedupStore, SeenSet, StoreKey};

pub fn card(id: &str, name: &str) -> Card {
    Card {
        id: format!("print-{id}"),
        oracle_id: Some(id.to_owned()),
        name: name.to_owned(),
        ..Default::default()
    }
}

/// Cards whose oracle id and name are both the given string.
pub fn named_cards(names: &[&str]) -> Vec<Card> {
    names.iter().map(|name| card(name, name)).collect()
}

/// Records every message with the (possibly paused) time it arrived.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(Instant, String)>>,
    fail_on: Option<String>,
}

impl Recorder {
    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_owned()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(Instant, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl Destination for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    async fn send(&self, text: &str) -> Result<()> {
        if self.fail_on.as_deref() == Some(text) {
            return Err(SpoilerError::Delivery {
                destination: self.id().to_owned(),
                reason: "rejected".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), text.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<StoreKey, SeenSet>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn failing_saves() -> Self {
        Self {
            fail_saves: true,
            ..Default::default()
        }
    }

    pub fn seed(&self, key: &StoreKey, ids: &[&str]) {
        self.records
            .lock()
            .unwrap()
            .insert(key.clone(), ids.iter().copied().collect());
    }

    pub fn ids(&self, key: &StoreKey) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .get(key)
            .map(|seen| seen.iter().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn load(&self, key: &StoreKey) -> Result<SeenSet> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, key: &StoreKey, seen: &SeenSet) -> Result<()> {
        if self.fail_saves {
            return Err(SpoilerError::StoreWrite {
                path: key.file_name().into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(key.clone(), seen.clone());
        Ok(())
    }
}

/// Serves a fixed card list. Optionally fails, or holds its first call
/// until released.
#[derive(Default)]
pub struct FakeCatalog {
    cards: Vec<Card>,
    fail: bool,
    calls: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeCatalog {
    pub fn with_cards(cards: Vec<Card>) -> Self {
        Self {
            cards,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// The first fetch waits until the returned sender fires.
    pub fn gated(cards: Vec<Card>) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let catalog = Self {
            cards,
            gate: Mutex::new(Some(rx)),
            ..Default::default()
        };
        (catalog, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn fetch_spoiled_cards(&self, _set: &SetCode) -> Result<CatalogResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail {
            return Err(SpoilerError::CatalogStatus {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream down".into(),
            });
        }
        let total = self.cards.len() as u64;
        Ok(CatalogResult::from_cards(self.cards.clone(), total))
    }
}
