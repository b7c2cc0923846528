//! Paced delivery of a batch of new cards.
//!
//! A batch is owned by one spawned task driving a single interval timer.
//! The task ends when the batch is exhausted, when its handle is cancelled,
//! or when the process-wide shutdown fires, whichever comes first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::destination::Destination;
use crate::models::Card;
use crate::render::render;

/// Order in which a batch reaches the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOrder {
    /// Reveal order, oldest spoiler first.
    #[default]
    Spoil,
    /// Newest first, as a stack would pop them.
    Reverse,
}

/// Receiving side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once triggered. If the trigger is dropped without firing,
    /// never resolves.
    pub async fn triggered(&mut self) {
        let closed = self.rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Cards never attempted because the batch was cancelled.
    pub cancelled: usize,
}

/// Handle to a running batch.
pub struct DispatchHandle {
    task: JoinHandle<DispatchReport>,
    cancel: ShutdownTrigger,
}

impl DispatchHandle {
    /// Stops the batch before its next card. Already-sent cards stay sent.
    pub fn cancel(&self) {
        self.cancel.trigger();
    }

    pub async fn finished(self) -> DispatchReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!("dispatch task ended abnormally: {e}");
                DispatchReport::default()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    interval: Duration,
    order: DeliveryOrder,
}

impl Dispatcher {
    pub fn new(interval: Duration, order: DeliveryOrder) -> Self {
        // tokio intervals reject a zero period
        Self {
            interval: interval.max(Duration::from_millis(1)),
            order,
        }
    }

    /// Starts delivering `cards` (given in reveal order) to `destination`,
    /// the first one right away and each next one `interval` later.
    pub fn dispatch(
        &self,
        cards: Vec<Card>,
        destination: Arc<dyn Destination>,
        shutdown: Shutdown,
    ) -> DispatchHandle {
        let queue: VecDeque<Card> = match self.order {
            DeliveryOrder::Spoil => cards.into(),
            DeliveryOrder::Reverse => cards.into_iter().rev().collect(),
        };
        let (cancel, cancelled) = shutdown_channel();
        let task = tokio::spawn(deliver(
            queue,
            destination,
            self.interval,
            shutdown,
            cancelled,
        ));
        DispatchHandle { task, cancel }
    }
}

async fn deliver(
    mut queue: VecDeque<Card>,
    destination: Arc<dyn Destination>,
    interval: Duration,
    mut shutdown: Shutdown,
    mut cancelled: Shutdown,
) -> DispatchReport {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = DispatchReport::default();

    while let Some(card) = queue.pop_front() {
        let stop = tokio::select! {
            biased;
            _ = shutdown.triggered() => true,
            _ = cancelled.triggered() => true,
            _ = ticker.tick() => false,
        };
        if stop {
            report.cancelled = queue.len() + 1;
            info!(
                destination = destination.id(),
                remaining = report.cancelled,
                "card delivery cancelled"
            );
            break;
        }

        info!(destination = destination.id(), card = %card.name, "sending card to destination");
        match destination.send(&render(&card)).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(card = %card.name, "could not deliver card: {e}");
                report.failed += 1;
            }
        }
    }

    info!(
        destination = destination.id(),
        delivered = report.delivered,
        failed = report.failed,
        "done with sending cards"
    );
    report
}
