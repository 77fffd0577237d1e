//! Push notifications for view layers.
//!
//! Every committed mutation bumps the store version and is broadcast once.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeCause {
    Reconciled { dir: String },
    ContentRefreshed { path: String },
    ContentWritten { path: String },
    Created { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
    Expanded { path: String },
    Collapsed { path: String },
    WatchLost { path: String },
    Selection,
    Tabs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub version: u64,
    pub cause: ChangeCause,
}

pub type ChangeReceiver = broadcast::Receiver<StoreChange>;

#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<StoreChange>,
}

pub fn change_bus(capacity: usize) -> ChangeBus {
    let (tx, _) = broadcast::channel(capacity.max(1));
    ChangeBus { tx }
}

impl ChangeBus {
    pub fn publish(&self, change: StoreChange) {
        if self.tx.send(change).is_err() {
            tracing::trace!("store change published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> ChangeReceiver {
        self.tx.subscribe()
    }
}
