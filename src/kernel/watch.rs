//! One provider subscription per expanded directory.
//!
//! Per path the registry moves `Unwatched -> Pending -> Watching ->
//! Unwatched`. Acquire and release are idempotent. Each live subscription is
//! drained by a forwarding task into the shared bounded reconcile channel;
//! every forwarded event carries the generation of the handle that produced
//! it so events from released handles can be told apart.

use crate::kernel::services::ports::{WatchEvent, WatchStream};
use crate::models::path;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    Event(WatchEvent),
    /// The provider ended the stream without being asked to.
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEvent {
    pub watched: String,
    pub generation: u64,
    pub signal: WatchSignal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WatchState {
    Unwatched,
    Pending,
    Watching,
}

enum WatchSlot {
    Pending { generation: u64 },
    Active { generation: u64, task: JoinHandle<()> },
}

impl WatchSlot {
    fn generation(&self) -> u64 {
        match self {
            WatchSlot::Pending { generation } | WatchSlot::Active { generation, .. } => *generation,
        }
    }

    fn shutdown(self) {
        if let WatchSlot::Active { task, .. } = self {
            task.abort();
        }
    }
}

pub struct WatchRegistry {
    slots: FxHashMap<String, WatchSlot>,
    next_generation: u64,
    events: mpsc::Sender<RoutedEvent>,
}

impl WatchRegistry {
    pub fn new(events: mpsc::Sender<RoutedEvent>) -> Self {
        Self {
            slots: FxHashMap::default(),
            next_generation: 1,
            events,
        }
    }

    pub fn state(&self, dir: &str) -> WatchState {
        match self.slots.get(dir) {
            None => WatchState::Unwatched,
            Some(WatchSlot::Pending { .. }) => WatchState::Pending,
            Some(WatchSlot::Active { .. }) => WatchState::Watching,
        }
    }

    pub fn is_watching(&self, dir: &str) -> bool {
        self.state(dir) == WatchState::Watching
    }

    /// True when `generation` belongs to the live handle on `dir`.
    pub fn is_current(&self, dir: &str, generation: u64) -> bool {
        matches!(
            self.slots.get(dir),
            Some(WatchSlot::Active { generation: live, .. }) if *live == generation
        )
    }

    /// Reserves `dir` for a new subscription.
    ///
    /// Returns the generation the caller must pass back once the provider
    /// answers, or `None` when `dir` is already pending or watched.
    pub fn begin_acquire(&mut self, dir: &str) -> Option<u64> {
        if self.slots.contains_key(dir) {
            return None;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots
            .insert(dir.to_string(), WatchSlot::Pending { generation });
        Some(generation)
    }

    /// Installs `stream` for a reservation made by [`Self::begin_acquire`].
    ///
    /// If the reservation was released in the meantime the stream is closed
    /// on the spot and `false` is returned.
    pub fn complete_acquire(&mut self, dir: &str, generation: u64, stream: WatchStream) -> bool {
        let reserved = matches!(
            self.slots.get(dir),
            Some(WatchSlot::Pending { generation: pending }) if *pending == generation
        );
        if !reserved {
            stream.close();
            return false;
        }
        let task = spawn_forwarder(dir.to_string(), generation, stream, self.events.clone());
        self.slots
            .insert(dir.to_string(), WatchSlot::Active { generation, task });
        tracing::debug!(path = %dir, generation, "watch acquired");
        true
    }

    /// Drops a reservation whose subscription could not be established.
    pub fn fail_acquire(&mut self, dir: &str, generation: u64) {
        if self
            .slots
            .get(dir)
            .is_some_and(|slot| slot.generation() == generation)
        {
            self.slots.remove(dir);
        }
    }

    /// Releases the handle on `dir`; no further events from it are applied.
    pub fn release(&mut self, dir: &str) -> bool {
        match self.slots.remove(dir) {
            Some(slot) => {
                tracing::debug!(path = %dir, generation = slot.generation(), "watch released");
                slot.shutdown();
                true
            }
            None => false,
        }
    }

    /// Releases every handle at or under `root`, returning the released paths.
    pub fn release_under(&mut self, root: &str) -> Vec<String> {
        let mut released: Vec<String> = self
            .slots
            .keys()
            .filter(|dir| path::is_ancestor_or_self(root, dir))
            .cloned()
            .collect();
        released.sort();
        for dir in &released {
            self.release(dir);
        }
        released
    }

    pub fn release_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.shutdown();
        }
    }

    /// Watched or pending paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.slots.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn spawn_forwarder(
    watched: String,
    generation: u64,
    mut stream: WatchStream,
    events: mpsc::Sender<RoutedEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let routed = RoutedEvent {
                watched: watched.clone(),
                generation,
                signal: WatchSignal::Event(event),
            };
            if events.send(routed).await.is_err() {
                return;
            }
        }
        let _ = events
            .send(RoutedEvent {
                watched,
                generation,
                signal: WatchSignal::Terminated,
            })
            .await;
    })
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/watch.rs"]
mod tests;
