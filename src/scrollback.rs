use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::{entry::ChatEntry, render::Renderer};

pub const DEFAULT_CAPACITY: usize = 10;

/// Deletion waits for in-flight insertions to settle, but only this many
/// times; past that it proceeds anyway rather than hanging on a display
/// inconsistency.
const SETTLE_ATTEMPTS: u32 = 10;
const SETTLE_WAIT: Duration = Duration::from_millis(25);

/// Bounded circular store of the most recent chat entries. The pending
/// counter tracks entries whose presentation is still being constructed, so
/// deletions can order themselves after every insertion that started first.
pub struct ScrollbackBuffer<R: Renderer> {
    renderer: R,
    ring: Mutex<SlotRing<R::Handle>>,
    pending: AtomicUsize,
    settled: Notify,
}

struct SlotRing<H> {
    slots: Vec<Option<Slot<H>>>,
    cursor: usize,
}

struct Slot<H> {
    entry: ChatEntry,
    handle: H,
}

impl<R: Renderer> ScrollbackBuffer<R> {
    pub fn new(renderer: R, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            renderer,
            ring: Mutex::new(SlotRing {
                slots: (0..capacity).map(|_| None).collect(),
                cursor: 0,
            }),
            pending: AtomicUsize::new(0),
            settled: Notify::new(),
        }
    }

    /// Builds the presentation for `entry` and inserts it. Construction is a
    /// suspension point; concurrently pending calls land in completion order.
    pub async fn generate(&self, entry: ChatEntry) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let handle = self.renderer.construct(&entry).await;

        let mut ring = self.ring.lock().await;
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.settled.notify_waiters();
        }
        let cursor = ring.cursor;
        if let Some(evicted) = ring.slots[cursor].take() {
            self.renderer.remove(&evicted.handle);
        }
        self.renderer.append(&handle);
        ring.slots[cursor] = Some(Slot { entry, handle });
        ring.cursor = (cursor + 1) % ring.slots.len();
    }

    /// Evicts every retained entry and resets the write cursor.
    pub async fn clear(&self) {
        let mut ring = self.ring.lock().await;
        for slot in ring.slots.iter_mut() {
            if let Some(slot) = slot.take() {
                self.renderer.remove(&slot.handle);
            }
        }
        ring.cursor = 0;
    }

    /// Evicts entries matching `user` (case-insensitive name) or `id`, after
    /// waiting for pending insertions to settle. Entries that merely reply to
    /// `user` keep their slot but have the displayed excerpt redacted.
    pub async fn delete_by(&self, user: Option<&str>, id: Option<&str>) {
        if !self.wait_settled().await {
            warn!(
                pending = self.pending.load(Ordering::Acquire),
                "pending insertions did not settle; deleting anyway"
            );
        }

        let mut ring = self.ring.lock().await;
        for slot_opt in ring.slots.iter_mut() {
            let evict = match slot_opt.as_ref() {
                None => continue,
                Some(slot) => {
                    let name_match = user
                        .map(|user| slot.entry.name.eq_ignore_ascii_case(user))
                        .unwrap_or(false);
                    let id_match = id.is_some() && slot.entry.id.as_deref() == id;
                    name_match || id_match
                }
            };
            if evict {
                if let Some(slot) = slot_opt.take() {
                    self.renderer.remove(&slot.handle);
                }
            } else if let (Some(user), Some(slot)) = (user, slot_opt.as_ref()) {
                // Redaction keys off the purged user only; a purge by message
                // id leaves reply excerpts alone.
                let replies_to_user = slot
                    .entry
                    .host
                    .as_deref()
                    .map(|host| host.eq_ignore_ascii_case(user))
                    .unwrap_or(false);
                if replies_to_user {
                    self.renderer.redact_reply(&slot.handle);
                }
            }
        }
    }

    async fn wait_settled(&self) -> bool {
        let mut attempts = 0u32;
        loop {
            if self.pending.load(Ordering::Acquire) == 0 {
                return true;
            }
            if attempts > SETTLE_ATTEMPTS {
                return false;
            }
            let _ = tokio::time::timeout(SETTLE_WAIT, self.settled.notified()).await;
            attempts += 1;
            debug!(attempts, "waiting for pending scrollback insertions");
        }
    }
}
