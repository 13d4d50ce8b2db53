//! Correlation table: call id → pending slot.
//!
//! Each connection owns one table. The dispatcher registers a slot before
//! its call frame is sent; the read loop resolves it when the reply arrives.
//! A slot is a `oneshot` channel, so it can be resolved at most once and
//! only its owner can observe the result.
//!
//! Dropping a [`PendingSlot`] before it resolves (timeout, or the caller's
//! future being dropped) cancels it. The id is then remembered so a late
//! reply is discarded quietly instead of being reported as an orphan.
//! Only the most recent [`MAX_REMEMBERED_CANCELLATIONS`] ids are kept, so
//! calls that never get a reply do not grow the table.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::codec::Reply;
use crate::error::{BridgeError, Result};
use crate::value::Value;

type SlotResult = Result<Value>;

/// Cancelled ids remembered for late-reply discarding, oldest evicted first.
pub const MAX_REMEMBERED_CANCELLATIONS: usize = 4096;

/// What happened to a reply handed to [`CorrelationTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The waiting caller received it.
    Delivered,
    /// The caller had already given up; the reply was dropped.
    Discarded,
}

#[derive(Default)]
struct TableState {
    slots: HashMap<u64, oneshot::Sender<SlotResult>>,
    cancelled: CancelledIds,
    closed: Option<String>,
}

/// Bounded FIFO set of cancelled call ids.
#[derive(Default)]
struct CancelledIds {
    ids: HashSet<u64>,
    order: VecDeque<u64>,
}

impl CancelledIds {
    fn insert(&mut self, id: u64) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > MAX_REMEMBERED_CANCELLATIONS {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    /// Removing leaves the id in `order`; eviction of a stale entry is a no-op.
    fn remove(&mut self, id: u64) -> bool {
        self.ids.remove(&id)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Map of in-flight call ids to their pending slots.
#[derive(Default)]
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        // Critical sections never panic midway, so a poisoned lock still
        // holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a waiting slot for `id`.
    ///
    /// Fails with [`BridgeError::IdCollision`] if `id` is already waiting and
    /// with [`BridgeError::ConnectionClosed`] once the table is closed.
    pub fn register(self: &Arc<Self>, id: u64) -> Result<PendingSlot> {
        let mut state = self.lock();

        if let Some(reason) = &state.closed {
            return Err(BridgeError::ConnectionClosed(reason.clone()));
        }
        if state.slots.contains_key(&id) {
            return Err(BridgeError::IdCollision(id));
        }

        let (tx, rx) = oneshot::channel();
        state.slots.insert(id, tx);
        state.cancelled.remove(id);

        Ok(PendingSlot {
            id,
            rx: Some(rx),
            table: Arc::clone(self),
        })
    }

    /// Deliver `reply` to the slot waiting on its id.
    ///
    /// Fails with [`BridgeError::OrphanReply`] if nobody registered the id.
    pub fn resolve(&self, reply: Reply) -> Result<Resolution> {
        self.complete(reply.id, reply.outcome.into_result())
    }

    /// Fail the slot waiting on `id` with `error` (e.g. an undecodable reply).
    pub fn fail(&self, id: u64, error: BridgeError) -> Result<Resolution> {
        self.complete(id, Err(error))
    }

    fn complete(&self, id: u64, result: SlotResult) -> Result<Resolution> {
        let sender = {
            let mut state = self.lock();
            match state.slots.remove(&id) {
                Some(sender) => sender,
                None if state.cancelled.remove(id) => return Ok(Resolution::Discarded),
                None => return Err(BridgeError::OrphanReply(id)),
            }
        };

        match sender.send(result) {
            Ok(()) => Ok(Resolution::Delivered),
            // Receiver dropped between the lookup and the send.
            Err(_) => Ok(Resolution::Discarded),
        }
    }

    /// Remove a slot whose caller gave up. Late replies for `id` are discarded.
    ///
    /// Returns `true` if a waiting slot was removed.
    pub fn cancel(&self, id: u64) -> bool {
        let mut state = self.lock();
        if state.slots.remove(&id).is_some() {
            if state.closed.is_none() {
                state.cancelled.insert(id);
            }
            true
        } else {
            false
        }
    }

    /// Remove a slot whose call frame never reached the wire.
    ///
    /// Unlike [`CorrelationTable::cancel`] the id is not remembered: no reply
    /// can come for it.
    pub fn forget(&self, id: u64) -> bool {
        self.lock().slots.remove(&id).is_some()
    }

    /// Close the table and fail every waiting slot with a connection error.
    ///
    /// Idempotent; the first reason wins. Returns the number of slots failed.
    pub fn close(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            state.cancelled.clear();
            state.slots.drain().collect()
        };

        let failed = drained.len();
        let reason = self.closed_reason().unwrap_or_else(|| reason.to_string());
        for (_, sender) in drained {
            let _ = sender.send(Err(BridgeError::ConnectionClosed(reason.clone())));
        }
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    pub fn closed_reason(&self) -> Option<String> {
        self.lock().closed.clone()
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_waiting(&self, id: u64) -> bool {
        self.lock().slots.contains_key(&id)
    }

    /// Cancelled ids still remembered for discarding late replies.
    pub fn cancelled_count(&self) -> usize {
        self.lock().cancelled.len()
    }
}

/// Receiving half of one call's reply handoff.
///
/// Await it with [`PendingSlot::wait`]. Dropping it unresolved cancels the
/// slot in its table.
pub struct PendingSlot {
    id: u64,
    rx: Option<oneshot::Receiver<SlotResult>>,
    table: Arc<CorrelationTable>,
}

impl std::fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSlot")
            .field("id", &self.id)
            .field("consumed", &self.rx.is_none())
            .finish()
    }
}

impl PendingSlot {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Give up on a call whose frame was never sent.
    pub fn forget(mut self) {
        if self.rx.take().is_some() {
            self.table.forget(self.id);
        }
    }

    /// Suspend until the slot is resolved or its connection closes.
    pub async fn wait(mut self) -> Result<Value> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(BridgeError::Cancelled(self.id));
        };

        let result = rx.await;
        self.rx = None;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::ConnectionClosed(
                self.table
                    .closed_reason()
                    .unwrap_or_else(|| "reply channel dropped".to_string()),
            )),
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if self.rx.take().is_some() && self.table.cancel(self.id) {
            tracing::debug!("Call {} abandoned before its reply arrived", self.id);
        }
    }
}
