use std::collections::HashMap;

use labnode_frame::Response;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Result;

/// Outstanding request awaiting its response.
pub(crate) struct PendingCall {
    /// Unique per call, so a reused sequence number never resolves the wrong caller.
    pub id: u64,
    pub function: u8,
    pub deadline: Instant,
    pub slot: oneshot::Sender<Result<Response>>,
}

/// Pending calls keyed by sequence number, plus the sequence allocator.
///
/// At most one call per sequence number; a number is handed out again only
/// after its call has been removed.
pub(crate) struct PendingTable {
    calls: HashMap<u8, PendingCall>,
    next_sequence: u16,
    space: u16,
    next_id: u64,
}

impl PendingTable {
    pub fn new(space: u16) -> Self {
        Self {
            calls: HashMap::new(),
            next_sequence: 0,
            space: space.max(1),
            next_id: 0,
        }
    }

    /// Next free sequence number after the last one issued, wrapping at the space.
    pub fn allocate(&mut self) -> Option<u8> {
        for offset in 0..self.space {
            let candidate = ((self.next_sequence + offset) % self.space) as u8;
            if !self.calls.contains_key(&candidate) {
                self.next_sequence = (candidate as u16 + 1) % self.space;
                return Some(candidate);
            }
        }
        None
    }

    pub fn next_call_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    pub fn insert(&mut self, sequence: u8, call: PendingCall) {
        let previous = self.calls.insert(sequence, call);
        debug_assert!(previous.is_none(), "sequence {sequence} allocated twice");
    }

    /// Remove whatever call holds `sequence`.
    pub fn take(&mut self, sequence: u8) -> Option<PendingCall> {
        self.calls.remove(&sequence)
    }

    /// Remove the call for `sequence` only if it is still call `id`.
    pub fn take_call(&mut self, sequence: u8, id: u64) -> Option<PendingCall> {
        match self.calls.get(&sequence) {
            Some(call) if call.id == id => self.calls.remove(&sequence),
            _ => None,
        }
    }

    /// Empty the table, handing back every outstanding call.
    pub fn drain(&mut self) -> Vec<(u8, PendingCall)> {
        self.calls.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[cfg(test)]
    pub fn contains(&self, sequence: u8) -> bool {
        self.calls.contains_key(&sequence)
    }
}
