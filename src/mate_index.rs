//! Online lookup of mate reads for a stream ordered by mate position.
//!
//! Reads whose mate lies further downstream are parked in a min-heap keyed by
//! that mate position. When the stream reaches a position, every parked read
//! expecting a mate there is moved into a small cache keyed by read name, and
//! anything expecting an earlier position is dropped: its mate was never seen.
//!
//! Callers must query with non-decreasing positions. The index does not check
//! this; out-of-order queries simply miss.

use crate::types::{HashMap, HashMapExt, Pos};
use tracing::trace;

#[derive(Debug, Clone)]
struct PendingMate {
    read_id: String,
    pos: Pos,
    mate_pos: Pos,
    idx: usize,
}

/// Binary min-heap on `mate_pos` stored in a flat arena.
///
/// Node numbers are 1-based so the parent of node `n` is `n / 2` and its
/// children are `2 * n` and `2 * n + 1`; node `n` lives in slot `n - 1`.
#[derive(Debug, Default)]
struct PendingHeap {
    nodes: Vec<PendingMate>,
}

impl PendingHeap {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn key(&self, n: usize) -> Pos {
        self.nodes[n - 1].mate_pos
    }

    fn peek_key(&self) -> Option<Pos> {
        self.nodes.first().map(|m| m.mate_pos)
    }

    fn push(&mut self, mate: PendingMate) {
        self.nodes.push(mate);
        let mut n = self.nodes.len();
        while n > 1 && self.key(n / 2) > self.key(n) {
            self.nodes.swap(n / 2 - 1, n - 1);
            n /= 2;
        }
    }

    fn pop(&mut self) -> Option<PendingMate> {
        if self.nodes.is_empty() {
            return None;
        }
        let top = self.nodes.swap_remove(0);

        let size = self.nodes.len();
        let mut n = 1;
        while 2 * n <= size {
            let mut child = 2 * n;
            if child < size && self.key(child + 1) < self.key(child) {
                child += 1;
            }
            if self.key(n) <= self.key(child) {
                break;
            }
            self.nodes.swap(n - 1, child - 1);
            n = child;
        }
        Some(top)
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Mate lookup for one window.
#[derive(Debug)]
pub struct MateReadIndex {
    heap: PendingHeap,
    cached_pos: Option<Pos>,
    cached: HashMap<String, usize>,
}

impl Default for MateReadIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MateReadIndex {
    pub fn new() -> Self {
        Self {
            heap: PendingHeap::default(),
            cached_pos: None,
            cached: HashMap::new(),
        }
    }

    /// Park `read_id`, seen at `pos` and assigned `idx`, until the stream
    /// reaches `mate_pos`.
    ///
    /// When `mate_pos` is the position currently cached, the entry goes
    /// straight into the cache so a mate at the same position still finds it.
    pub fn insert(&mut self, read_id: &str, pos: Pos, idx: usize, mate_pos: Pos) {
        if self.cached_pos == Some(mate_pos) {
            self.cached.insert(read_id.to_string(), idx);
            return;
        }
        self.heap.push(PendingMate {
            read_id: read_id.to_string(),
            pos,
            mate_pos,
            idx,
        });
    }

    /// Index assigned to the parked mate of `read_id`, where `pos` is the
    /// position of the read being looked up (the mate position the parked
    /// entry declared).
    pub fn query(&mut self, read_id: &str, pos: Pos) -> Option<usize> {
        if self.cached_pos.is_none_or(|cached| pos > cached) {
            self.advance_to(pos);
        }
        self.cached.get(read_id).copied()
    }

    fn advance_to(&mut self, pos: Pos) {
        self.cached.clear();
        self.cached_pos = Some(pos);

        while self.heap.peek_key().is_some_and(|k| k < pos) {
            if let Some(expired) = self.heap.pop() {
                trace!(
                    read = %expired.read_id,
                    pos = expired.pos,
                    mate_pos = expired.mate_pos,
                    "mate never reached, dropping"
                );
            }
        }
        while self.heap.peek_key() == Some(pos) {
            if let Some(ready) = self.heap.pop() {
                self.cached.insert(ready.read_id, ready.idx);
            }
        }
    }

    /// Entries still waiting in the heap, excluding the cache.
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.cached.clear();
        self.cached_pos = None;
    }
}
