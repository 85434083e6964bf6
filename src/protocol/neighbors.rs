//! Fixed-capacity directory of physically reachable nodes
//!
//! Entries are only ever appended or overwritten, never removed. Indices
//! handed out by the table therefore stay valid for the lifetime of the
//! node, which is what lets the state machine keep its successor and
//! predecessor as plain indices. Adding a removal operation would
//! invalidate those indices.

use tracing::{debug, warn};

use crate::core::{CordPosition, Error, NodeId, Result};

/// Last announced state of a physically reachable node
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Physical address
    pub id: NodeId,
    /// Announced cord position
    pub position: CordPosition,
    /// Position the neighbor announced for its successor
    pub successor: CordPosition,
    /// Position the neighbor announced for its predecessor
    pub predecessor: CordPosition,
    /// Signal strength of the last frame received from this neighbor
    pub last_rssi: Option<i8>,
}

impl Neighbor {
    /// Creates an entry whose positions are not known yet
    pub fn unannounced(id: NodeId) -> Self {
        Neighbor {
            id,
            position: CordPosition::UNASSIGNED,
            successor: CordPosition::UNASSIGNED,
            predecessor: CordPosition::UNASSIGNED,
            last_rssi: None,
        }
    }
}

/// Append-only neighbor table with a hard capacity
#[derive(Debug, Clone)]
pub struct NeighborTable {
    entries: Vec<Neighbor>,
    capacity: usize,
}

impl NeighborTable {
    /// Creates an empty table
    pub fn new(capacity: usize) -> Self {
        NeighborTable {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of known neighbors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no neighbor is known
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of neighbors
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the neighbor at `index`
    pub fn get(&self, index: usize) -> Option<&Neighbor> {
        self.entries.get(index)
    }

    /// Iterates over all neighbors in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.entries.iter()
    }

    /// Finds a neighbor by physical address
    pub fn find_by_id(&self, id: &NodeId) -> Option<usize> {
        self.entries.iter().position(|n| n.id == *id)
    }

    /// Finds the first neighbor announcing exactly `position`.
    ///
    /// Unassigned positions never match.
    pub fn find_by_position(&self, position: CordPosition) -> Option<usize> {
        if !position.is_assigned() {
            return None;
        }
        self.entries.iter().position(|n| n.position == position)
    }

    /// Overwrites the announced fields of `id`, appending it if unknown
    pub fn upsert(
        &mut self,
        id: NodeId,
        position: CordPosition,
        successor: CordPosition,
        predecessor: CordPosition,
    ) -> Result<usize> {
        let index = self.ensure(id)?;
        let entry = &mut self.entries[index];
        entry.position = position;
        entry.successor = successor;
        entry.predecessor = predecessor;
        Ok(index)
    }

    /// Returns the index of `id`, appending an unannounced entry if needed
    pub fn ensure(&mut self, id: NodeId) -> Result<usize> {
        if let Some(index) = self.find_by_id(&id) {
            return Ok(index);
        }

        if self.entries.len() >= self.capacity {
            warn!(neighbor = %id, capacity = self.capacity, "neighbor table full, entry refused");
            return Err(Error::NeighborTableFull { capacity: self.capacity });
        }

        debug!(neighbor = %id, index = self.entries.len(), "new neighbor");
        self.entries.push(Neighbor::unannounced(id));
        Ok(self.entries.len() - 1)
    }

    /// Records the signal strength of a frame received from `index`
    pub fn note_signal(&mut self, index: usize, rssi: i8) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.last_rssi = Some(rssi);
        }
    }
}
