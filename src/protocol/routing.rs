//! Greedy routing along the cord.
//!
//! Data addressed to a position is delivered locally when it matches the
//! node's own position, handed straight to a neighbor announcing exactly
//! that position, or otherwise pushed one hop along the cord toward the
//! target.

use super::neighbors::NeighborTable;
use crate::core::{CordPosition, Error, Result};

/// Where a data message goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    /// The target is this node
    Local,
    /// A physical neighbor owns the target position
    Direct(usize),
    /// Forward toward higher positions
    Successor(usize),
    /// Forward toward lower positions
    Predecessor(usize),
}

impl NextHop {
    /// Table index of the next hop, if the data leaves this node
    pub fn neighbor(&self) -> Option<usize> {
        match *self {
            NextHop::Local => None,
            NextHop::Direct(n) | NextHop::Successor(n) | NextHop::Predecessor(n) => Some(n),
        }
    }
}

/// Picks the next hop for data addressed to `target`.
///
/// Fails with `Undeliverable` when the cord direction the data has to take
/// has no neighbor bound to it.
pub fn next_hop(
    target: CordPosition,
    own: CordPosition,
    table: &NeighborTable,
    successor: Option<usize>,
    predecessor: Option<usize>,
) -> Result<NextHop> {
    if own.is_assigned() && target == own {
        return Ok(NextHop::Local);
    }

    if let Some(n) = table.find_by_position(target) {
        return Ok(NextHop::Direct(n));
    }

    let hop = if target > own {
        successor.map(NextHop::Successor)
    } else {
        predecessor.map(NextHop::Predecessor)
    };

    hop.ok_or(Error::Undeliverable { target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;

    fn pos(v: f32) -> CordPosition {
        CordPosition::new(v)
    }

    /// own 0.4 with successor at 0.6 (index 0) and predecessor at 0.1 (index 1)
    fn table() -> NeighborTable {
        let mut table = NeighborTable::new(4);
        table.upsert(NodeId([2, 0, 0, 0, 0, 1]), pos(0.6), pos(0.8), pos(0.4)).unwrap();
        table.upsert(NodeId([2, 0, 0, 0, 0, 2]), pos(0.1), pos(0.4), pos(0.0)).unwrap();
        table
    }

    #[test]
    fn test_local_delivery() {
        let hop = next_hop(pos(0.4), pos(0.4), &table(), Some(0), Some(1)).unwrap();
        assert_eq!(hop, NextHop::Local);
        assert_eq!(hop.neighbor(), None);
    }

    #[test]
    fn test_target_at_successor_goes_to_successor() {
        let hop = next_hop(pos(0.6), pos(0.4), &table(), Some(0), Some(1)).unwrap();
        assert_eq!(hop.neighbor(), Some(0));
    }

    #[test]
    fn test_direction_follows_target() {
        let table = table();
        assert_eq!(
            next_hop(pos(0.9), pos(0.4), &table, Some(0), Some(1)).unwrap(),
            NextHop::Successor(0)
        );
        assert_eq!(
            next_hop(pos(0.05), pos(0.4), &table, Some(0), Some(1)).unwrap(),
            NextHop::Predecessor(1)
        );
    }

    #[test]
    fn test_direct_neighbor_beats_direction() {
        let mut table = table();
        table.upsert(NodeId([2, 0, 0, 0, 0, 3]), pos(0.9), pos(1.0), pos(0.6)).unwrap();
        assert_eq!(
            next_hop(pos(0.9), pos(0.4), &table, Some(0), Some(1)).unwrap(),
            NextHop::Direct(2)
        );
    }

    #[test]
    fn test_missing_ref_is_undeliverable() {
        let err = next_hop(pos(0.9), pos(0.4), &table(), None, Some(1)).unwrap_err();
        assert!(matches!(err, Error::Undeliverable { target } if target == pos(0.9)));

        let err = next_hop(pos(0.2), pos(0.4), &table(), Some(0), None).unwrap_err();
        assert!(matches!(err, Error::Undeliverable { .. }));
    }
}
