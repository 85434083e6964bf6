//! Cord join algorithm
//!
//! A node that finished listening picks its position from a snapshot of
//! the neighbor table. The cases are tried in order:
//!
//! 1. no neighbors: become the cord's anchor at `START`
//! 2. a neighbor sits at `START`: settle between it and its successor
//! 3. a neighbor sits at `END`: settle between its predecessor and it
//! 4. two neighbors are adjacent on the cord: settle between them
//! 5. otherwise: no position yet
//!
//! Case 5 would need a virtual node to bridge the gap. That extension is
//! not defined, so the node simply stays unjoined and tries again later.

use super::message::Message;
use super::neighbors::NeighborTable;
use crate::core::CordPosition;

/// Which join rule matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCase {
    /// Empty neighborhood, node anchors a new cord
    Anchor,
    /// Joined next to the `START` anchor
    AfterStart,
    /// Joined next to the `END` anchor
    BeforeEnd,
    /// Joined between two adjacent neighbors
    Between,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    /// Matched rule
    pub case: JoinCase,
    /// New own position
    pub position: CordPosition,
    /// Table index of the new successor
    pub successor: Option<usize>,
    /// Table index of the new predecessor
    pub predecessor: Option<usize>,
    /// Update messages to unicast, keyed by table index
    pub notifications: Vec<(usize, Message)>,
}

/// Computes a join against the current table, or `None` when deferred
pub fn plan_join(table: &NeighborTable, fraction: f32) -> Option<JoinPlan> {
    if table.is_empty() {
        return Some(JoinPlan {
            case: JoinCase::Anchor,
            position: CordPosition::START,
            successor: None,
            predecessor: None,
            notifications: Vec::new(),
        });
    }

    if let Some(n) = table.find_by_position(CordPosition::START) {
        let anchor = table.get(n)?;
        let upper = anchor.successor.assigned().unwrap_or(CordPosition::END);
        let position = CordPosition::START.between(upper, fraction);
        return Some(JoinPlan {
            case: JoinCase::AfterStart,
            position,
            successor: None,
            predecessor: Some(n),
            notifications: vec![(n, Message::UpdatePredecessor { new_position: position })],
        });
    }

    if let Some(n) = table.find_by_position(CordPosition::END) {
        let anchor = table.get(n)?;
        let lower = anchor.predecessor.assigned().unwrap_or(CordPosition::START);
        let position = lower.between(CordPosition::END, fraction);
        return Some(JoinPlan {
            case: JoinCase::BeforeEnd,
            position,
            successor: Some(n),
            predecessor: None,
            notifications: vec![(n, Message::UpdateSuccessor { new_position: position })],
        });
    }

    for (i, upper) in table.iter().enumerate() {
        if !upper.position.is_assigned() || !upper.predecessor.is_assigned() {
            continue;
        }
        for (j, lower) in table.iter().enumerate() {
            if i != j && lower.position == upper.predecessor {
                let position = upper.position.between(lower.position, fraction);
                return Some(JoinPlan {
                    case: JoinCase::Between,
                    position,
                    successor: Some(i),
                    predecessor: Some(j),
                    notifications: vec![
                        (i, Message::UpdatePredecessor { new_position: position }),
                        (j, Message::UpdateSuccessor { new_position: position }),
                    ],
                });
            }
        }
    }

    None
}
