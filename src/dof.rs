//! Degree-of-freedom bookkeeping
//!
//! Shaft nodes `0..n_shaft_nodes` own six contiguous DOF
//! `[x, y, z, α, β, θ]` starting at `6·node`. Nodes opened through a bearing
//! `n_link` beyond the shaft range own three translational DOF `[x, y, z]`,
//! appended after the shaft block in ascending node order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{RotorError, RotorResult};

/// DOF per shaft node
pub const SHAFT_NODE_DOF: usize = 6;
/// DOF per linked (support) node
pub const LINKED_NODE_DOF: usize = 3;

/// Local coordinate of a degree of freedom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DofKind {
    X,
    Y,
    Z,
    Alpha,
    Beta,
    Theta,
}

impl DofKind {
    const SHAFT_ORDER: [DofKind; 6] = [
        DofKind::X,
        DofKind::Y,
        DofKind::Z,
        DofKind::Alpha,
        DofKind::Beta,
        DofKind::Theta,
    ];

    /// Whether this DOF is part of lateral (bending) motion
    pub fn is_lateral(self) -> bool {
        matches!(self, DofKind::X | DofKind::Y | DofKind::Alpha | DofKind::Beta)
    }
}

/// Global DOF layout for one rotor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DofMap {
    n_shaft_nodes: usize,
    linked: Vec<usize>,
}

impl DofMap {
    /// Build a map for `n_shaft_nodes` shaft nodes plus extra linked nodes
    pub fn new(n_shaft_nodes: usize, linked: &BTreeSet<usize>) -> RotorResult<Self> {
        if let Some(&bad) = linked.iter().find(|&&n| n < n_shaft_nodes) {
            return Err(RotorError::InvalidInput(format!(
                "linked node {bad} overlaps the shaft node range 0..{n_shaft_nodes}"
            )));
        }
        Ok(Self {
            n_shaft_nodes,
            linked: linked.iter().copied().collect(),
        })
    }

    /// Total number of DOF
    pub fn ndof(&self) -> usize {
        SHAFT_NODE_DOF * self.n_shaft_nodes + LINKED_NODE_DOF * self.linked.len()
    }

    /// Number of shaft nodes
    pub fn n_shaft_nodes(&self) -> usize {
        self.n_shaft_nodes
    }

    /// Linked node labels, ascending
    pub fn linked_nodes(&self) -> &[usize] {
        &self.linked
    }

    /// Largest node label in the model
    pub fn max_node(&self) -> usize {
        self.linked
            .last()
            .copied()
            .unwrap_or(self.n_shaft_nodes.saturating_sub(1))
    }

    /// Whether `node` is a shaft node
    pub fn is_shaft_node(&self, node: usize) -> bool {
        node < self.n_shaft_nodes
    }

    /// Whether `node` exists in the model
    pub fn contains(&self, node: usize) -> bool {
        self.is_shaft_node(node) || self.linked.binary_search(&node).is_ok()
    }

    /// First global DOF of a node
    pub fn base(&self, node: usize) -> Option<usize> {
        if self.is_shaft_node(node) {
            return Some(SHAFT_NODE_DOF * node);
        }
        let k = self.linked.binary_search(&node).ok()?;
        Some(SHAFT_NODE_DOF * self.n_shaft_nodes + LINKED_NODE_DOF * k)
    }

    /// All DOF of a node (6 for shaft nodes, 3 for linked nodes)
    pub fn node_dofs(&self, node: usize) -> Option<Vec<usize>> {
        let base = self.base(node)?;
        let count = if self.is_shaft_node(node) {
            SHAFT_NODE_DOF
        } else {
            LINKED_NODE_DOF
        };
        Some((base..base + count).collect())
    }

    /// Translational DOF `[x, y, z]` of a node
    pub fn translational(&self, node: usize) -> Option<[usize; 3]> {
        let b = self.base(node)?;
        Some([b, b + 1, b + 2])
    }

    /// Six DOF of a shaft node
    pub fn shaft_dofs(&self, node: usize) -> Option<[usize; 6]> {
        if !self.is_shaft_node(node) {
            return None;
        }
        let b = SHAFT_NODE_DOF * node;
        Some([b, b + 1, b + 2, b + 3, b + 4, b + 5])
    }

    /// Translational DOF of a node, as a configuration error if missing
    pub fn require_translational(&self, element: &str, node: usize) -> RotorResult<[usize; 3]> {
        self.translational(node)
            .ok_or_else(|| RotorError::NodeOutOfRange {
                element: element.to_string(),
                node,
                max: self.max_node(),
            })
    }

    /// Six DOF of a shaft node, as a configuration error if missing
    pub fn require_shaft(&self, element: &str, node: usize) -> RotorResult<[usize; 6]> {
        self.shaft_dofs(node).ok_or_else(|| RotorError::NodeOutOfRange {
            element: element.to_string(),
            node,
            max: self.n_shaft_nodes.saturating_sub(1),
        })
    }

    /// Kind of every global DOF, in global order
    pub fn kinds(&self) -> Vec<DofKind> {
        let mut kinds = Vec::with_capacity(self.ndof());
        for _ in 0..self.n_shaft_nodes {
            kinds.extend_from_slice(&DofKind::SHAFT_ORDER);
        }
        for _ in &self.linked {
            kinds.extend_from_slice(&DofKind::SHAFT_ORDER[..LINKED_NODE_DOF]);
        }
        kinds
    }

    /// `(node, x_dof, y_dof)` for every node, used for orbit analysis
    pub fn lateral_pairs(&self) -> Vec<(usize, usize, usize)> {
        (0..self.n_shaft_nodes)
            .chain(self.linked.iter().copied())
            .filter_map(|n| self.base(n).map(|b| (n, b, b + 1)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shaft_and_linked_layout() {
        let linked: BTreeSet<usize> = [9, 7].into_iter().collect();
        let map = DofMap::new(7, &linked).unwrap();

        assert_eq!(map.ndof(), 6 * 7 + 3 * 2);
        assert_eq!(map.base(3), Some(18));
        assert_eq!(map.base(7), Some(42));
        assert_eq!(map.base(9), Some(45));
        assert_eq!(map.base(8), None);
        assert_eq!(map.max_node(), 9);
        assert_eq!(map.node_dofs(9).unwrap(), vec![45, 46, 47]);
        assert_eq!(map.kinds()[47], DofKind::Z);
        assert_eq!(map.kinds()[5], DofKind::Theta);
    }

    #[test]
    fn test_linked_inside_shaft_range_rejected() {
        let linked: BTreeSet<usize> = [2].into_iter().collect();
        assert!(DofMap::new(4, &linked).is_err());
    }

    #[test]
    fn test_out_of_range_node_error() {
        let map = DofMap::new(3, &BTreeSet::new()).unwrap();
        let err = map.require_shaft("Disk 0", 5).unwrap_err();
        assert!(matches!(err, RotorError::NodeOutOfRange { node: 5, max: 2, .. }));
    }
}
