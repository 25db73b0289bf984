//! Static, read-only edge graph (component C1).
//!
//! Edges are supplied once at setup by an external collaborator (a map
//! loader) and never mutated afterwards. Externally, edges are addressed by
//! a 1-based index where `0` is the invalid sentinel (spec §3, §6); the
//! graph converts to a 0-based `Vec` internally and exposes `1-based`
//! lookups through [`EdgeGraph::get`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::errors::SetupError;
use super::fixed_math::FixedVec2;

/// Rail geometry classification for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RailType {
    Linear,
    LeftCurve,
    RightCurve,
    Curve180,
    /// Any other curve shape not covered by the named variants.
    OtherCurve,
}

impl RailType {
    pub fn is_curve(self) -> bool {
        !matches!(self, RailType::Linear)
    }
}

/// Direction of travel through a curve, used for sensor preset selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveDirection {
    Left,
    Right,
    None,
}

/// A single directed rail segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_name: String,
    pub from_node: String,
    pub to_node: String,
    /// Length in meters. Must be > 0 (validated at [`EdgeGraph::build`]).
    pub distance: f64,
    pub rail_type: RailType,
    pub curve_direction: CurveDirection,
    /// Ordered polyline describing the edge's geometry, >= 1 points.
    pub rendering_points: Vec<FixedVec2>,
    /// True iff `to_node` has >= 2 incoming edges. Computed by `build`.
    pub to_node_is_merge: bool,
}

/// 1-based external edge index. `0` is the invalid sentinel.
pub type EdgeIndex = u32;

/// The immutable, shared edge graph.
#[derive(Debug)]
pub struct EdgeGraph {
    edges: Vec<Edge>,
    name_to_index: FxHashMap<String, EdgeIndex>,
    /// node name -> count of incoming edges, retained for diagnostics.
    incoming_counts: FxHashMap<String, u32>,
    /// node name -> outgoing edge indices, used by RANDOM transfer mode and
    /// curve look-ahead.
    outgoing: FxHashMap<String, Vec<EdgeIndex>>,
}

impl EdgeGraph {
    /// Validates and builds a graph from an ordered edge list.
    ///
    /// Input edges need not have `to_node_is_merge` pre-computed; it is
    /// derived here from the incoming-edge counts.
    pub fn build(mut edges: Vec<Edge>) -> Result<Self, SetupError> {
        let mut name_to_index = FxHashMap::default();
        let mut incoming_counts: FxHashMap<String, u32> = FxHashMap::default();
        let mut outgoing: FxHashMap<String, Vec<EdgeIndex>> = FxHashMap::default();

        for (i, edge) in edges.iter().enumerate() {
            if edge.distance <= 0.0 {
                return Err(SetupError::ZeroDistanceEdge(edge.edge_name.clone()));
            }
            let index = (i + 1) as EdgeIndex;
            if name_to_index.insert(edge.edge_name.clone(), index).is_some() {
                return Err(SetupError::DuplicateEdgeName(edge.edge_name.clone()));
            }
            *incoming_counts.entry(edge.to_node.clone()).or_insert(0) += 1;
            outgoing.entry(edge.from_node.clone()).or_default().push(index);
        }

        for edge in edges.iter_mut() {
            let incoming = incoming_counts.get(&edge.to_node).copied().unwrap_or(0);
            edge.to_node_is_merge = incoming >= 2;
        }

        Ok(Self {
            edges,
            name_to_index,
            incoming_counts,
            outgoing,
        })
    }

    /// Edge indices leading out of `node`, in declaration order. Used by
    /// RANDOM path replenishment to pick a successor.
    pub fn outgoing(&self, node: &str) -> &[EdgeIndex] {
        self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks up an edge by its 1-based external index. Returns `None` for
    /// the `0` sentinel or an out-of-range index (spec §4.11: missing edge
    /// is clamp-and-continue, never a panic).
    pub fn get(&self, index: EdgeIndex) -> Option<&Edge> {
        if index == 0 {
            return None;
        }
        self.edges.get((index - 1) as usize)
    }

    pub fn index_of(&self, name: &str) -> Option<EdgeIndex> {
        self.name_to_index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn incoming_count(&self, node: &str) -> u32 {
        self.incoming_counts.get(node).copied().unwrap_or(0)
    }

    pub fn is_merge_node(&self, node: &str) -> bool {
        self.incoming_count(node) >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(name: &str, from: &str, to: &str, distance: f64) -> Edge {
        Edge {
            edge_name: name.to_string(),
            from_node: from.to_string(),
            to_node: to.to_string(),
            distance,
            rail_type: RailType::Linear,
            curve_direction: CurveDirection::None,
            rendering_points: vec![FixedVec2::from_f64(0.0, 0.0), FixedVec2::from_f64(distance, 0.0)],
            to_node_is_merge: false,
        }
    }

    #[test]
    fn rejects_zero_distance_edge() {
        let err = EdgeGraph::build(vec![linear("e1", "a", "b", 0.0)]).unwrap_err();
        assert_eq!(err, SetupError::ZeroDistanceEdge("e1".into()));
    }

    #[test]
    fn rejects_duplicate_edge_name() {
        let err = EdgeGraph::build(vec![
            linear("e1", "a", "b", 5.0),
            linear("e1", "b", "c", 5.0),
        ])
        .unwrap_err();
        assert_eq!(err, SetupError::DuplicateEdgeName("e1".into()));
    }

    #[test]
    fn derives_merge_flag_from_incoming_count() {
        let graph = EdgeGraph::build(vec![
            linear("e1", "a", "m", 5.0),
            linear("e2", "b", "m", 5.0),
            linear("e3", "m", "c", 5.0),
        ])
        .unwrap();
        assert!(graph.get(1).unwrap().to_node_is_merge);
        assert!(graph.get(2).unwrap().to_node_is_merge);
        assert!(!graph.get(3).unwrap().to_node_is_merge);
        assert!(graph.is_merge_node("m"));
    }

    #[test]
    fn outgoing_lists_edges_by_from_node() {
        let graph = EdgeGraph::build(vec![
            linear("e1", "a", "b", 5.0),
            linear("e2", "a", "c", 5.0),
        ])
        .unwrap();
        assert_eq!(graph.outgoing("a"), &[1, 2]);
        assert!(graph.outgoing("z").is_empty());
    }

    #[test]
    fn index_zero_and_out_of_range_are_none() {
        let graph = EdgeGraph::build(vec![linear("e1", "a", "b", 5.0)]).unwrap();
        assert!(graph.get(0).is_none());
        assert!(graph.get(99).is_none());
        assert!(graph.get(1).is_some());
    }
}
