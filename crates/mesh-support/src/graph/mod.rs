//! Branching support graph.
//!
//! Vertices carry a position and a [`VertexRole`]; edges are undirected
//! struts stored as `[upper, lower]` in construction order. The graph is
//! built incrementally by [`build::build_support_graph`], moved by the
//! optimizer and finally meshed into tubes.

pub mod build;
pub mod search;
pub mod snap;

use std::hash::{DefaultHasher, Hash, Hasher};

use hashbrown::HashSet;
use nalgebra::Point3;

use crate::field::implicit::Aabb;

pub use build::{GraphBuild, GraphBuildStats, build_support_graph};
pub use search::{SearchOutcome, SearchSpace, shortest_path};
pub use snap::{SnapStats, snap_tips};

/// What a vertex is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexRole {
    /// Free vertex along a branch.
    Interior,
    /// Leaf touching the overhanging surface.
    Tip,
    /// Where a tip attaches to its branch.
    TipBase,
    /// Resting on the bed.
    Ground,
}

impl VertexRole {
    /// Pinned vertices never move during optimization.
    #[inline]
    pub fn is_pinned(self) -> bool {
        !matches!(self, VertexRole::Interior)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphVertex {
    pub position: Point3<f64>,
    pub role: VertexRole,
}

/// A problem reported by [`SupportGraph::check_structure`].
#[derive(Debug, Clone, PartialEq)]
pub enum StructureIssue {
    /// A tip with other than exactly one strut.
    TipDegree { vertex: usize, degree: usize },
    /// A ground vertex off the bed plane.
    GroundHeight { vertex: usize, y: f64 },
    /// A leaf that is neither a tip nor on the ground.
    DanglingLeaf { vertex: usize, role: VertexRole },
    /// An edge referencing a missing vertex or looping onto itself.
    BadEdge { edge: usize },
}

/// Support graph with role-tagged vertices.
#[derive(Debug, Clone, Default)]
pub struct SupportGraph {
    vertices: Vec<GraphVertex>,
    edges: Vec<[usize; 2]>,
    edge_set: HashSet<(usize, usize)>,
}

impl SupportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, position: Point3<f64>, role: VertexRole) -> usize {
        self.vertices.push(GraphVertex { position, role });
        self.vertices.len() - 1
    }

    /// Add the strut `upper`-`lower`. Duplicates and self loops are ignored.
    ///
    /// Returns `true` if a new edge was added.
    pub fn add_edge(&mut self, upper: usize, lower: usize) -> bool {
        if upper == lower {
            return false;
        }
        let key = (upper.min(lower), upper.max(lower));
        if !self.edge_set.insert(key) {
            return false;
        }
        self.edges.push([upper, lower]);
        true
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[GraphVertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    #[inline]
    pub fn vertex(&self, v: usize) -> &GraphVertex {
        &self.vertices[v]
    }

    #[inline]
    pub fn position(&self, v: usize) -> Point3<f64> {
        self.vertices[v].position
    }

    #[inline]
    pub fn role(&self, v: usize) -> VertexRole {
        self.vertices[v].role
    }

    pub fn set_position(&mut self, v: usize, position: Point3<f64>) {
        self.vertices[v].position = position;
    }

    pub fn set_role(&mut self, v: usize, role: VertexRole) {
        self.vertices[v].role = role;
    }

    fn with_role(&self, role: VertexRole) -> Vec<usize> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.role == role)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of all tip vertices.
    pub fn tips(&self) -> Vec<usize> {
        self.with_role(VertexRole::Tip)
    }

    pub fn tip_bases(&self) -> Vec<usize> {
        self.with_role(VertexRole::TipBase)
    }

    pub fn grounds(&self) -> Vec<usize> {
        self.with_role(VertexRole::Ground)
    }

    /// Neighbour lists, in edge order.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.vertices.len()];
        for &[a, b] in &self.edges {
            if a < adj.len() && b < adj.len() {
                adj[a].push(b);
                adj[b].push(a);
            }
        }
        adj
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Check the structural invariants: tips have exactly one strut, ground
    /// vertices sit exactly at `ground_y`, and every leaf is a tip or on the
    /// ground.
    pub fn check_structure(&self, ground_y: f64) -> Vec<StructureIssue> {
        let mut issues = Vec::new();
        let n = self.vertices.len();

        for (edge, &[a, b]) in self.edges.iter().enumerate() {
            if a >= n || b >= n || a == b {
                issues.push(StructureIssue::BadEdge { edge });
            }
        }

        let adj = self.adjacency();
        for (vertex, v) in self.vertices.iter().enumerate() {
            let degree = adj[vertex].len();
            match v.role {
                VertexRole::Tip if degree != 1 => {
                    issues.push(StructureIssue::TipDegree { vertex, degree });
                }
                VertexRole::Ground if v.position.y != ground_y => {
                    issues.push(StructureIssue::GroundHeight {
                        vertex,
                        y: v.position.y,
                    });
                }
                VertexRole::Interior | VertexRole::TipBase if degree <= 1 => {
                    issues.push(StructureIssue::DanglingLeaf {
                        vertex,
                        role: v.role,
                    });
                }
                _ => {}
            }
        }
        issues
    }

    /// Deterministic fingerprint of positions, roles and topology.
    ///
    /// Edges are hashed as sorted, undirected pairs so the value only depends
    /// on the vertex numbering.
    pub fn canonical_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.vertices.len().hash(&mut hasher);
        for v in &self.vertices {
            v.position.x.to_bits().hash(&mut hasher);
            v.position.y.to_bits().hash(&mut hasher);
            v.position.z.to_bits().hash(&mut hasher);
            v.role.hash(&mut hasher);
        }
        let mut edges: Vec<(usize, usize)> = self
            .edges
            .iter()
            .map(|&[a, b]| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Tip -> tip base -> interior -> ground, a single straight branch.
    pub(crate) fn make_branch() -> SupportGraph {
        let mut g = SupportGraph::new();
        let tip = g.add_vertex(Point3::new(0.0, 4.0, 0.0), VertexRole::Tip);
        let base = g.add_vertex(Point3::new(0.0, 3.0, 0.0), VertexRole::TipBase);
        let mid = g.add_vertex(Point3::new(0.0, 2.0, 0.0), VertexRole::Interior);
        let ground = g.add_vertex(Point3::new(0.0, 0.0, 0.0), VertexRole::Ground);
        g.add_edge(tip, base);
        g.add_edge(base, mid);
        g.add_edge(mid, ground);
        g
    }

    #[test]
    fn test_roles_and_counts() {
        let g = make_branch();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.tips(), vec![0]);
        assert_eq!(g.tip_bases(), vec![1]);
        assert_eq!(g.grounds(), vec![3]);
        assert!(g.role(0).is_pinned());
        assert!(!g.role(2).is_pinned());
    }

    #[test]
    fn test_edges_deduplicated() {
        let mut g = make_branch();
        assert!(!g.add_edge(2, 1));
        assert!(!g.add_edge(1, 1));
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.adjacency()[1], vec![0, 2]);
    }

    #[test]
    fn test_valid_branch_has_no_issues() {
        assert!(make_branch().check_structure(0.0).is_empty());
    }

    #[test]
    fn test_structure_issues_detected() {
        let mut g = make_branch();
        let stray = g.add_vertex(Point3::new(5.0, 2.0, 0.0), VertexRole::Interior);
        g.add_edge(2, stray);
        g.set_position(3, Point3::new(0.0, 0.1, 0.0));
        let extra_tip = g.add_vertex(Point3::new(1.0, 4.0, 0.0), VertexRole::Tip);

        let issues = g.check_structure(0.0);
        assert!(issues.contains(&StructureIssue::DanglingLeaf {
            vertex: stray,
            role: VertexRole::Interior
        }));
        assert!(issues.contains(&StructureIssue::GroundHeight { vertex: 3, y: 0.1 }));
        assert!(issues.contains(&StructureIssue::TipDegree {
            vertex: extra_tip,
            degree: 0
        }));
    }

    #[test]
    fn test_canonical_hash() {
        let a = make_branch();
        let b = make_branch();
        assert_eq!(a.canonical_hash(), b.canonical_hash());

        let mut moved = make_branch();
        moved.set_position(2, Point3::new(0.0, 2.0, 1e-9));
        assert_ne!(a.canonical_hash(), moved.canonical_hash());

        let mut relinked = make_branch();
        relinked.add_edge(0, 2);
        assert_ne!(a.canonical_hash(), relinked.canonical_hash());
    }

    #[test]
    fn test_bounds() {
        let b = make_branch().bounds().unwrap();
        assert_eq!(b.min.y, 0.0);
        assert_eq!(b.max.y, 4.0);
        assert!(SupportGraph::new().bounds().is_none());
    }
}
