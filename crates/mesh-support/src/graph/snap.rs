//! Moving tip vertices onto the model surface.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use mesh_core::MeshSpatial;

use crate::graph::SupportGraph;

/// Reach of the upward ray, in cells.
const UP_REACH: f64 = 2.0;
/// Reach of the downward ray, in cells.
const DOWN_REACH: f64 = 1.0;
/// Largest accepted closest-point distance, in cells.
const NEAREST_REACH: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapStats {
    pub snapped_up: usize,
    pub snapped_down: usize,
    pub snapped_nearest: usize,
    /// Tips left where they were.
    pub unsnapped: usize,
}

impl SnapStats {
    pub fn snapped(&self) -> usize {
        self.snapped_up + self.snapped_down + self.snapped_nearest
    }
}

#[derive(Debug, Clone, Copy)]
enum Snap {
    Up(Point3<f64>),
    Down(Point3<f64>),
    Nearest(Point3<f64>),
    Miss,
}

fn snap_one(spatial: &MeshSpatial, p: &Point3<f64>, cell: f64) -> Snap {
    if let Some(hit) = spatial.ray_cast(p, &Vector3::y(), UP_REACH * cell) {
        return Snap::Up(hit.point);
    }
    if let Some(hit) = spatial.ray_cast(p, &-Vector3::y(), DOWN_REACH * cell) {
        return Snap::Down(hit.point);
    }
    let nearest = spatial.nearest(p);
    if nearest.distance <= NEAREST_REACH * cell {
        Snap::Nearest(nearest.point)
    } else {
        Snap::Miss
    }
}

/// Snap every tip of `graph` onto the surface indexed by `spatial`.
///
/// Each tip tries, in order, a vertical ray up, a short ray down and the
/// closest surface point; a tip with no candidate in reach keeps its
/// position.
pub fn snap_tips(graph: &mut SupportGraph, spatial: &MeshSpatial, cell_size: f64) -> SnapStats {
    let tips = graph.tips();
    let targets: Vec<(usize, Snap)> = tips
        .par_iter()
        .map(|&v| (v, snap_one(spatial, &graph.position(v), cell_size)))
        .collect();

    let mut stats = SnapStats::default();
    for (v, snap) in targets {
        let target = match snap {
            Snap::Up(p) => {
                stats.snapped_up += 1;
                p
            }
            Snap::Down(p) => {
                stats.snapped_down += 1;
                p
            }
            Snap::Nearest(p) => {
                stats.snapped_nearest += 1;
                p
            }
            Snap::Miss => {
                stats.unsnapped += 1;
                continue;
            }
        };
        graph.set_position(v, target);
    }

    debug!(
        tips = tips.len(),
        up = stats.snapped_up,
        down = stats.snapped_down,
        nearest = stats.snapped_nearest,
        unsnapped = stats.unsnapped,
        "Tips snapped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexRole;
    use crate::voxelize::tests::make_down_square;

    fn graph_with_tips(tips: &[[f64; 3]]) -> SupportGraph {
        let mut g = SupportGraph::new();
        for p in tips {
            let base = g.add_vertex(Point3::new(p[0], p[1] - 1.0, p[2]), VertexRole::TipBase);
            let tip = g.add_vertex(Point3::new(p[0], p[1], p[2]), VertexRole::Tip);
            g.add_edge(tip, base);
        }
        g
    }

    #[test]
    fn test_snap_modes() {
        let surface = make_down_square(5.0, 2.0);
        let spatial = MeshSpatial::build(&surface).unwrap();
        let mut g = graph_with_tips(&[
            [0.0, 4.5, 0.0],  // below: ray up
            [0.5, 5.3, 0.5],  // just above: ray down
            [2.6, 4.8, 0.0],  // beside the edge: closest point
            [0.0, -3.0, 0.0], // far away
        ]);

        let stats = snap_tips(&mut g, &spatial, 1.0);
        assert_eq!(stats.snapped_up, 1);
        assert_eq!(stats.snapped_down, 1);
        assert_eq!(stats.snapped_nearest, 1);
        assert_eq!(stats.unsnapped, 1);
        assert_eq!(stats.snapped(), 3);

        assert!((g.position(1).y - 5.0).abs() < 1e-9);
        assert!((g.position(3).y - 5.0).abs() < 1e-9);
        let side = g.position(5);
        assert!((side.x - 2.0).abs() < 1e-9);
        assert!((side.y - 5.0).abs() < 1e-9);
        assert_eq!(g.position(7), Point3::new(0.0, -3.0, 0.0));
        // Bases never move
        assert_eq!(g.position(0), Point3::new(0.0, 3.5, 0.0));
    }
}
