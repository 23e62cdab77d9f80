//! Smoothing of the support graph.
//!
//! Free vertices are pulled towards the centroid of their neighbours in a
//! fixed number of Jacobi-style rounds. Every round reads the positions of
//! the previous one, so the result does not depend on vertex order or on
//! how rayon splits the work. Moves that would make a strut too flat are
//! pulled back towards the starting position, and vertices that end up
//! closer to the model than the surface offset are pushed back out along
//! the surface normal. A push that leaves a strut too flat drops the move.
//!
//! Neighbours move in the same round, so a strut between two accepted moves
//! is checked again before the round is committed. Moves on flat struts are
//! undone until none remain.

use std::time::Instant;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

use mesh_core::MeshSpatial;

use crate::cancel::CancelCheck;
use crate::field::distance::DistanceField;
use crate::graph::SupportGraph;
use crate::params::GraphParams;

/// Attempts to shorten a move that violates the strut angle.
const ANGLE_RETRIES: usize = 3;
/// Fraction of a rejected move kept on each retry.
const RETRY_KEEP: f64 = 1.0 / 3.0;

/// Counts gathered over all rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub rounds: usize,
    /// Vertex moves accepted, summed over rounds.
    pub moves: usize,
    /// Moves abandoned because they left a strut too flat.
    pub angle_rejections: usize,
    /// Moves pushed back out of the model clearance.
    pub clearance_pushes: usize,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Stay,
    Move { to: Point3<f64>, pushed: bool },
    Rejected,
}

struct Smoother<'a> {
    sdf: &'a DistanceField,
    spatial: &'a MeshSpatial,
    alpha: f64,
    min_sin: f64,
    offset: f64,
}

impl Smoother<'_> {
    /// Every strut from `p` to a neighbour is at least the minimum angle
    /// above the horizontal.
    fn steep_enough(&self, p: &Point3<f64>, neighbours: &[usize], positions: &[Point3<f64>]) -> bool {
        neighbours.iter().all(|&n| {
            let d = positions[n] - p;
            let len = d.norm();
            len <= f64::EPSILON || d.y.abs() >= self.min_sin * len
        })
    }

    fn step(&self, v: usize, neighbours: &[usize], positions: &[Point3<f64>]) -> Step {
        if neighbours.is_empty() {
            return Step::Stay;
        }
        let original = positions[v];
        let sum = neighbours
            .iter()
            .fold(Vector3::zeros(), |acc, &n| acc + positions[n].coords);
        let centroid = Point3::from(sum / neighbours.len() as f64);

        let mut candidate = original + (centroid - original) * self.alpha;
        let mut accepted = self.steep_enough(&candidate, neighbours, positions);
        for _ in 0..ANGLE_RETRIES {
            if accepted {
                break;
            }
            candidate = original + (candidate - original) * RETRY_KEEP;
            accepted = self.steep_enough(&candidate, neighbours, positions);
        }
        if !accepted {
            return Step::Rejected;
        }

        let mut pushed = false;
        if self.sdf.sample(&candidate) < self.offset {
            let hit = self.spatial.nearest(&candidate);
            let mut normal = hit.normal;
            normal.y = normal.y.max(0.0);
            let normal = normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y);
            candidate = hit.point + normal * self.offset;
            pushed = true;
            if !self.steep_enough(&candidate, neighbours, positions) {
                return Step::Rejected;
            }
        }

        if candidate == original {
            Step::Stay
        } else {
            Step::Move { to: candidate, pushed }
        }
    }
}

/// Smooth the free vertices of `graph` in place.
///
/// Tips, tip bases and ground vertices never move. Returns `None` if
/// cancelled between rounds; the graph then holds the last completed round.
pub fn optimize_graph(
    graph: &mut SupportGraph,
    sdf: &DistanceField,
    spatial: &MeshSpatial,
    params: &GraphParams,
    check: CancelCheck<'_>,
) -> Option<OptimizeStats> {
    let start = Instant::now();
    let adjacency = graph.adjacency();
    let free: Vec<bool> = graph.vertices().iter().map(|v| !v.role.is_pinned()).collect();
    let smoother = Smoother {
        sdf,
        spatial,
        alpha: params.optimize_alpha,
        min_sin: params.optimize_angle_deg.to_radians().sin(),
        offset: params.surface_offset,
    };

    let mut current: Vec<Point3<f64>> = graph.vertices().iter().map(|v| v.position).collect();
    let mut next = current.clone();
    let mut stats = OptimizeStats::default();

    info!(
        vertices = current.len(),
        free = free.iter().filter(|&&f| f).count(),
        rounds = params.optimize_rounds,
        "Optimizing support graph"
    );

    check.begin(params.optimize_rounds as u64);

    for round in 0..params.optimize_rounds {
        if !check.keep_going("optimizing support graph") {
            debug!(round, "Optimization cancelled");
            return None;
        }

        let steps: Vec<Step> = (0..current.len())
            .into_par_iter()
            .map(|v| {
                if free[v] {
                    smoother.step(v, &adjacency[v], &current)
                } else {
                    Step::Stay
                }
            })
            .collect();

        let mut moved = vec![false; current.len()];
        let mut pushed = vec![false; current.len()];
        for (v, step) in steps.into_iter().enumerate() {
            next[v] = match step {
                Step::Move { to, pushed: p } => {
                    moved[v] = true;
                    pushed[v] = p;
                    to
                }
                Step::Rejected => {
                    stats.angle_rejections += 1;
                    current[v]
                }
                Step::Stay => current[v],
            };
        }

        // Every changed strut has a moved end, and each pass undoes at least one move
        loop {
            let flat: Vec<usize> = (0..next.len())
                .filter(|&v| moved[v] && !smoother.steep_enough(&next[v], &adjacency[v], &next))
                .collect();
            if flat.is_empty() {
                break;
            }
            for v in flat {
                next[v] = current[v];
                moved[v] = false;
                stats.angle_rejections += 1;
            }
        }

        let moves = moved.iter().filter(|&&m| m).count();
        stats.clearance_pushes += moved.iter().zip(&pushed).filter(|&(&m, &p)| m && p).count();
        std::mem::swap(&mut current, &mut next);

        stats.rounds += 1;
        stats.moves += moves;
        check.advance(1);

        // Applied every round so a cancelled run keeps its progress
        for (v, p) in current.iter().enumerate() {
            if free[v] {
                graph.set_position(v, *p);
            }
        }

        if moves == 0 {
            debug!(round, "Graph converged");
            break;
        }
    }

    info!(
        rounds = stats.rounds,
        moves = stats.moves,
        angle_rejections = stats.angle_rejections,
        clearance_pushes = stats.clearance_pushes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Graph optimization complete"
    );

    Some(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::distance::DistanceOptions;
    use crate::field::grid::{DenseGrid3, GridFrame};
    use crate::graph::VertexRole;
    use crate::graph::tests::make_branch;
    use crate::voxelize::tests::make_down_square;
    use mesh_core::{ProgressCallback, ProgressTracker};

    fn far_field() -> DistanceField {
        let frame = GridFrame::new(Point3::new(-10.0, -1.0, -10.0), 1.0, [20, 20, 20], 100_000)
            .unwrap();
        DistanceField::from_samples(
            frame,
            DenseGrid3::new(frame.dims, 50.0),
            DistanceOptions::default(),
        )
    }

    fn kinked() -> SupportGraph {
        // tip -> base -> interior (offset sideways) -> ground
        let mut g = make_branch();
        g.set_position(2, Point3::new(0.4, 2.0, 0.0));
        g
    }

    fn run(g: &mut SupportGraph, params: &GraphParams) -> OptimizeStats {
        let spatial = MeshSpatial::build(&make_down_square(30.0, 1.0)).unwrap();
        let tracker = ProgressTracker::new(0);
        optimize_graph(g, &far_field(), &spatial, params, CancelCheck::new(&tracker, None)).unwrap()
    }

    #[test]
    fn test_pinned_vertices_fixed() {
        let mut g = kinked();
        let before: Vec<_> = g.vertices().to_vec();
        let stats = run(&mut g, &GraphParams::default());

        assert!(stats.rounds > 0);
        for (v, orig) in before.iter().enumerate() {
            if orig.role.is_pinned() {
                assert_eq!(g.position(v), orig.position);
            }
        }
    }

    #[test]
    fn test_kink_straightens() {
        let mut g = kinked();
        let params = GraphParams {
            optimize_alpha: 0.5,
            ..Default::default()
        };
        run(&mut g, &params);
        assert!(g.position(2).x.abs() < 0.4);
        assert!(g.position(2).x >= 0.0);
    }

    #[test]
    fn test_flat_move_rejected() {
        // Every move towards the centroid only flattens the struts to `m`
        let mut g = SupportGraph::new();
        let a = g.add_vertex(Point3::new(0.0, 2.0, 0.0), VertexRole::TipBase);
        let m = g.add_vertex(Point3::new(1.0, 1.0, 0.0), VertexRole::Interior);
        let b = g.add_vertex(Point3::new(2.0, 1.9, 0.0), VertexRole::Ground);
        g.add_edge(a, m);
        g.add_edge(m, b);

        let params = GraphParams {
            optimize_alpha: 1.0,
            optimize_angle_deg: 60.0,
            optimize_rounds: 1,
            ..Default::default()
        };
        let stats = run(&mut g, &params);
        assert_eq!(stats.angle_rejections, 1);
        assert_eq!(g.position(m), Point3::new(1.0, 1.0, 0.0));
    }

    /// Distance to the plane y = 3.
    fn plane_field() -> DistanceField {
        let frame = GridFrame::new(Point3::new(-3.0, -0.5, -3.0), 0.5, [12, 10, 12], 100_000).unwrap();
        let mut values = DenseGrid3::new(frame.dims, 0.0f32);
        for k in 0..12 {
            for j in 0..10 {
                for i in 0..12 {
                    let y = frame.cell_center(i, j, k).y;
                    values.set(i, j, k, (3.0 - y).abs() as f32);
                }
            }
        }
        DistanceField::from_samples(frame, values, DistanceOptions::default())
    }

    fn run_under_plane(g: &mut SupportGraph, params: &GraphParams) -> OptimizeStats {
        let spatial = MeshSpatial::build(&make_down_square(3.0, 2.0)).unwrap();
        let tracker = ProgressTracker::new(0);
        optimize_graph(g, &plane_field(), &spatial, params, CancelCheck::new(&tracker, None)).unwrap()
    }

    #[test]
    fn test_clearance_push() {
        // Interior vertex right under a surface at y = 3
        let mut g = make_branch();
        g.set_position(2, Point3::new(0.0, 2.9, 0.0));

        let params = GraphParams {
            optimize_rounds: 1,
            surface_offset: 0.5,
            ..Default::default()
        };
        let stats = run_under_plane(&mut g, &params);
        assert_eq!(stats.clearance_pushes, 1);
        // Downward normal is flattened to zero and replaced by straight up
        assert!((g.position(2).y - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_push_that_flattens_strut_rejected() {
        // Pushing `m` up to y = 3.5 leaves the strut to `a` about 12 degrees steep
        let mut g = SupportGraph::new();
        let a = g.add_vertex(Point3::new(0.5, 3.6, 0.0), VertexRole::TipBase);
        let m = g.add_vertex(Point3::new(0.0, 2.9, 0.0), VertexRole::Interior);
        let ground = g.add_vertex(Point3::new(0.0, 0.0, 0.0), VertexRole::Ground);
        g.add_edge(a, m);
        g.add_edge(m, ground);

        let params = GraphParams {
            optimize_rounds: 1,
            optimize_alpha: 0.1,
            optimize_angle_deg: 30.0,
            surface_offset: 0.5,
            ..Default::default()
        };
        let stats = run_under_plane(&mut g, &params);
        assert_eq!(stats.clearance_pushes, 0);
        assert_eq!(stats.angle_rejections, 1);
        assert_eq!(g.position(m), Point3::new(0.0, 2.9, 0.0));
    }

    #[test]
    fn test_neighbour_moves_checked_together() {
        // Each move is steep against the old positions, but together they
        // leave m1 -> m2 nearly horizontal
        let mut g = SupportGraph::new();
        let a = g.add_vertex(Point3::new(0.0, 4.0, 0.0), VertexRole::TipBase);
        let m1 = g.add_vertex(Point3::new(-1.0, 3.9, 0.0), VertexRole::Interior);
        let m2 = g.add_vertex(Point3::new(1.0, 0.1, 0.0), VertexRole::Interior);
        let ground = g.add_vertex(Point3::new(0.0, 0.0, 0.0), VertexRole::Ground);
        g.add_edge(a, m1);
        g.add_edge(m1, m2);
        g.add_edge(m2, ground);

        let params = GraphParams {
            optimize_rounds: 1,
            optimize_alpha: 1.0,
            optimize_angle_deg: 30.0,
            ..Default::default()
        };
        let stats = run(&mut g, &params);
        assert_eq!(stats.moves, 0);
        assert_eq!(stats.angle_rejections, 2);
        assert_eq!(g.position(m1), Point3::new(-1.0, 3.9, 0.0));
        assert_eq!(g.position(m2), Point3::new(1.0, 0.1, 0.0));
    }

    #[test]
    fn test_cancel() {
        let mut g = kinked();
        let spatial = MeshSpatial::build(&make_down_square(30.0, 1.0)).unwrap();
        let callback: ProgressCallback = Box::new(|_| false);
        let tracker = ProgressTracker::new(0);
        let out = optimize_graph(
            &mut g,
            &far_field(),
            &spatial,
            &GraphParams::default(),
            CancelCheck::new(&tracker, Some(&callback)),
        );
        assert!(out.is_none());
        assert_eq!(g.position(2), Point3::new(0.4, 2.0, 0.0));
    }
}
