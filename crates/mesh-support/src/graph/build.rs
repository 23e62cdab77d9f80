//! Incremental construction of the support graph.
//!
//! Seeds are the strut attachment cells one layer below each overhang
//! voxel. Each seed runs a shortest-path search down through a 9-neighbour
//! stencil until it reaches the bed or touches structure built by an
//! earlier seed; the cells of the winning path are then claimed and turned
//! into graph vertices. Claimed cells are strongly attractive, so later
//! branches merge into earlier ones instead of running to the bed on their
//! own.

use std::time::Instant;

use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancelCheck;
use crate::field::distance::DistanceField;
use crate::field::grid::DenseGrid3;
use crate::graph::search::{SearchSpace, shortest_path};
use crate::graph::{SupportGraph, VertexRole};
use crate::params::{CostModel, GraphParams};
use crate::voxelize::{CellState, VoxelGrid};

/// Voxel index `[i, j, k]`.
pub type Cell = [usize; 3];

/// Edge cost into a cell that already carries support.
const CLAIMED_COST: f64 = -1.0e6;

/// Cells deeper than this fraction of a cell inside the model are blocked.
const INSIDE_TOLERANCE: f64 = 0.01;

/// Counts gathered while building the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphBuildStats {
    /// Seeds found in the voxel grid.
    pub seeds: usize,
    /// Seeds on the outer border that cannot be searched from.
    pub skipped: usize,
    /// Searches that ran out of cells and stopped at the last visited one.
    pub fallbacks: usize,
    /// Nodes settled over all searches.
    pub visited: usize,
    pub vertices: usize,
    pub edges: usize,
}

/// Output of [`build_support_graph`].
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: SupportGraph,
    pub stats: GraphBuildStats,
}

/// Per-cell traversal cost: infinite inside the model, otherwise weighted
/// by `model`.
pub fn cost_grid(sdf: &DistanceField, model: CostModel) -> DenseGrid3<f64> {
    let frame = *sdf.frame();
    let [ni, nj, _] = frame.dims;
    let inside = -INSIDE_TOLERANCE * frame.cell_size;

    let mut costs = DenseGrid3::new(frame.dims, 1.0);
    costs
        .as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cost)| {
            let i = idx % ni;
            let j = (idx / ni) % nj;
            let k = idx / (ni * nj);
            let d = sdf.cell_value(i, j, k);
            *cost = if d < inside {
                f64::INFINITY
            } else {
                match model {
                    CostModel::Uniform => 1.0,
                    CostModel::ClearanceBiased { falloff } => {
                        1.0 + ((falloff - d) / falloff).max(0.0)
                    }
                }
            };
        });
    costs
}

/// Search rules over an immutable snapshot of the voxel grid.
pub struct GridSearch<'a> {
    grid: &'a VoxelGrid,
    costs: &'a DenseGrid3<f64>,
}

impl<'a> GridSearch<'a> {
    pub fn new(grid: &'a VoxelGrid, costs: &'a DenseGrid3<f64>) -> Self {
        Self { grid, costs }
    }
}

impl SearchSpace for GridSearch<'_> {
    type Node = Cell;

    fn is_valid_node(&self, [i, j, k]: Cell) -> bool {
        let [ni, nj, nk] = self.grid.frame.dims;
        i >= 1 && i + 2 <= ni && k >= 1 && k + 2 <= nk && j + 1 < nj
    }

    fn edge_cost(&self, [ai, aj, ak]: Cell, [bi, bj, bk]: Cell) -> f64 {
        let state = self.grid.state(bi, bj, bk);
        if state == CellState::TipTop {
            return f64::INFINITY;
        }
        if state.is_claimed() {
            return CLAIMED_COST;
        }
        let di = bi as f64 - ai as f64;
        let dj = bj as f64 - aj as f64;
        let dk = bk as f64 - ak as f64;
        let length = (di * di + dj * dj + dk * dk).sqrt() * self.grid.frame.cell_size;
        length + self.costs.get(bi, bj, bk)
    }

    fn neighbors(&self, [i, j, k]: Cell, out: &mut Vec<Cell>) {
        if j == 0 || i == 0 || k == 0 {
            return;
        }
        for nk in k - 1..=k + 1 {
            for ni in i - 1..=i + 1 {
                out.push([ni, j - 1, nk]);
            }
        }
    }

    fn is_goal(&self, [i, j, k]: Cell) -> bool {
        j == 0 || self.grid.state(i, j, k).is_claimed()
    }
}

/// Seed cells in processing order.
///
/// Layers run top-down (bottom-up when `params.bottom_up`); within a layer
/// seeds are sorted nearest-first by plan-view distance to `plan_center`,
/// or farthest-first when `params.reverse_within_layer`. Ties keep scan
/// order (k outer, i inner).
pub fn ordered_seeds(grid: &VoxelGrid, params: &GraphParams, plan_center: [f64; 2]) -> Vec<Cell> {
    let nj = grid.frame.dims[1];
    let layers: Vec<usize> = if params.bottom_up {
        (0..nj).collect()
    } else {
        (0..nj).rev().collect()
    };

    let mut seeds = Vec::new();
    for j in layers {
        let layer = grid.cells.layer(j);
        let mut row: Vec<(f64, Cell)> = layer
            .iter_indexed()
            .filter(|(_, state)| **state == CellState::TipBase)
            .map(|((i, k), _)| {
                let c = grid.frame.cell_center(i, j, k);
                let dx = c.x - plan_center[0];
                let dz = c.z - plan_center[1];
                (dx * dx + dz * dz, [i, j, k])
            })
            .collect();
        row.sort_by(|a, b| a.0.total_cmp(&b.0));
        if params.reverse_within_layer {
            row.reverse();
        }
        seeds.extend(row.into_iter().map(|(_, cell)| cell));
    }
    seeds
}

/// Grow the support graph from every seed in `grid`.
///
/// Cells on accepted paths are claimed in `grid` (`Ground` on layer 0,
/// `Used` elsewhere). Every processed seed gets a tip vertex one layer above
/// it. Returns `None` if cancelled.
pub fn build_support_graph(
    grid: &mut VoxelGrid,
    sdf: &DistanceField,
    params: &GraphParams,
    plan_center: [f64; 2],
    check: CancelCheck<'_>,
) -> Option<GraphBuild> {
    let start = Instant::now();
    let costs = cost_grid(sdf, params.cost_model);
    let seeds = ordered_seeds(grid, params, plan_center);

    info!(
        seeds = seeds.len(),
        bottom_up = params.bottom_up,
        reverse_within_layer = params.reverse_within_layer,
        "Building support graph"
    );

    let mut graph = SupportGraph::new();
    let mut stats = GraphBuildStats {
        seeds: seeds.len(),
        ..Default::default()
    };
    let mut vertex_of: HashMap<Cell, usize> = HashMap::new();

    check.begin(seeds.len() as u64);

    for (n, &seed) in seeds.iter().enumerate() {
        if !check.keep_going("building support graph") {
            debug!(processed = n, "Graph build cancelled");
            return None;
        }
        check.advance(1);

        let outcome = {
            let space = GridSearch::new(grid, &costs);
            shortest_path(&space, seed)
        };
        let Some(outcome) = outcome else {
            stats.skipped += 1;
            continue;
        };
        stats.visited += outcome.visited;
        if !outcome.reached_goal {
            stats.fallbacks += 1;
            warn!(
                seed = ?seed,
                end = ?outcome.terminal(),
                "No route to bed or support, branch ends at last visited cell"
            );
        }

        let Some(seed_vertex) = materialize_path(grid, &mut graph, &mut vertex_of, &outcome.path)
        else {
            stats.skipped += 1;
            continue;
        };
        if graph.role(seed_vertex) != VertexRole::Ground {
            graph.set_role(seed_vertex, VertexRole::TipBase);
        }

        let [i, j, k] = seed;
        let tip = graph.add_vertex(grid.frame.cell_center(i, j + 1, k), VertexRole::Tip);
        graph.add_edge(tip, seed_vertex);
    }

    stats.vertices = graph.vertex_count();
    stats.edges = graph.edge_count();

    info!(
        vertices = stats.vertices,
        edges = stats.edges,
        fallbacks = stats.fallbacks,
        skipped = stats.skipped,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Support graph built"
    );

    Some(GraphBuild { graph, stats })
}

/// Claim the cells of `path` (seed first) and link them bottom-up.
///
/// Returns the vertex of the seed cell, `None` for an empty path.
fn materialize_path(
    grid: &mut VoxelGrid,
    graph: &mut SupportGraph,
    vertex_of: &mut HashMap<Cell, usize>,
    path: &[Cell],
) -> Option<usize> {
    let ground_y = grid.ground_y;
    let mut lower: Option<usize> = None;

    for &cell in path.iter().rev() {
        let [i, j, k] = cell;
        let vertex = *vertex_of.entry(cell).or_insert_with(|| {
            let mut position = grid.frame.cell_center(i, j, k);
            let role = if j == 0 {
                position.y = ground_y;
                VertexRole::Ground
            } else {
                VertexRole::Interior
            };
            graph.add_vertex(position, role)
        });

        let claimed = if j == 0 { CellState::Ground } else { CellState::Used };
        grid.cells.set(i, j, k, claimed);

        if let Some(below) = lower {
            graph.add_edge(vertex, below);
        }
        lower = Some(vertex);
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::distance::DistanceOptions;
    use crate::field::grid::GridFrame;
    use mesh_core::{ProgressCallback, ProgressTracker};
    use nalgebra::Point3;

    fn setup(dims: [usize; 3], sdf: impl Fn(usize, usize, usize) -> f32) -> (VoxelGrid, DistanceField) {
        let frame = GridFrame::new(Point3::new(0.0, -0.5, 0.0), 1.0, dims, 100_000).unwrap();
        let mut values = DenseGrid3::new(dims, 0.0f32);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    values.set(i, j, k, sdf(i, j, k));
                }
            }
        }
        (
            VoxelGrid::new(frame, 0.0),
            DistanceField::from_samples(frame, values, DistanceOptions::default()),
        )
    }

    fn seed(grid: &mut VoxelGrid, i: usize, j: usize, k: usize) {
        grid.cells.set(i, j + 1, k, CellState::TipTop);
        grid.cells.set(i, j, k, CellState::TipBase);
    }

    fn run(grid: &mut VoxelGrid, sdf: &DistanceField, params: &GraphParams) -> GraphBuild {
        let tracker = ProgressTracker::new(0);
        build_support_graph(grid, sdf, params, [3.5, 3.5], CancelCheck::new(&tracker, None)).unwrap()
    }

    #[test]
    fn test_cost_grid_blocks_inside() {
        let (_, sdf) = setup([4, 4, 4], |_, j, _| if j == 1 { -1.0 } else { 0.2 });
        let uniform = cost_grid(&sdf, CostModel::Uniform);
        assert_eq!(*uniform.get(1, 1, 1), f64::INFINITY);
        assert_eq!(*uniform.get(1, 2, 1), 1.0);

        let biased = cost_grid(&sdf, CostModel::ClearanceBiased { falloff: 1.0 });
        assert!((biased.get(1, 2, 1) - 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_single_seed_runs_to_ground() {
        let (mut grid, sdf) = setup([7, 8, 7], |_, _, _| 5.0);
        seed(&mut grid, 3, 4, 3);

        let out = run(&mut grid, &sdf, &GraphParams::default());
        let g = &out.graph;
        assert_eq!(out.stats.seeds, 1);
        assert_eq!(out.stats.fallbacks, 0);
        assert_eq!(g.tips().len(), 1);
        assert_eq!(g.tip_bases().len(), 1);
        assert_eq!(g.grounds().len(), 1);
        // Straight down: tip, base at j=4, three interior, ground
        assert_eq!(g.vertex_count(), 6);
        assert_eq!(g.edge_count(), 5);
        assert!(g.check_structure(0.0).is_empty());

        assert_eq!(grid.state(3, 0, 3), CellState::Ground);
        assert_eq!(grid.state(3, 2, 3), CellState::Used);
        let tip = g.tips()[0];
        assert_eq!(g.position(tip).y, 5.0);
    }

    #[test]
    fn test_second_seed_merges() {
        let (mut grid, sdf) = setup([9, 8, 9], |_, _, _| 5.0);
        seed(&mut grid, 4, 5, 4);
        seed(&mut grid, 5, 5, 4);

        let out = run(&mut grid, &sdf, &GraphParams::default());
        let g = &out.graph;
        assert_eq!(g.tips().len(), 2);
        // The far seed joins the first trunk one layer down
        assert_eq!(g.grounds().len(), 1);
        assert!(g.check_structure(0.0).is_empty());
    }

    #[test]
    fn test_routes_around_model() {
        // A solid block directly under the seed
        let (mut grid, sdf) = setup([9, 8, 9], |i, j, k| {
            if (3..=5).contains(&i) && (3..=5).contains(&k) && (1..=3).contains(&j) {
                -1.0
            } else {
                2.0
            }
        });
        seed(&mut grid, 4, 5, 4);

        let out = run(&mut grid, &sdf, &GraphParams::default());
        assert_eq!(out.stats.fallbacks, 0);
        for v in out.graph.vertices() {
            let c = grid.frame.cell_of(&v.position);
            if let Some([i, j, k]) = c {
                assert!(!(sdf.cell_value(i, j, k) < 0.0), "vertex inside model at {:?}", [i, j, k]);
            }
        }
        assert!(out.graph.check_structure(0.0).is_empty());
    }

    #[test]
    fn test_enclosed_seed_falls_back() {
        let (mut grid, sdf) = setup([7, 8, 7], |_, j, _| if j <= 2 { -1.0 } else { 2.0 });
        seed(&mut grid, 3, 5, 3);
        let out = run(&mut grid, &sdf, &GraphParams::default());
        assert_eq!(out.stats.fallbacks, 1);
        assert!(out.graph.grounds().is_empty());
    }

    #[test]
    fn test_ordering() {
        let (mut grid, _) = setup([9, 8, 9], |_, _, _| 5.0);
        seed(&mut grid, 4, 5, 4);
        seed(&mut grid, 1, 5, 4);
        seed(&mut grid, 6, 5, 4);
        seed(&mut grid, 4, 2, 4);

        let center = [4.2, 4.0];
        let top_down = ordered_seeds(&grid, &GraphParams::default(), center);
        assert_eq!(top_down, vec![[4, 5, 4], [6, 5, 4], [1, 5, 4], [4, 2, 4]]);

        let params = GraphParams {
            bottom_up: true,
            reverse_within_layer: true,
            ..Default::default()
        };
        let bottom_up = ordered_seeds(&grid, &params, center);
        assert_eq!(bottom_up, vec![[4, 2, 4], [1, 5, 4], [6, 5, 4], [4, 5, 4]]);
    }

    #[test]
    fn test_deterministic() {
        let build = || {
            let (mut grid, sdf) = setup([11, 8, 11], |_, _, _| 5.0);
            for i in 3..8 {
                for k in 3..8 {
                    seed(&mut grid, i, 5, k);
                }
            }
            run(&mut grid, &sdf, &GraphParams::default()).graph.canonical_hash()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_cancel_before_first_seed() {
        let (mut grid, sdf) = setup([7, 8, 7], |_, _, _| 5.0);
        seed(&mut grid, 3, 4, 3);
        let callback: ProgressCallback = Box::new(|_| false);
        let tracker = ProgressTracker::new(0);
        let out = build_support_graph(
            &mut grid,
            &sdf,
            &GraphParams::default(),
            [3.5, 3.5],
            CancelCheck::new(&tracker, Some(&callback)),
        );
        assert!(out.is_none());
        assert_eq!(grid.state(3, 0, 3), CellState::Empty);
    }
}
