//! Top-level support generation for both strategies.
//!
//! Each call owns its voxel grid, distance field and (for the graph path)
//! support graph; the input mesh is only read. Cancellation through the
//! progress callback is not an error: the result comes back with
//! `cancelled == true` and no mesh.

use std::time::Instant;

use nalgebra::Point3;
use tracing::{info, warn};

use mesh_core::{
    Mesh, MeshSpatial, OperationTimer, PhaseTimer, ProgressCallback, ProgressTracker,
    log_mesh_stats, validate_mesh,
};

use crate::block::build_block_support;
use crate::cancel::CancelCheck;
use crate::error::{SupportError, SupportResult};
use crate::field::distance::{DistanceField, DistanceOptions};
use crate::field::grid::GridFrame;
use crate::graph::{SnapStats, SupportGraph, build_support_graph, snap_tips};
use crate::optimize::{OptimizeStats, optimize_graph};
use crate::params::{BlockParams, GraphParams};
use crate::tube::mesh_tubes;
use crate::voxelize::{SeedMode, support_frame, voxelize_overhangs};

/// Width of the exact band of the distance field, in cells.
const DISTANCE_BAND_CELLS: f64 = 2.0;

/// Statistics from [`generate_block_support`].
#[derive(Debug, Clone, Default)]
pub struct BlockSupportStats {
    pub grid_dims: [usize; 3],
    pub cell_size: f64,
    pub overhang_faces: usize,
    pub seed_cells: usize,
    pub support_cells: usize,
    pub absorbed_cells: usize,
    pub output_vertices: usize,
    pub output_faces: usize,
    pub voxelize_ms: f64,
    pub distance_ms: f64,
    pub mesh_ms: f64,
    pub total_ms: f64,
}

/// Result of [`generate_block_support`].
#[derive(Debug, Clone)]
pub struct BlockSupportResult {
    /// `None` when cancelled.
    pub mesh: Option<Mesh>,
    pub stats: BlockSupportStats,
    pub cancelled: bool,
}

impl BlockSupportResult {
    fn cancelled(mut stats: BlockSupportStats, start: Instant) -> Self {
        stats.total_ms = elapsed_ms(start);
        info!("Block support generation cancelled");
        Self {
            mesh: None,
            stats,
            cancelled: true,
        }
    }
}

/// Statistics from [`generate_graph_support`].
#[derive(Debug, Clone, Default)]
pub struct GraphSupportStats {
    pub grid_dims: [usize; 3],
    pub cell_size: f64,
    pub overhang_faces: usize,
    pub seeds: usize,
    pub vertices: usize,
    pub edges: usize,
    pub tips: usize,
    pub grounds: usize,
    /// Searches that could not reach the bed or existing support.
    pub search_fallbacks: usize,
    pub snap: SnapStats,
    /// `None` when optimization is disabled.
    pub optimize: Option<OptimizeStats>,
    pub output_vertices: usize,
    pub output_faces: usize,
    pub voxelize_ms: f64,
    pub distance_ms: f64,
    pub search_ms: f64,
    pub optimize_ms: f64,
    pub mesh_ms: f64,
    pub total_ms: f64,
}

/// Result of [`generate_graph_support`].
#[derive(Debug, Clone)]
pub struct GraphSupportResult {
    /// `None` when cancelled.
    pub mesh: Option<Mesh>,
    /// The optimized support graph, `None` when cancelled.
    pub graph: Option<SupportGraph>,
    pub stats: GraphSupportStats,
    pub cancelled: bool,
}

impl GraphSupportResult {
    fn cancelled(mut stats: GraphSupportStats, start: Instant) -> Self {
        stats.total_ms = elapsed_ms(start);
        info!("Graph support generation cancelled");
        Self {
            mesh: None,
            graph: None,
            stats,
            cancelled: true,
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Reject meshes that cannot be supported before anything is allocated.
fn check_input(mesh: &Mesh) -> SupportResult<()> {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(SupportError::empty_mesh());
    }
    validate_mesh(mesh)?;
    Ok(())
}

fn distance_options(frame: &GridFrame) -> DistanceOptions {
    DistanceOptions {
        band_width: DISTANCE_BAND_CELLS * frame.cell_size,
        signed: true,
    }
}

/// Generate solid block supports under every overhang of `mesh`.
///
/// # Errors
///
/// Fails for an empty or malformed mesh, invalid parameters, or a grid over
/// the voxel budget. Cancellation is reported through
/// [`BlockSupportResult::cancelled`].
///
/// # Example
///
/// ```ignore
/// use mesh_support::{BlockParams, generate_block_support};
///
/// let result = generate_block_support(&mesh, &BlockParams::default(), None)?;
/// if let Some(support) = result.mesh {
///     println!("{} support faces", support.face_count());
/// }
/// ```
pub fn generate_block_support(
    mesh: &Mesh,
    params: &BlockParams,
    callback: Option<&ProgressCallback>,
) -> SupportResult<BlockSupportResult> {
    let _timer =
        OperationTimer::with_context("generate_block_support", mesh.face_count(), mesh.vertex_count());
    let start = Instant::now();

    check_input(mesh)?;
    params.validate()?;
    log_mesh_stats(mesh, "support input");

    let frame = support_frame(mesh, &params.grid)?;
    let mut stats = BlockSupportStats {
        grid_dims: frame.dims,
        cell_size: frame.cell_size,
        ..Default::default()
    };

    info!(
        dims = ?frame.dims,
        cell_size = frame.cell_size,
        subtract_model = params.subtract_model,
        "Generating block support"
    );

    let tracker = ProgressTracker::new(0);
    let check = CancelCheck::new(&tracker, callback);

    let phase = PhaseTimer::start("voxelize");
    let Some(voxels) = voxelize_overhangs(mesh, &frame, &params.grid, SeedMode::TipOnly, check)
    else {
        return Ok(BlockSupportResult::cancelled(stats, start));
    };
    stats.voxelize_ms = phase.finish();
    stats.overhang_faces = voxels.stats.overhang_faces;
    stats.seed_cells = voxels.stats.tip_cells;

    let phase = PhaseTimer::start("distance_field");
    let Some(sdf) = DistanceField::build(mesh, &frame, distance_options(&frame), check)? else {
        return Ok(BlockSupportResult::cancelled(stats, start));
    };
    stats.distance_ms = phase.finish();

    let phase = PhaseTimer::start("block_mesh");
    let mut grid = voxels.grid;
    let Some(output) = build_block_support(&mut grid, &sdf, params, check)? else {
        return Ok(BlockSupportResult::cancelled(stats, start));
    };
    stats.mesh_ms = phase.finish();
    log_mesh_stats(&output.mesh, "block support");
    stats.support_cells = output.fill.support_cells;
    stats.absorbed_cells = output.fill.absorbed_cells;
    stats.output_vertices = output.mesh.vertex_count();
    stats.output_faces = output.mesh.face_count();
    stats.total_ms = elapsed_ms(start);

    info!(
        seeds = stats.seed_cells,
        support_cells = stats.support_cells,
        faces = stats.output_faces,
        total_ms = stats.total_ms,
        "Block support complete"
    );

    Ok(BlockSupportResult {
        mesh: Some(output.mesh),
        stats,
        cancelled: false,
    })
}

/// Generate branching tree supports under every overhang of `mesh`.
///
/// # Errors
///
/// Fails for an empty or malformed mesh, invalid parameters, or a grid over
/// the voxel budget. Search dead-ends and tips that cannot be snapped are
/// counted in the statistics, not reported as errors.
///
/// # Example
///
/// ```ignore
/// use mesh_support::{GraphParams, generate_graph_support};
///
/// let result = generate_graph_support(&mesh, &GraphParams::default(), None)?;
/// let graph = result.graph.unwrap();
/// println!("{} tips, {} feet", graph.tips().len(), graph.grounds().len());
/// ```
pub fn generate_graph_support(
    mesh: &Mesh,
    params: &GraphParams,
    callback: Option<&ProgressCallback>,
) -> SupportResult<GraphSupportResult> {
    let _timer =
        OperationTimer::with_context("generate_graph_support", mesh.face_count(), mesh.vertex_count());
    let start = Instant::now();

    check_input(mesh)?;
    params.validate()?;
    log_mesh_stats(mesh, "support input");

    let frame = support_frame(mesh, &params.grid)?;
    let ground_y = params.grid.ground_y();
    let plan_center = match params.plan_center {
        Some(center) => center,
        None => {
            let (min, max) = mesh.bounds().ok_or(SupportError::EmptyMesh)?;
            let c = Point3::from((min.coords + max.coords) * 0.5);
            [c.x, c.z]
        }
    };

    let mut stats = GraphSupportStats {
        grid_dims: frame.dims,
        cell_size: frame.cell_size,
        ..Default::default()
    };

    info!(
        dims = ?frame.dims,
        cell_size = frame.cell_size,
        plan_center = ?plan_center,
        bottom_up = params.bottom_up,
        "Generating graph support"
    );

    let tracker = ProgressTracker::new(0);
    let check = CancelCheck::new(&tracker, callback);

    let phase = PhaseTimer::start("voxelize");
    let Some(voxels) = voxelize_overhangs(mesh, &frame, &params.grid, SeedMode::TipAndBase, check)
    else {
        return Ok(GraphSupportResult::cancelled(stats, start));
    };
    stats.voxelize_ms = phase.finish();
    stats.overhang_faces = voxels.stats.overhang_faces;

    let phase = PhaseTimer::start("distance_field");
    let Some(sdf) = DistanceField::build(mesh, &frame, distance_options(&frame), check)? else {
        return Ok(GraphSupportResult::cancelled(stats, start));
    };
    let spatial = MeshSpatial::build(mesh)?;
    stats.distance_ms = phase.finish();

    let phase = PhaseTimer::start("graph_search");
    let mut grid = voxels.grid;
    let Some(built) = build_support_graph(&mut grid, &sdf, params, plan_center, check) else {
        return Ok(GraphSupportResult::cancelled(stats, start));
    };
    let mut graph = built.graph;
    stats.seeds = built.stats.seeds;
    stats.search_fallbacks = built.stats.fallbacks;
    if built.stats.fallbacks > 0 {
        warn!(
            fallbacks = built.stats.fallbacks,
            "Some branches could not reach the bed"
        );
    }

    stats.snap = snap_tips(&mut graph, &spatial, frame.cell_size);
    stats.search_ms = phase.finish();

    let phase = PhaseTimer::start("optimize");
    if params.optimize && params.optimize_rounds > 0 {
        let Some(optimized) = optimize_graph(&mut graph, &sdf, &spatial, params, check) else {
            return Ok(GraphSupportResult::cancelled(stats, start));
        };
        stats.optimize = Some(optimized);
    }
    stats.optimize_ms = phase.finish();

    if !check.keep_going("meshing support tubes") {
        return Ok(GraphSupportResult::cancelled(stats, start));
    }

    let phase = PhaseTimer::start("tube_mesh");
    let support = mesh_tubes(&graph, params, ground_y)?;
    stats.mesh_ms = phase.finish();

    log_mesh_stats(&support, "graph support");
    stats.vertices = graph.vertex_count();
    stats.edges = graph.edge_count();
    stats.tips = graph.tips().len();
    stats.grounds = graph.grounds().len();
    stats.output_vertices = support.vertex_count();
    stats.output_faces = support.face_count();
    stats.total_ms = elapsed_ms(start);

    info!(
        seeds = stats.seeds,
        vertices = stats.vertices,
        edges = stats.edges,
        grounds = stats.grounds,
        unsnapped = stats.snap.unsnapped,
        faces = stats.output_faces,
        total_ms = stats.total_ms,
        "Graph support complete"
    );

    Ok(GraphSupportResult {
        mesh: Some(support),
        graph: Some(graph),
        stats,
        cancelled: false,
    })
}
