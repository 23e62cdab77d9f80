//! Solid block supports.
//!
//! Every voxel column below an overhang seed is filled down to the bed or
//! until it enters the model. The filled voxels become a trilinear field
//! that is optionally carved by the (grown) model, clipped at the bed and
//! iso-surfaced.

use tracing::{debug, info};

use mesh_core::Mesh;

use crate::cancel::CancelCheck;
use crate::error::SupportResult;
use crate::field::distance::DistanceField;
use crate::field::extract::{extract_isosurface, support_extraction_bounds};
use crate::field::implicit::{Difference, HalfSpace, Implicit, Offset, TrilinearImplicit};
use crate::params::BlockParams;
use crate::voxelize::{CellState, VoxelGrid};

/// Field value of solid block voxels.
const SOLID: f32 = -1.0;
/// Field value of empty voxels and of everything outside the grid.
const OPEN: f32 = 1.0;

/// Counts from the column fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFill {
    /// Voxels turned into support below a seed.
    pub support_cells: usize,
    /// Columns that ended inside the model.
    pub absorbed_cells: usize,
    /// Columns that contained at least one seed.
    pub columns: usize,
}

/// Fill every column top-down from its seeds.
///
/// Entering a seed starts support mode; each voxel below becomes `Used` until
/// the distance field says it lies inside the model, which marks it
/// `Absorbed` and ends support mode. A lower seed in the same column starts
/// support mode again.
pub fn fill_columns(grid: &mut VoxelGrid, sdf: &DistanceField) -> ColumnFill {
    let [ni, nj, nk] = grid.frame.dims;
    let mut fill = ColumnFill::default();

    for k in 0..nk {
        for i in 0..ni {
            let mut in_support = false;
            let mut seen_seed = false;
            for j in (0..nj).rev() {
                let state = grid.state(i, j, k);
                if state.is_seed() {
                    in_support = true;
                    seen_seed = true;
                    continue;
                }
                if !in_support {
                    continue;
                }
                if sdf.cell_value(i, j, k) < 0.0 {
                    grid.cells.set(i, j, k, CellState::Absorbed);
                    fill.absorbed_cells += 1;
                    in_support = false;
                } else {
                    grid.cells.set(i, j, k, CellState::Used);
                    fill.support_cells += 1;
                }
            }
            if seen_seed {
                fill.columns += 1;
            }
        }
    }

    debug!(
        columns = fill.columns,
        support_cells = fill.support_cells,
        absorbed = fill.absorbed_cells,
        "Column fill complete"
    );
    fill
}

/// The filled voxels as a continuous field, negative inside the block.
pub fn block_field(grid: &VoxelGrid) -> TrilinearImplicit {
    let values = grid
        .cells
        .map(|s| if s.is_block_solid() { SOLID } else { OPEN });
    TrilinearImplicit::new(grid.frame, values, OPEN as f64)
}

/// Output of [`build_block_support`].
#[derive(Debug)]
pub struct BlockOutput {
    pub mesh: Mesh,
    pub fill: ColumnFill,
}

/// Fill columns and mesh the result.
///
/// Returns `Ok(None)` if cancelled before extraction.
pub fn build_block_support(
    grid: &mut VoxelGrid,
    sdf: &DistanceField,
    params: &BlockParams,
    check: CancelCheck<'_>,
) -> SupportResult<Option<BlockOutput>> {
    let fill = fill_columns(grid, sdf);

    if fill.columns == 0 {
        info!("No overhangs to support, skipping extraction");
        return Ok(Some(BlockOutput {
            mesh: Mesh::new(),
            fill,
        }));
    }

    if !check.keep_going("extracting block support") {
        return Ok(None);
    }

    let block = block_field(grid);
    let cube = grid.frame.cell_size;
    let bounds = support_extraction_bounds(&block.bounds(), cube, grid.ground_y);
    let bed = HalfSpace::below(grid.ground_y);

    let body: Box<dyn Implicit + '_> = if params.subtract_model {
        Box::new(Difference::new(
            block,
            Offset::new(sdf, params.model_offset),
        ))
    } else {
        Box::new(block)
    };
    let clipped = Difference::new(body, bed);

    let mesh = extract_isosurface(&clipped, &bounds, cube, params.grid.max_voxels)?;

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        subtract_model = params.subtract_model,
        "Block support meshed"
    );

    Ok(Some(BlockOutput { mesh, fill }))
}
