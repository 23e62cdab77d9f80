//! Overhang voxelization.
//!
//! Marks the voxels crossed by downward-facing triangles as support seeds.
//! The grid frame is shared by both strategies: it covers the mesh bounds
//! plus a two-cell border in x/z, and is shifted half a cell down so the
//! centres of layer 0 lie exactly on the bed.

use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use mesh_core::Mesh;

use crate::cancel::CancelCheck;
use crate::error::{SupportError, SupportResult};
use crate::field::grid::{DenseGrid3, GridFrame};
use crate::params::GridParams;

/// Cells of border added around the mesh in x and z.
pub const BORDER_CELLS: usize = 2;

/// Triangles processed between cancellation polls.
const POLL_INTERVAL: usize = 100;

/// State of one voxel during support synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CellState {
    #[default]
    Empty,
    /// Voxel on an overhanging surface.
    TipTop,
    /// One layer below a tip; where a strut attaches.
    TipBase,
    /// Occupied by support.
    Used,
    /// Support column that ran into the model.
    Absorbed,
    /// Support that reached the bed.
    Ground,
}

impl CellState {
    /// Already part of built structure.
    #[inline]
    pub fn is_claimed(self) -> bool {
        matches!(self, CellState::Used | CellState::Ground)
    }

    #[inline]
    pub fn is_seed(self) -> bool {
        matches!(self, CellState::TipTop | CellState::TipBase)
    }

    /// Counts as solid in the block support volume.
    #[inline]
    pub fn is_block_solid(self) -> bool {
        matches!(
            self,
            CellState::TipTop | CellState::TipBase | CellState::Used | CellState::Absorbed
        )
    }
}

/// Which seed cells to emit for each overhang voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedMode {
    /// Only the voxel on the surface (block strategy).
    TipOnly,
    /// The surface voxel plus the strut attachment one layer below (graph
    /// strategy). On layer 0 only the attachment is emitted.
    TipAndBase,
}

/// Per-voxel state over the support frame.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub frame: GridFrame,
    pub cells: DenseGrid3<CellState>,
    pub ground_y: f64,
}

impl VoxelGrid {
    pub fn new(frame: GridFrame, ground_y: f64) -> Self {
        Self {
            cells: DenseGrid3::new(frame.dims, CellState::Empty),
            frame,
            ground_y,
        }
    }

    #[inline]
    pub fn state(&self, i: usize, j: usize, k: usize) -> CellState {
        *self.cells.get(i, j, k)
    }

    pub fn count(&self, state: CellState) -> usize {
        self.cells.as_slice().iter().filter(|&&s| s == state).count()
    }
}

/// Counts gathered while voxelizing.
#[derive(Debug, Clone, Default)]
pub struct OverhangStats {
    pub faces_scanned: usize,
    pub overhang_faces: usize,
    pub tip_cells: usize,
    pub base_cells: usize,
}

/// Output of [`voxelize_overhangs`].
#[derive(Debug, Clone)]
pub struct OverhangVoxels {
    pub grid: VoxelGrid,
    pub stats: OverhangStats,
}

/// A face overhangs when its normal points down by more than the threshold.
///
/// `overhang_cos` is the cosine of the overhang angle; comparing cosines
/// avoids `acos` and stays stable near 0 and 90 degrees.
#[inline]
pub fn is_overhang(normal: &Vector3<f64>, overhang_cos: f64) -> bool {
    -normal.y > overhang_cos
}

/// Compute the support frame for a mesh.
///
/// Fails with [`SupportError::EmptyMesh`] for a mesh without bounds and with
/// [`SupportError::GridTooLarge`] before anything is allocated.
pub fn support_frame(mesh: &Mesh, params: &GridParams) -> SupportResult<GridFrame> {
    let (min, max) = mesh.bounds().ok_or(SupportError::EmptyMesh)?;
    let extent = max - min;
    let cell = params.resolve_cell_size(extent.x.max(extent.y).max(extent.z));
    let ground_y = params.ground_y();
    let border = BORDER_CELLS as f64 * cell;

    let origin = Point3::new(min.x - border, ground_y - 0.5 * cell, min.z - border);
    let top = max.y + cell;

    let dims = [
        (extent.x / cell).ceil() as usize + 2 * BORDER_CELLS + 1,
        (((top - origin.y) / cell).ceil().max(0.0) as usize).max(2),
        (extent.z / cell).ceil() as usize + 2 * BORDER_CELLS + 1,
    ];

    GridFrame::new(origin, cell, dims, params.max_voxels)
}

/// Mark support seeds for every overhanging triangle.
///
/// Returns `None` if cancelled.
pub fn voxelize_overhangs(
    mesh: &Mesh,
    frame: &GridFrame,
    params: &GridParams,
    mode: SeedMode,
    check: CancelCheck<'_>,
) -> Option<OverhangVoxels> {
    let mut grid = VoxelGrid::new(*frame, params.ground_y());
    let mut stats = OverhangStats::default();
    let overhang_cos = params.overhang_cos();
    let cell = frame.cell_size;
    let half_cell = 0.5 * cell;

    info!(
        faces = mesh.face_count(),
        dims = ?frame.dims,
        cell_size = cell,
        angle_deg = params.overhang_angle_deg,
        "Voxelizing overhangs"
    );

    check.begin(mesh.face_count() as u64);

    for face in 0..mesh.face_count() {
        if face % POLL_INTERVAL == 0 {
            check.advance(face.min(POLL_INTERVAL) as u64);
            if !check.keep_going("voxelizing overhangs") {
                debug!(face, "Voxelization cancelled");
                return None;
            }
        }
        stats.faces_scanned += 1;

        let Some(tri) = mesh.triangle(face) else {
            continue;
        };
        let Some(normal) = tri.normal() else {
            continue;
        };
        if !is_overhang(&normal, overhang_cos) {
            continue;
        }
        stats.overhang_faces += 1;

        let (lo, hi) = tri.bounds();
        let range = |axis: usize| frame.clamped_index(lo[axis], axis)..=frame.clamped_index(hi[axis], axis);

        for k in range(2) {
            for j in range(1) {
                for i in range(0) {
                    let center = frame.cell_center(i, j, k);
                    if tri.distance_to_point(&center) >= half_cell {
                        continue;
                    }
                    mark_seed(&mut grid.cells, i, j, k, mode);
                }
            }
        }
    }

    stats.tip_cells = grid.count(CellState::TipTop);
    stats.base_cells = grid.count(CellState::TipBase);

    info!(
        overhang_faces = stats.overhang_faces,
        tip_cells = stats.tip_cells,
        base_cells = stats.base_cells,
        "Overhang voxelization complete"
    );

    Some(OverhangVoxels { grid, stats })
}

fn mark_seed(cells: &mut DenseGrid3<CellState>, i: usize, j: usize, k: usize, mode: SeedMode) {
    match mode {
        SeedMode::TipOnly => cells[[i, j, k]] = CellState::TipTop,
        SeedMode::TipAndBase if j == 0 => {
            if cells[[i, 0, k]] == CellState::Empty {
                cells[[i, 0, k]] = CellState::TipBase;
            }
        }
        SeedMode::TipAndBase => {
            // A tip always wins over an attachment written by another face
            cells[[i, j, k]] = CellState::TipTop;
            if cells[[i, j - 1, k]] == CellState::Empty {
                cells[[i, j - 1, k]] = CellState::TipBase;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mesh_core::{ProgressCallback, ProgressTracker, Vertex};

    /// A flat square facing down at `height`, spanning [-half, half] in x/z.
    pub(crate) fn make_down_square(height: f64, half: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(-half, height, -half));
        mesh.vertices.push(Vertex::from_coords(half, height, -half));
        mesh.vertices.push(Vertex::from_coords(half, height, half));
        mesh.vertices.push(Vertex::from_coords(-half, height, half));
        // Clockwise seen from above, so the normal points down
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 2, 3]);
        mesh
    }

    fn params(cell: f64) -> GridParams {
        GridParams {
            cell_size: Some(cell),
            ..Default::default()
        }
    }

    fn run(mesh: &Mesh, p: &GridParams, mode: SeedMode) -> OverhangVoxels {
        let frame = support_frame(mesh, p).unwrap();
        let tracker = ProgressTracker::new(0);
        voxelize_overhangs(mesh, &frame, p, mode, CancelCheck::new(&tracker, None)).unwrap()
    }

    #[test]
    fn test_is_overhang_threshold() {
        let cos30 = 30.0_f64.to_radians().cos();
        assert!(is_overhang(&Vector3::new(0.0, -1.0, 0.0), cos30));
        assert!(!is_overhang(&Vector3::new(0.0, 1.0, 0.0), cos30));
        assert!(!is_overhang(&Vector3::new(1.0, 0.0, 0.0), cos30));

        let tilted = |deg: f64| {
            let r = deg.to_radians();
            Vector3::new(r.sin(), -r.cos(), 0.0)
        };
        assert!(is_overhang(&tilted(20.0), cos30));
        assert!(!is_overhang(&tilted(40.0), cos30));
    }

    #[test]
    fn test_support_frame_layout() {
        let mesh = make_down_square(5.0, 2.0);
        let frame = support_frame(&mesh, &params(0.5)).unwrap();

        // Layer 0 centres lie on the bed
        assert_eq!(frame.cell_center(0, 0, 0).y, 0.0);
        assert_eq!(frame.origin.x, -2.0 - 1.0);
        assert_eq!(frame.dims[0], 8 + 5);
        assert!(frame.bounds().max.y >= 5.5);
    }

    #[test]
    fn test_support_frame_rejects_empty_and_huge() {
        assert!(matches!(
            support_frame(&Mesh::new(), &GridParams::default()),
            Err(SupportError::EmptyMesh)
        ));

        let tiny = GridParams {
            cell_size: Some(0.001),
            max_voxels: 1000,
            ..Default::default()
        };
        assert!(matches!(
            support_frame(&make_down_square(5.0, 2.0), &tiny),
            Err(SupportError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_down_square_seeds_one_layer() {
        let mesh = make_down_square(5.0, 2.0);
        let out = run(&mesh, &params(0.5), SeedMode::TipAndBase);
        let frame = out.grid.frame;
        let layer = frame.cell_of(&Point3::new(0.0, 5.0, 0.0)).unwrap()[1];

        assert_eq!(out.stats.overhang_faces, 2);
        assert!(out.stats.tip_cells >= 64);
        assert_eq!(out.stats.tip_cells, out.stats.base_cells);

        let c = frame.cell_of(&Point3::new(0.1, 5.0, 0.1)).unwrap();
        assert_eq!(out.grid.state(c[0], layer, c[2]), CellState::TipTop);
        assert_eq!(out.grid.state(c[0], layer - 1, c[2]), CellState::TipBase);
        assert_eq!(out.grid.state(c[0], layer - 2, c[2]), CellState::Empty);
    }

    #[test]
    fn test_tip_only_mode() {
        let mesh = make_down_square(5.0, 2.0);
        let out = run(&mesh, &params(0.5), SeedMode::TipOnly);
        assert_eq!(out.stats.base_cells, 0);
        assert!(out.stats.tip_cells > 0);
    }

    #[test]
    fn test_upward_face_ignored() {
        let mut mesh = make_down_square(5.0, 2.0);
        for f in &mut mesh.faces {
            f.swap(1, 2);
        }
        let out = run(&mesh, &params(0.5), SeedMode::TipAndBase);
        assert_eq!(out.stats.overhang_faces, 0);
        assert_eq!(out.stats.tip_cells, 0);
    }

    #[test]
    fn test_bottom_layer_emits_base_only() {
        let mesh = make_down_square(0.0, 1.0);
        let out = run(&mesh, &params(0.5), SeedMode::TipAndBase);
        assert_eq!(out.stats.tip_cells, 0);
        assert!(out.stats.base_cells > 0);
    }

    #[test]
    fn test_cancel_on_first_poll() {
        let mesh = make_down_square(5.0, 2.0);
        let p = params(0.5);
        let frame = support_frame(&mesh, &p).unwrap();
        let callback: ProgressCallback = Box::new(|_| false);
        let tracker = ProgressTracker::new(0);
        let out = voxelize_overhangs(
            &mesh,
            &frame,
            &p,
            SeedMode::TipAndBase,
            CancelCheck::new(&tracker, Some(&callback)),
        );
        assert!(out.is_none());
    }
}
