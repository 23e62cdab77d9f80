//! Iso-surface extraction from an implicit field using Surface Nets.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use mesh_core::{Mesh, Vertex};

use crate::error::SupportResult;
use crate::field::grid::GridFrame;
use crate::field::implicit::{Aabb, Implicit};

/// Value written around the sampled block so the surface always closes.
const PAD_VALUE: f32 = 1000.0;

/// Bounds for extracting a support body: `body` grown by two cubes in x/z and
/// clipped two cubes below the bed.
pub fn support_extraction_bounds(body: &Aabb, cube_size: f64, ground_y: f64) -> Aabb {
    let pad = 2.0 * cube_size;
    let mut bounds = body.expand(pad);
    bounds.min.y = bounds.min.y.max(ground_y - pad);
    bounds
}

/// Extract the zero level set of `field` within `bounds`.
///
/// The field is sampled on a lattice of spacing `cube_size` anchored at
/// `bounds.min`. An empty result is returned as an empty mesh.
pub fn extract_isosurface<F: Implicit>(
    field: &F,
    bounds: &Aabb,
    cube_size: f64,
    max_voxels: usize,
) -> SupportResult<Mesh> {
    use fast_surface_nets::{SurfaceNetsBuffer, ndshape::RuntimeShape, surface_nets};

    // Sample corners, not centres: one more sample than cells per axis
    let cells = GridFrame::covering(bounds, cube_size, max_voxels)?;
    let dims = [cells.dims[0] + 1, cells.dims[1] + 1, cells.dims[2] + 1];
    let origin = bounds.min;

    info!(dims = ?dims, cube_size, "Extracting isosurface");

    let padded_dims = [dims[0] + 2, dims[1] + 2, dims[2] + 2];
    let plane = padded_dims[0] * padded_dims[1];
    let padded_size = plane * padded_dims[2];

    let mut padded = vec![PAD_VALUE; padded_size];
    padded
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(pz, slab)| {
            if pz == 0 || pz > dims[2] {
                return;
            }
            let z = origin.z + (pz - 1) as f64 * cube_size;
            for py in 1..=dims[1] {
                let y = origin.y + (py - 1) as f64 * cube_size;
                for px in 1..=dims[0] {
                    let x = origin.x + (px - 1) as f64 * cube_size;
                    let v = field.value(&nalgebra::Point3::new(x, y, z));
                    slab[px + py * padded_dims[0]] = v.clamp(-1.0e6, 1.0e6) as f32;
                }
            }
        });

    let shape = RuntimeShape::<u32, 3>::new([
        padded_dims[0] as u32,
        padded_dims[1] as u32,
        padded_dims[2] as u32,
    ]);

    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(
        &padded,
        &shape,
        [0, 0, 0],
        [
            padded_dims[0] as u32 - 1,
            padded_dims[1] as u32 - 1,
            padded_dims[2] as u32 - 1,
        ],
        &mut buffer,
    );

    if buffer.positions.is_empty() {
        warn!(dims = ?dims, "Isosurface is empty");
        return Ok(Mesh::new());
    }

    debug!(
        positions = buffer.positions.len(),
        indices = buffer.indices.len(),
        "Surface nets complete"
    );

    let mut mesh = Mesh::with_capacity(buffer.positions.len(), buffer.indices.len() / 3);
    for pos in &buffer.positions {
        // Undo the one-sample padding
        mesh.vertices.push(Vertex::from_coords(
            origin.x + (pos[0] as f64 - 1.0) * cube_size,
            origin.y + (pos[1] as f64 - 1.0) * cube_size,
            origin.z + (pos[2] as f64 - 1.0) * cube_size,
        ));
    }
    for tri in buffer.indices.chunks_exact(3) {
        mesh.faces.push([tri[0], tri[1], tri[2]]);
    }

    info!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        "Isosurface mesh created"
    );

    Ok(mesh)
}
