//! Distance field to the model surface, sampled at voxel centres.

use std::time::Instant;

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info};

use mesh_core::Mesh;

use crate::cancel::CancelCheck;
use crate::error::{SupportError, SupportResult};
use crate::field::grid::{DenseGrid3, GridFrame};
use crate::field::implicit::{Aabb, Implicit, trilinear};

/// Value reported for points outside the sampled frame.
pub const FAR_DISTANCE: f64 = 1.0e6;

/// How to build a [`DistanceField`].
#[derive(Debug, Clone, Copy)]
pub struct DistanceOptions {
    /// Width of the band around the surface where distances must be exact.
    /// Recorded for callers; every sample is computed exactly.
    pub band_width: f64,
    /// Negative inside the model when true, absolute distance otherwise.
    pub signed: bool,
}

impl Default for DistanceOptions {
    fn default() -> Self {
        Self {
            band_width: 2.0,
            signed: true,
        }
    }
}

/// Read-only distance field over a [`GridFrame`].
#[derive(Debug, Clone)]
pub struct DistanceField {
    frame: GridFrame,
    values: DenseGrid3<f32>,
    options: DistanceOptions,
}

impl DistanceField {
    /// Compute the field for `mesh` at every cell centre of `frame`.
    ///
    /// Returns `Ok(None)` when cancellation is requested before or during the
    /// build.
    pub fn build(
        mesh: &Mesh,
        frame: &GridFrame,
        options: DistanceOptions,
        check: CancelCheck<'_>,
    ) -> SupportResult<Option<Self>> {
        use mesh_to_sdf::{Grid, SignMethod, Topology, generate_grid_sdf};

        if !check.keep_going("computing distance field") {
            return Ok(None);
        }

        let start = Instant::now();
        info!(
            dims = ?frame.dims,
            vertices = mesh.vertices.len(),
            signed = options.signed,
            "Computing distance field"
        );

        let vertices: Vec<[f32; 3]> = mesh
            .vertices
            .iter()
            .map(|v| {
                [
                    v.position.x as f32,
                    v.position.y as f32,
                    v.position.z as f32,
                ]
            })
            .collect();
        let indices: Vec<u32> = mesh.faces.iter().flat_map(|f| f.iter().copied()).collect();

        let max = frame.bounds().max;
        let grid = Grid::from_bounding_box(
            &[
                frame.origin.x as f32,
                frame.origin.y as f32,
                frame.origin.z as f32,
            ],
            &[max.x as f32, max.y as f32, max.z as f32],
            frame.dims,
        );

        let raw = generate_grid_sdf(
            &vertices,
            Topology::TriangleList(Some(&indices)),
            &grid,
            SignMethod::Raycast,
        );

        if raw.len() != frame.total() {
            return Err(SupportError::sdf_failed_with_grid(
                format!("expected {} samples, got {}", frame.total(), raw.len()),
                frame.dims,
            ));
        }

        // mesh_to_sdf orders samples with z fastest; re-pack with x fastest
        let [nx, ny, nz] = frame.dims;
        let signed = options.signed;
        let packed: Vec<f32> = (0..frame.total())
            .into_par_iter()
            .map(|idx| {
                let x = idx % nx;
                let y = (idx / nx) % ny;
                let z = idx / (nx * ny);
                let v = raw[z + y * nz + x * ny * nz];
                if signed { v } else { v.abs() }
            })
            .collect();

        let values = DenseGrid3::from_vec(frame.dims, packed).ok_or_else(|| {
            SupportError::sdf_failed_with_grid("sample layout mismatch", frame.dims)
        })?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            min = values.as_slice().iter().copied().fold(f32::INFINITY, f32::min),
            "Distance field computed"
        );

        if !check.keep_going("distance field complete") {
            return Ok(None);
        }

        Ok(Some(Self {
            frame: *frame,
            values,
            options,
        }))
    }

    /// Wrap precomputed cell-centre samples.
    pub fn from_samples(frame: GridFrame, values: DenseGrid3<f32>, options: DistanceOptions) -> Self {
        Self {
            frame,
            values,
            options,
        }
    }

    /// Continuous trilinear distance at `p`, [`FAR_DISTANCE`] outside the frame.
    #[inline]
    pub fn sample(&self, p: &Point3<f64>) -> f64 {
        trilinear(&self.frame, &self.values, p).unwrap_or(FAR_DISTANCE)
    }

    /// Sample stored for cell `(i, j, k)`.
    #[inline]
    pub fn cell_value(&self, i: usize, j: usize, k: usize) -> f64 {
        *self.values.get(i, j, k) as f64
    }

    pub fn frame(&self) -> &GridFrame {
        &self.frame
    }

    pub fn is_signed(&self) -> bool {
        self.options.signed
    }

    pub fn band_width(&self) -> f64 {
        self.options.band_width
    }
}

impl Implicit for DistanceField {
    fn value(&self, p: &Point3<f64>) -> f64 {
        self.sample(p)
    }

    fn bounds(&self) -> Aabb {
        self.frame.bounds()
    }
}
