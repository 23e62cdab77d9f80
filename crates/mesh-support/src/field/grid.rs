//! Dense voxel grids and their world-space frame.

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{SupportError, SupportResult};
use crate::field::implicit::Aabb;

/// Placement of a dense grid in world space.
///
/// Cell `(i, j, k)` spans `origin + [i, i+1) * cell_size` on each axis and its
/// centre is the sample point for per-cell values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridFrame {
    /// Min corner of cell (0, 0, 0).
    pub origin: Point3<f64>,
    /// Uniform cell edge length.
    pub cell_size: f64,
    /// Number of cells along x, y, z.
    pub dims: [usize; 3],
}

impl GridFrame {
    /// Create a frame, failing if it would exceed `max_voxels`.
    pub fn new(
        origin: Point3<f64>,
        cell_size: f64,
        dims: [usize; 3],
        max_voxels: usize,
    ) -> SupportResult<Self> {
        let total = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .unwrap_or(usize::MAX);
        if total > max_voxels {
            return Err(SupportError::grid_too_large(dims, max_voxels));
        }
        Ok(Self {
            origin,
            cell_size,
            dims,
        })
    }

    /// Smallest frame with `cell_size` cells covering `bounds`.
    pub fn covering(bounds: &Aabb, cell_size: f64, max_voxels: usize) -> SupportResult<Self> {
        let extent = bounds.extent();
        let dims = [
            ((extent.x / cell_size).ceil() as usize).max(1),
            ((extent.y / cell_size).ceil() as usize).max(1),
            ((extent.z / cell_size).ceil() as usize).max(1),
        ];
        debug!(dims = ?dims, cell_size, "Grid frame covering bounds");
        Self::new(bounds.min, cell_size, dims, max_voxels)
    }

    /// Total number of cells.
    #[inline]
    pub fn total(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// World position of a cell centre.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(
            self.origin.x + (i as f64 + 0.5) * self.cell_size,
            self.origin.y + (j as f64 + 0.5) * self.cell_size,
            self.origin.z + (k as f64 + 0.5) * self.cell_size,
        )
    }

    /// Continuous grid coordinates of `p`, measured so that integer values
    /// land on cell centres.
    #[inline]
    pub fn to_grid(&self, p: &Point3<f64>) -> Vector3<f64> {
        (p - self.origin) / self.cell_size - Vector3::repeat(0.5)
    }

    /// Integer cell containing `p`, or `None` outside the grid.
    pub fn cell_of(&self, p: &Point3<f64>) -> Option<[usize; 3]> {
        let rel = (p - self.origin) / self.cell_size;
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let c = rel[axis].floor();
            if !(c >= 0.0 && c < self.dims[axis] as f64) {
                return None;
            }
            cell[axis] = c as usize;
        }
        Some(cell)
    }

    /// Cell index of `v` along `axis`, clamped into the grid.
    pub fn clamped_index(&self, v: f64, axis: usize) -> usize {
        let c = ((v - self.origin[axis]) / self.cell_size).floor();
        if c <= 0.0 {
            0
        } else {
            (c as usize).min(self.dims[axis] - 1)
        }
    }

    /// Bounds of the whole grid.
    pub fn bounds(&self) -> Aabb {
        let max = Point3::new(
            self.origin.x + self.dims[0] as f64 * self.cell_size,
            self.origin.y + self.dims[1] as f64 * self.cell_size,
            self.origin.z + self.dims[2] as f64 * self.cell_size,
        );
        Aabb::new(self.origin, max)
    }
}

/// A dense 3D array indexed `(i, j, k)` with x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrid3<T> {
    dims: [usize; 3],
    data: Vec<T>,
}

impl<T: Clone> DenseGrid3<T> {
    pub fn new(dims: [usize; 3], fill: T) -> Self {
        Self {
            dims,
            data: vec![fill; dims[0] * dims[1] * dims[2]],
        }
    }

    /// Wrap existing x-fastest data. Returns `None` on a length mismatch.
    pub fn from_vec(dims: [usize; 3], data: Vec<T>) -> Option<Self> {
        (data.len() == dims[0] * dims[1] * dims[2]).then_some(Self { dims, data })
    }

    /// Change dimensions and reset every cell to `fill`.
    pub fn resize(&mut self, dims: [usize; 3], fill: T) {
        self.dims = dims;
        self.data.clear();
        self.data.resize(dims[0] * dims[1] * dims[2], fill);
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Extract the horizontal slice at height `j`, indexed `(i, k)`.
    pub fn layer(&self, j: usize) -> DenseGrid2<T> {
        let [ni, _, nk] = self.dims;
        let mut out = Vec::with_capacity(ni * nk);
        for k in 0..nk {
            for i in 0..ni {
                out.push(self.data[self.linearize(i, j, k)].clone());
            }
        }
        DenseGrid2 {
            dims: [ni, nk],
            data: out,
        }
    }
}

impl<T> DenseGrid3<T> {
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn linearize(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.dims[0] + k * self.dims[0] * self.dims[1]
    }

    #[inline]
    pub fn delinearize(&self, idx: usize) -> [usize; 3] {
        let plane = self.dims[0] * self.dims[1];
        let k = idx / plane;
        let rem = idx % plane;
        [rem % self.dims[0], rem / self.dims[0], k]
    }

    #[inline]
    pub fn in_bounds(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.dims[0] && j < self.dims[1] && k < self.dims[2]
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.linearize(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.linearize(i, j, k);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Exchange contents (and dimensions) with another grid.
    pub fn swap(&mut self, other: &mut DenseGrid3<T>) {
        std::mem::swap(self, other);
    }

    /// Map every cell into a new grid of the same shape.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> DenseGrid3<U> {
        DenseGrid3 {
            dims: self.dims,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T> std::ops::Index<[usize; 3]> for DenseGrid3<T> {
    type Output = T;

    fn index(&self, [i, j, k]: [usize; 3]) -> &T {
        &self.data[self.linearize(i, j, k)]
    }
}

impl<T> std::ops::IndexMut<[usize; 3]> for DenseGrid3<T> {
    fn index_mut(&mut self, [i, j, k]: [usize; 3]) -> &mut T {
        let idx = self.linearize(i, j, k);
        &mut self.data[idx]
    }
}

/// A dense 2D array indexed `(i, k)` with i varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrid2<T> {
    dims: [usize; 2],
    data: Vec<T>,
}

impl<T: Clone> DenseGrid2<T> {
    pub fn new(dims: [usize; 2], fill: T) -> Self {
        Self {
            dims,
            data: vec![fill; dims[0] * dims[1]],
        }
    }
}

impl<T> DenseGrid2<T> {
    #[inline]
    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    #[inline]
    pub fn get(&self, i: usize, k: usize) -> &T {
        &self.data[i + k * self.dims[0]]
    }

    #[inline]
    pub fn set(&mut self, i: usize, k: usize, value: T) {
        self.data[i + k * self.dims[0]] = value;
    }

    /// Iterate `((i, k), value)` in scan order: k outer, i inner.
    pub fn iter_indexed(&self) -> impl Iterator<Item = ((usize, usize), &T)> + '_ {
        let ni = self.dims[0];
        self.data
            .iter()
            .enumerate()
            .map(move |(idx, v)| ((idx % ni, idx / ni), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_frame_rejects_oversized_grid() {
        let err = GridFrame::new(Point3::origin(), 1.0, [100, 100, 100], 1000).unwrap_err();
        assert!(matches!(err, SupportError::GridTooLarge { total: 1_000_000, .. }));
    }

    #[test]
    fn test_frame_mapping() {
        let frame = GridFrame::new(Point3::new(-1.0, 0.0, 2.0), 0.5, [4, 4, 4], 1000).unwrap();
        let c = frame.cell_center(1, 2, 3);
        assert_relative_eq!(c, Point3::new(-0.25, 1.25, 3.75));
        assert_eq!(frame.cell_of(&c), Some([1, 2, 3]));

        let g = frame.to_grid(&c);
        assert_relative_eq!(g, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);

        assert_eq!(frame.cell_of(&Point3::new(-2.0, 0.0, 2.0)), None);
        assert_eq!(frame.clamped_index(100.0, 0), 3);
        assert_eq!(frame.clamped_index(-100.0, 0), 0);
        assert_relative_eq!(frame.bounds().max, Point3::new(1.0, 2.0, 4.0));
    }

    #[test]
    fn test_covering_frame() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.1, 1.0, 0.0));
        let frame = GridFrame::covering(&bounds, 0.5, 1000).unwrap();
        assert_eq!(frame.dims, [5, 2, 1]);
    }

    #[test]
    fn test_dense_grid_indexing() {
        let mut grid = DenseGrid3::new([3, 4, 5], 0u8);
        grid.set(2, 3, 4, 7);
        grid[[1, 1, 1]] = 9;
        assert_eq!(*grid.get(2, 3, 4), 7);
        assert_eq!(grid[[1, 1, 1]], 9);
        assert_eq!(grid.delinearize(grid.linearize(2, 3, 4)), [2, 3, 4]);
        assert!(!grid.in_bounds(3, 0, 0));

        let layer = grid.layer(1);
        assert_eq!(layer.dims(), [3, 5]);
        assert_eq!(*layer.get(1, 1), 9);
        let hits: Vec<_> = layer.iter_indexed().filter(|(_, v)| **v != 0).collect();
        assert_eq!(hits, vec![((1, 1), &9)]);
    }

    #[test]
    fn test_resize_fill_swap() {
        let mut a = DenseGrid3::new([2, 2, 2], 1.0f32);
        let mut b = DenseGrid3::new([1, 1, 1], 5.0f32);
        a.swap(&mut b);
        assert_eq!(a.dims(), [1, 1, 1]);
        assert_eq!(b.len(), 8);

        b.fill(2.0);
        assert!(b.as_slice().iter().all(|&v| v == 2.0));
        b.resize([3, 1, 1], -1.0);
        assert_eq!(b.as_slice(), &[-1.0, -1.0, -1.0]);

        assert!(DenseGrid3::from_vec([2, 1, 1], vec![0; 3]).is_none());
        let doubled = DenseGrid3::from_vec([2, 1, 1], vec![1, 2]).unwrap().map(|v| v * 2);
        assert_eq!(doubled.as_slice(), &[2, 4]);
    }
}
