//! Implicit-function algebra.
//!
//! Every field is negative inside the solid and positive outside, with the
//! surface at zero. Primitives are exact distance functions; combinators
//! (`Difference`, `Offset`) keep the sign convention but are only bounds on
//! distance.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::error::SupportResult;
use crate::field::grid::{DenseGrid3, GridFrame};

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// The box containing every point.
    pub fn infinite() -> Self {
        Self {
            min: Point3::from(Vector3::repeat(f64::NEG_INFINITY)),
            max: Point3::from(Vector3::repeat(f64::INFINITY)),
        }
    }

    /// Bounding box of a point set, or `None` when it is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(p),
            max: acc.max.sup(p),
        }))
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn intersection(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.sup(&other.min),
            max: self.max.inf(&other.max),
        }
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| !(self.min[a] <= self.max[a]))
    }
}

/// A scalar field over space with a bounding box outside of which the field is
/// known to be positive.
pub trait Implicit: Send + Sync {
    /// Field value at `p`. Negative inside.
    fn value(&self, p: &Point3<f64>) -> f64;

    /// Region containing the whole negative set.
    fn bounds(&self) -> Aabb;
}

impl<T: Implicit + ?Sized> Implicit for &T {
    fn value(&self, p: &Point3<f64>) -> f64 {
        (**self).value(p)
    }

    fn bounds(&self) -> Aabb {
        (**self).bounds()
    }
}

impl<T: Implicit + ?Sized> Implicit for Box<T> {
    fn value(&self, p: &Point3<f64>) -> f64 {
        (**self).value(p)
    }

    fn bounds(&self) -> Aabb {
        (**self).bounds()
    }
}

/// Rounded cylinder around the segment `a`-`b`.
#[derive(Debug, Clone, Copy)]
pub struct Capsule {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
    pub radius: f64,
}

impl Capsule {
    pub fn new(a: Point3<f64>, b: Point3<f64>, radius: f64) -> Self {
        Self { a, b, radius }
    }
}

impl Implicit for Capsule {
    fn value(&self, p: &Point3<f64>) -> f64 {
        point_segment_distance(p, &self.a, &self.b) - self.radius
    }

    fn bounds(&self) -> Aabb {
        Aabb::new(self.a.inf(&self.b), self.a.sup(&self.b)).expand(self.radius)
    }
}

/// Euclidean distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-20 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl Implicit for Sphere {
    fn value(&self, p: &Point3<f64>) -> f64 {
        (p - self.center).norm() - self.radius
    }

    fn bounds(&self) -> Aabb {
        Aabb::new(self.center, self.center).expand(self.radius)
    }
}

/// The solid half-space behind a plane; `normal` points out of the solid.
#[derive(Debug, Clone, Copy)]
pub struct HalfSpace {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl HalfSpace {
    /// Everything below `y = height`.
    pub fn below(height: f64) -> Self {
        Self {
            point: Point3::new(0.0, height, 0.0),
            normal: Vector3::y(),
        }
    }
}

impl Implicit for HalfSpace {
    fn value(&self, p: &Point3<f64>) -> f64 {
        (p - self.point).dot(&self.normal)
    }

    fn bounds(&self) -> Aabb {
        Aabb::infinite()
    }
}

/// `a` minus `b`.
#[derive(Debug, Clone)]
pub struct Difference<A, B> {
    pub a: A,
    pub b: B,
}

impl<A: Implicit, B: Implicit> Difference<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

impl<A: Implicit, B: Implicit> Implicit for Difference<A, B> {
    fn value(&self, p: &Point3<f64>) -> f64 {
        self.a.value(p).max(-self.b.value(p))
    }

    fn bounds(&self) -> Aabb {
        self.a.bounds()
    }
}

/// The level set of `inner` at `offset` instead of zero. Positive offsets grow
/// the solid.
#[derive(Debug, Clone)]
pub struct Offset<A> {
    pub inner: A,
    pub offset: f64,
}

impl<A: Implicit> Offset<A> {
    pub fn new(inner: A, offset: f64) -> Self {
        Self { inner, offset }
    }
}

impl<A: Implicit> Implicit for Offset<A> {
    fn value(&self, p: &Point3<f64>) -> f64 {
        self.inner.value(p) - self.offset
    }

    fn bounds(&self) -> Aabb {
        self.inner.bounds().expand(self.offset.max(0.0))
    }
}

/// A grid of samples at cell centres, trilinearly interpolated.
///
/// Outside the frame the field takes `outside`; between the outermost cell
/// centres and the frame boundary the edge samples are held constant.
#[derive(Debug, Clone)]
pub struct TrilinearImplicit {
    frame: GridFrame,
    values: DenseGrid3<f32>,
    outside: f64,
}

impl TrilinearImplicit {
    pub fn new(frame: GridFrame, values: DenseGrid3<f32>, outside: f64) -> Self {
        Self {
            frame,
            values,
            outside,
        }
    }

    pub fn frame(&self) -> &GridFrame {
        &self.frame
    }

    pub fn values(&self) -> &DenseGrid3<f32> {
        &self.values
    }
}

impl Implicit for TrilinearImplicit {
    fn value(&self, p: &Point3<f64>) -> f64 {
        trilinear(&self.frame, &self.values, p).unwrap_or(self.outside)
    }

    fn bounds(&self) -> Aabb {
        self.frame.bounds()
    }
}

/// Trilinear interpolation of cell-centred samples. `None` outside the frame.
pub fn trilinear(frame: &GridFrame, values: &DenseGrid3<f32>, p: &Point3<f64>) -> Option<f64> {
    if !frame.bounds().contains(p) {
        return None;
    }
    let g = frame.to_grid(p);
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut t = [0.0f64; 3];
    for axis in 0..3 {
        let n = frame.dims[axis];
        let max = (n - 1) as f64;
        let c = g[axis].clamp(0.0, max);
        let base = c.floor().min((n.saturating_sub(2)) as f64);
        lo[axis] = base as usize;
        hi[axis] = (lo[axis] + 1).min(n - 1);
        t[axis] = c - base;
    }

    let v = |i: usize, j: usize, k: usize| *values.get(i, j, k) as f64;
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let c00 = lerp(v(lo[0], lo[1], lo[2]), v(hi[0], lo[1], lo[2]), t[0]);
    let c10 = lerp(v(lo[0], hi[1], lo[2]), v(hi[0], hi[1], lo[2]), t[0]);
    let c01 = lerp(v(lo[0], lo[1], hi[2]), v(hi[0], lo[1], hi[2]), t[0]);
    let c11 = lerp(v(lo[0], hi[1], hi[2]), v(hi[0], hi[1], hi[2]), t[0]);
    let c0 = lerp(c00, c10, t[1]);
    let c1 = lerp(c01, c11, t[1]);
    Some(lerp(c0, c1, t[2]))
}

/// Rasterises the min-union of many primitives into a grid.
///
/// Each primitive only touches cells within its bounds grown by two cells;
/// everything else keeps the far value, so the result is exact near every
/// surface and merely positive elsewhere.
#[derive(Debug)]
pub struct ImplicitSampler {
    frame: GridFrame,
    values: DenseGrid3<f32>,
    far: f32,
}

impl ImplicitSampler {
    /// Create a sampler covering `bounds` with cubic cells of `cell_size`.
    pub fn new(bounds: &Aabb, cell_size: f64, max_voxels: usize) -> SupportResult<Self> {
        let frame = GridFrame::covering(bounds, cell_size, max_voxels)?;
        let far = (bounds.extent().norm() + cell_size) as f32;
        debug!(dims = ?frame.dims, cell_size, "Implicit sampler allocated");
        Ok(Self {
            frame,
            values: DenseGrid3::new(frame.dims, far),
            far,
        })
    }

    pub fn frame(&self) -> &GridFrame {
        &self.frame
    }

    /// Union all `primitives` into the grid, in parallel over z slabs.
    pub fn union_all<P: Implicit>(&mut self, primitives: &[P]) {
        let frame = self.frame;
        let [ni, nj, _] = frame.dims;
        let margin = 2.0 * frame.cell_size;

        // Cell ranges per primitive, computed once
        let ranges: Vec<[[usize; 2]; 3]> = primitives
            .iter()
            .map(|prim| {
                let b = prim.bounds().expand(margin);
                let mut r = [[0usize; 2]; 3];
                for (axis, range) in r.iter_mut().enumerate() {
                    *range = [
                        frame.clamped_index(b.min[axis], axis),
                        frame.clamped_index(b.max[axis], axis),
                    ];
                }
                r
            })
            .collect();

        self.values
            .as_mut_slice()
            .par_chunks_mut(ni * nj)
            .enumerate()
            .for_each(|(k, slab)| {
                for (prim, r) in primitives.iter().zip(&ranges) {
                    if k < r[2][0] || k > r[2][1] {
                        continue;
                    }
                    for j in r[1][0]..=r[1][1] {
                        for i in r[0][0]..=r[0][1] {
                            let v = prim.value(&frame.cell_center(i, j, k)) as f32;
                            let slot = &mut slab[i + j * ni];
                            if v < *slot {
                                *slot = v;
                            }
                        }
                    }
                }
            });
    }

    /// Finish sampling and return the grid as a continuous field.
    pub fn into_implicit(self) -> TrilinearImplicit {
        TrilinearImplicit::new(self.frame, self.values, self.far as f64)
    }
}
