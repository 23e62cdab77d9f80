//! Scalar fields: dense grids, distance fields, implicit primitives and
//! iso-surface extraction.

pub mod distance;
pub mod extract;
pub mod grid;
pub mod implicit;

pub use distance::{DistanceField, DistanceOptions};
pub use extract::{extract_isosurface, support_extraction_bounds};
pub use grid::{DenseGrid2, DenseGrid3, GridFrame};
pub use implicit::{
    Aabb, Capsule, Difference, HalfSpace, Implicit, ImplicitSampler, Offset, Sphere,
    TrilinearImplicit,
};
