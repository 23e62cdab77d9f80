//! Core triangle mesh types and queries shared by the support generators.
//!
//! This crate holds the pieces every stage of the support pipeline needs:
//!
//! - **Types**: [`Mesh`], [`Vertex`], [`Triangle`]
//! - **Validation**: [`validate_mesh`] with coded [`MeshError`] diagnostics
//! - **Spatial queries**: [`MeshSpatial`], a BVH for ray casts, closest-point
//!   and containment queries
//! - **Progress**: [`ProgressCallback`] and [`ProgressTracker`] for
//!   cooperative cancellation
//! - **Tracing**: [`OperationTimer`] and structured logging helpers
//!
//! # Units and Coordinate System
//!
//! **This library assumes millimeter (mm) units.**
//!
//! The build direction is **+Y**. The print bed is the plane `y = ground`
//! (usually zero) and "down" means decreasing Y. Face winding is
//! counter-clockwise when viewed from outside, so face normals point outward
//! by the right-hand rule.
//!
//! # Quick Start
//!
//! ```
//! use mesh_core::{Mesh, MeshSpatial, Vertex};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut mesh = Mesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 1.0));
//! mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! let spatial = MeshSpatial::build(&mesh).unwrap();
//! let hit = spatial
//!     .ray_cast(&Point3::new(0.2, 0.0, 0.2), &Vector3::y(), 10.0)
//!     .unwrap();
//! assert!((hit.t - 1.0).abs() < 1e-9);
//! ```

mod error;
mod types;

pub mod progress;
pub mod spatial;
pub mod tracing_ext;

pub use error::{ErrorCode, MeshError, MeshResult, validate_mesh};
pub use types::{Mesh, Triangle, Vertex};

pub use spatial::{MeshSpatial, NearestHit, RayHit};

// Re-export progress tracking types for long-running operations
pub use progress::{Progress, ProgressCallback, ProgressTracker};

pub use tracing_ext::{OperationTimer, PhaseTimer, log_mesh_stats};
