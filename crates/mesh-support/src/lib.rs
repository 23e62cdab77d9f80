//! Support structure synthesis for 3D printing.
//!
//! Given a triangle mesh standing on a print bed (Y up, bed at `y = 0` by
//! default), this crate finds the faces that overhang past a printable angle
//! and generates geometry connecting them to the bed.
//!
//! # Features
//!
//! - **Overhang voxelization**: Seeds a voxel grid wherever a face points down
//!   past the overhang angle
//! - **Block supports**: Solid columns under every seed, carved by the model
//!   with a clearance offset
//! - **Graph supports**: Branching struts found by a downward shortest-path
//!   search that merges new branches into existing ones
//! - **Post-optimization**: Constrained smoothing of the branch graph
//! - **Tube meshing**: Capsule and foot-sphere fields iso-surfaced into a
//!   printable lattice
//! - **Cancellation**: Every phase polls the progress callback
//!
//! # Quick Start with SupportBuilder
//!
//! ```ignore
//! use mesh_support::SupportBuilder;
//!
//! let result = SupportBuilder::new(&mesh)
//!     .cell_size(0.5)
//!     .build_graph()
//!     .unwrap();
//!
//! let support = result.mesh.unwrap();
//! ```
//!
//! # Low-Level API
//!
//! ```ignore
//! use mesh_support::{BlockParams, generate_block_support};
//!
//! let result = generate_block_support(&mesh, &BlockParams::default(), None)?;
//! println!("{} support cells", result.stats.support_cells);
//! ```

pub mod block;
mod builder;
pub mod cancel;
mod error;
pub mod field;
pub mod graph;
pub mod optimize;
mod params;
mod pipeline;
pub mod tube;
pub mod voxelize;

pub use error::{SupportError, SupportErrorCode, SupportRecoverySuggestion, SupportResult};

// Builder API (recommended)
pub use builder::SupportBuilder;

// Configuration
pub use params::{BlockParams, CostModel, GraphParams, GridParams};

// Entry points
pub use pipeline::{
    BlockSupportResult, BlockSupportStats, GraphSupportResult, GraphSupportStats,
    generate_block_support, generate_graph_support,
};

// Support graph
pub use graph::{GraphVertex, StructureIssue, SupportGraph, VertexRole};

// Phase building blocks
pub use block::{BlockOutput, ColumnFill, build_block_support};
pub use field::{DistanceField, DistanceOptions, GridFrame};
pub use graph::{GraphBuild, GraphBuildStats, SnapStats, build_support_graph, snap_tips};
pub use optimize::{OptimizeStats, optimize_graph};
pub use tube::mesh_tubes;
pub use voxelize::{CellState, OverhangVoxels, SeedMode, VoxelGrid, voxelize_overhangs};
