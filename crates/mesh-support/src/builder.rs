//! Fluent builder API for support generation.
//!
//! The builder collects grid, block and graph settings in one place and runs
//! either strategy with them.
//!
//! # Example
//!
//! ```ignore
//! use mesh_support::SupportBuilder;
//!
//! let result = SupportBuilder::new(&mesh)
//!     .cell_size(0.5)          // 0.5mm voxels
//!     .overhang_angle(40.0)    // support faces within 40° of straight down
//!     .post_radius(0.8)
//!     .build_graph()
//!     .unwrap();
//!
//! let graph = result.graph.unwrap();
//! println!("{} tips", graph.tips().len());
//! ```

use mesh_core::{Mesh, ProgressCallback};

use crate::error::SupportResult;
use crate::params::{BlockParams, CostModel, GraphParams, GridParams};
use crate::pipeline::{
    BlockSupportResult, GraphSupportResult, generate_block_support, generate_graph_support,
};

/// Fluent builder for support generation.
///
/// Grid settings are shared by both strategies; block and graph settings
/// only affect [`build_block`](Self::build_block) and
/// [`build_graph`](Self::build_graph) respectively.
pub struct SupportBuilder<'a> {
    mesh: &'a Mesh,
    grid: GridParams,
    block: BlockParams,
    graph: GraphParams,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> SupportBuilder<'a> {
    /// Create a builder for `mesh` with default settings.
    pub fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            grid: GridParams::default(),
            block: BlockParams::default(),
            graph: GraphParams::default(),
            progress_callback: None,
        }
    }

    // =========================================================================
    // Grid Configuration
    // =========================================================================

    /// Set the voxel edge length in mm.
    ///
    /// Overrides [`grid_resolution`](Self::grid_resolution).
    pub fn cell_size(mut self, size: f64) -> Self {
        self.grid.cell_size = Some(size);
        self
    }

    /// Number of cells along the longest mesh axis.
    pub fn grid_resolution(mut self, cells: usize) -> Self {
        self.grid.grid_resolution = cells;
        self.grid.cell_size = None;
        self
    }

    /// Set maximum number of voxels (memory limit).
    pub fn max_voxels(mut self, max: usize) -> Self {
        self.grid.max_voxels = max;
        self
    }

    /// Faces whose normal is within this many degrees of straight down
    /// receive support.
    pub fn overhang_angle(mut self, degrees: f64) -> Self {
        self.grid.overhang_angle_deg = degrees;
        self
    }

    /// Put the bed at `height` instead of `y = 0`.
    pub fn ground_height(mut self, height: f64) -> Self {
        self.grid.ground_height = Some(height);
        self
    }

    // =========================================================================
    // Block Configuration
    // =========================================================================

    /// Carve the model out of block supports.
    pub fn subtract_model(mut self, enable: bool) -> Self {
        self.block.subtract_model = enable;
        self
    }

    /// Clearance between block support and model in mm.
    pub fn model_offset(mut self, offset: f64) -> Self {
        self.block.model_offset = offset;
        self
    }

    // =========================================================================
    // Graph Configuration
    // =========================================================================

    /// Process seed layers from the bottom up.
    pub fn bottom_up(mut self, enable: bool) -> Self {
        self.graph.bottom_up = enable;
        self
    }

    /// Process seeds in each layer farthest-first.
    pub fn reverse_within_layer(mut self, enable: bool) -> Self {
        self.graph.reverse_within_layer = enable;
        self
    }

    /// Plan-view point that orders seeds within a layer.
    pub fn plan_center(mut self, x: f64, z: f64) -> Self {
        self.graph.plan_center = Some([x, z]);
        self
    }

    pub fn cost_model(mut self, model: CostModel) -> Self {
        self.graph.cost_model = model;
        self
    }

    /// Minimum clearance between optimized struts and the model in mm.
    pub fn surface_offset(mut self, offset: f64) -> Self {
        self.graph.surface_offset = offset;
        self
    }

    /// Configure the post-optimizer. Zero rounds disables it.
    pub fn optimize(mut self, rounds: usize, alpha: f64, min_angle_deg: f64) -> Self {
        self.graph.optimize = rounds > 0;
        self.graph.optimize_rounds = rounds;
        self.graph.optimize_alpha = alpha;
        self.graph.optimize_angle_deg = min_angle_deg;
        self
    }

    /// Skip the post-optimizer.
    pub fn no_optimize(mut self) -> Self {
        self.graph.optimize = false;
        self
    }

    pub fn post_radius(mut self, radius: f64) -> Self {
        self.graph.post_radius = radius;
        self
    }

    pub fn tip_radius(mut self, radius: f64) -> Self {
        self.graph.tip_radius = radius;
        self
    }

    pub fn ground_radius(mut self, radius: f64) -> Self {
        self.graph.ground_radius = radius;
        self
    }

    /// Cell size of the tube sampler in mm.
    pub fn sampler_cell_size(mut self, size: f64) -> Self {
        self.graph.sampler_cell_size = Some(size);
        self
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Thin struts for small, detailed prints.
    pub fn fine(mut self) -> Self {
        self.graph = GraphParams::fine();
        self
    }

    /// Heavy struts kept away from the model.
    pub fn sturdy(mut self) -> Self {
        self.graph = GraphParams::sturdy();
        self
    }

    /// Coarse grid, no model subtraction.
    pub fn preview(mut self) -> Self {
        self.block = BlockParams::preview();
        self.grid = self.block.grid.clone();
        self
    }

    // =========================================================================
    // Progress Reporting
    // =========================================================================

    /// Set a progress callback.
    ///
    /// Return `false` from the callback to cancel; the result then has
    /// `cancelled == true` and no mesh.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Resolved block parameters.
    pub fn block_params(&self) -> BlockParams {
        BlockParams {
            grid: self.grid.clone(),
            ..self.block.clone()
        }
    }

    /// Resolved graph parameters.
    pub fn graph_params(&self) -> GraphParams {
        GraphParams {
            grid: self.grid.clone(),
            ..self.graph.clone()
        }
    }

    /// Generate solid block supports.
    ///
    /// # Errors
    ///
    /// See [`generate_block_support`].
    pub fn build_block(self) -> SupportResult<BlockSupportResult> {
        let params = self.block_params();
        generate_block_support(self.mesh, &params, self.progress_callback.as_ref())
    }

    /// Generate branching graph supports.
    ///
    /// # Errors
    ///
    /// See [`generate_graph_support`].
    pub fn build_graph(self) -> SupportResult<GraphSupportResult> {
        let params = self.graph_params();
        generate_graph_support(self.mesh, &params, self.progress_callback.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::distance::tests::make_box;

    #[test]
    fn test_builder_defaults() {
        let mesh = make_box([0.0, 1.0, 0.0], [1.0, 2.0, 1.0]);
        let builder = SupportBuilder::new(&mesh);

        let block = builder.block_params();
        assert!(block.subtract_model);
        assert!((block.model_offset - 0.25).abs() < 1e-12);
        let graph = builder.graph_params();
        assert!(graph.optimize);
        assert_eq!(graph.optimize_rounds, 20);
        assert!(builder.progress_callback.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let mesh = make_box([0.0, 1.0, 0.0], [1.0, 2.0, 1.0]);
        let builder = SupportBuilder::new(&mesh)
            .cell_size(0.25)
            .overhang_angle(45.0)
            .ground_height(-1.0)
            .bottom_up(true)
            .plan_center(0.5, 0.5)
            .post_radius(0.8)
            .optimize(5, 0.2, 40.0)
            .subtract_model(false);

        let graph = builder.graph_params();
        assert_eq!(graph.grid.cell_size, Some(0.25));
        assert_eq!(graph.grid.ground_y(), -1.0);
        assert!(graph.bottom_up);
        assert_eq!(graph.plan_center, Some([0.5, 0.5]));
        assert_eq!(graph.optimize_rounds, 5);
        assert!((graph.post_radius - 0.8).abs() < 1e-12);

        let block = builder.block_params();
        assert!(!block.subtract_model);
        assert!((block.grid.overhang_angle_deg - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_presets_keep_grid() {
        let mesh = make_box([0.0, 1.0, 0.0], [1.0, 2.0, 1.0]);
        let builder = SupportBuilder::new(&mesh).cell_size(0.3).sturdy();
        let graph = builder.graph_params();
        assert_eq!(graph.grid.cell_size, Some(0.3));
        assert!(matches!(graph.cost_model, CostModel::ClearanceBiased { .. }));

        let zero_rounds = SupportBuilder::new(&mesh).optimize(0, 0.1, 30.0);
        assert!(!zero_rounds.graph_params().optimize);
        assert!(!SupportBuilder::new(&mesh).no_optimize().graph_params().optimize);
    }
}
