//! Configuration for both support strategies.
//!
//! All lengths are in millimeters and all angles in degrees.

use crate::error::{SupportError, SupportResult};

/// Voxel grid and overhang detection settings shared by both strategies.
#[derive(Debug, Clone)]
pub struct GridParams {
    /// Explicit voxel edge length. When `None` the cell size is the longest
    /// mesh extent divided by `grid_resolution`.
    pub cell_size: Option<f64>,
    /// Number of cells along the longest mesh axis when `cell_size` is unset.
    pub grid_resolution: usize,
    /// Maximum number of voxels in any grid before failing.
    pub max_voxels: usize,
    /// A face is an overhang when the angle between its normal and straight
    /// down is smaller than this.
    pub overhang_angle_deg: f64,
    /// Forced bed height. The bed is at `y = 0` when unset.
    pub ground_height: Option<f64>,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            cell_size: None,
            grid_resolution: 128,
            max_voxels: 50_000_000,
            overhang_angle_deg: 30.0,
            ground_height: None,
        }
    }
}

impl GridParams {
    /// Bed height used for this run.
    pub fn ground_y(&self) -> f64 {
        self.ground_height.unwrap_or(0.0)
    }

    /// Cosine threshold compared against the downward normal component.
    pub fn overhang_cos(&self) -> f64 {
        self.overhang_angle_deg.to_radians().cos()
    }

    /// Resolve the cell size for a mesh whose longest extent is `longest_extent`.
    pub fn resolve_cell_size(&self, longest_extent: f64) -> f64 {
        match self.cell_size {
            Some(cell) => cell,
            None => (longest_extent / self.grid_resolution as f64).max(f64::EPSILON),
        }
    }

    pub fn validate(&self) -> SupportResult<()> {
        if let Some(cell) = self.cell_size
            && !(cell.is_finite() && cell > 0.0)
        {
            return Err(SupportError::invalid_param(
                "cell_size",
                cell,
                "cell size must be positive and finite",
            ));
        }
        if self.grid_resolution == 0 {
            return Err(SupportError::invalid_param(
                "grid_resolution",
                self.grid_resolution,
                "grid resolution must be at least 1",
            ));
        }
        if self.max_voxels == 0 {
            return Err(SupportError::invalid_param(
                "max_voxels",
                self.max_voxels,
                "voxel budget must be non-zero",
            ));
        }
        check_angle("overhang_angle_deg", self.overhang_angle_deg)?;
        if let Some(ground) = self.ground_height
            && !ground.is_finite()
        {
            return Err(SupportError::invalid_param(
                "ground_height",
                ground,
                "ground height must be finite",
            ));
        }
        Ok(())
    }
}

/// Parameters for the solid block strategy.
#[derive(Debug, Clone)]
pub struct BlockParams {
    pub grid: GridParams,
    /// Subtract the model (grown by `model_offset`) from the support volume.
    pub subtract_model: bool,
    /// Clearance between support and model. Applied uniformly, so the top and
    /// bottom of the block shrink by the same amount.
    pub model_offset: f64,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            grid: GridParams::default(),
            subtract_model: true,
            model_offset: 0.25,
        }
    }
}

impl BlockParams {
    /// Coarse grid without model subtraction, for quick previews.
    pub fn preview() -> Self {
        Self {
            grid: GridParams {
                grid_resolution: 48,
                ..Default::default()
            },
            subtract_model: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> SupportResult<()> {
        self.grid.validate()?;
        check_non_negative("model_offset", self.model_offset)
    }
}

/// Per-cell weighting used by the branch search.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CostModel {
    /// Every open cell costs the same.
    #[default]
    Uniform,
    /// Cells closer than `falloff` to the model cost up to twice as much,
    /// pushing branches away from the surface.
    ClearanceBiased { falloff: f64 },
}

/// Parameters for the branching graph strategy.
#[derive(Debug, Clone)]
pub struct GraphParams {
    pub grid: GridParams,
    /// Process seed layers from the bottom up instead of top down.
    pub bottom_up: bool,
    /// Process seeds within a layer farthest-first from `plan_center`.
    pub reverse_within_layer: bool,
    /// Plan-view (x, z) point that orders seeds within a layer. Defaults to the
    /// centre of the mesh bounds.
    pub plan_center: Option<[f64; 2]>,
    pub cost_model: CostModel,
    /// Minimum clearance the optimizer keeps between free vertices and the model.
    pub surface_offset: f64,
    /// Minimum angle between an optimized strut and the horizontal plane.
    pub optimize_angle_deg: f64,
    /// Blend factor towards the neighbour centroid per round.
    pub optimize_alpha: f64,
    pub optimize_rounds: usize,
    /// Run the post-optimizer at all.
    pub optimize: bool,
    pub post_radius: f64,
    pub tip_radius: f64,
    pub ground_radius: f64,
    /// Cell size of the tube sampler. Defaults to half the post radius.
    pub sampler_cell_size: Option<f64>,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            grid: GridParams::default(),
            bottom_up: false,
            reverse_within_layer: false,
            plan_center: None,
            cost_model: CostModel::Uniform,
            surface_offset: 0.5,
            optimize_angle_deg: 30.0,
            optimize_alpha: 0.1,
            optimize_rounds: 20,
            optimize: true,
            post_radius: 1.0,
            tip_radius: 0.5,
            ground_radius: 2.0,
            sampler_cell_size: None,
        }
    }
}

impl GraphParams {
    /// Thin struts for small, detailed prints.
    pub fn fine() -> Self {
        Self {
            post_radius: 0.6,
            tip_radius: 0.3,
            ground_radius: 1.2,
            surface_offset: 0.3,
            ..Default::default()
        }
    }

    /// Heavier struts that keep away from the model.
    pub fn sturdy() -> Self {
        Self {
            cost_model: CostModel::ClearanceBiased { falloff: 3.0 },
            post_radius: 1.5,
            tip_radius: 0.6,
            ground_radius: 3.0,
            surface_offset: 1.0,
            ..Default::default()
        }
    }

    /// Tube sampler cell size.
    pub fn sampler_cell(&self) -> f64 {
        self.sampler_cell_size.unwrap_or(self.post_radius * 0.5)
    }

    pub fn validate(&self) -> SupportResult<()> {
        self.grid.validate()?;
        check_positive("post_radius", self.post_radius)?;
        check_positive("tip_radius", self.tip_radius)?;
        check_positive("ground_radius", self.ground_radius)?;
        check_non_negative("surface_offset", self.surface_offset)?;
        if !(0.0..90.0).contains(&self.optimize_angle_deg) {
            return Err(SupportError::invalid_param(
                "optimize_angle_deg",
                self.optimize_angle_deg,
                "optimize angle must be within [0, 90) degrees",
            ));
        }
        if !(0.0..=1.0).contains(&self.optimize_alpha) {
            return Err(SupportError::invalid_param(
                "optimize_alpha",
                self.optimize_alpha,
                "blend factor must be within [0, 1]",
            ));
        }
        if let Some(cell) = self.sampler_cell_size {
            check_positive("sampler_cell_size", cell)?;
        }
        if let CostModel::ClearanceBiased { falloff } = self.cost_model {
            check_positive("cost_model.falloff", falloff)?;
        }
        if let Some([x, z]) = self.plan_center
            && !(x.is_finite() && z.is_finite())
        {
            return Err(SupportError::invalid_param(
                "plan_center",
                format!("[{x}, {z}]"),
                "plan centre must be finite",
            ));
        }
        Ok(())
    }
}

fn check_angle(name: &str, value: f64) -> SupportResult<()> {
    if value > 0.0 && value < 90.0 {
        Ok(())
    } else {
        Err(SupportError::invalid_param(
            name,
            value,
            "angle must be within (0, 90) degrees",
        ))
    }
}

fn check_positive(name: &str, value: f64) -> SupportResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SupportError::invalid_param(name, value, "must be positive"))
    }
}

fn check_non_negative(name: &str, value: f64) -> SupportResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SupportError::invalid_param(name, value, "must not be negative"))
    }
}
