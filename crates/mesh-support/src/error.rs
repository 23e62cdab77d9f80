// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler. This is a false positive in newer Rust versions.
#![allow(unused_assignments)]

//! Error types for support generation with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable code (`SUPPORT-XXXX`)
//! - A recovery suggestion
//! - Terminal-friendly help text via miette
//!
//! Degraded results are not errors. A failed shortest-path search falls back
//! to its last visited node, a tip that cannot be snapped keeps its voxel
//! position, and cancellation returns a result with no mesh.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for support operations.
pub type SupportResult<T> = Result<T, SupportError>;

/// Machine-readable error codes for support operations.
///
/// Codes follow the pattern `SUPPORT-XXXX` where:
/// - 1xxx = Input validation errors
/// - 2xxx = Computation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportErrorCode {
    /// SUPPORT-1001: Input mesh is empty
    EmptyMesh = 1001,
    /// SUPPORT-1002: Invalid parameters
    InvalidParams = 1002,
    /// SUPPORT-1003: Input mesh failed validation
    InvalidMesh = 1003,

    /// SUPPORT-2001: Voxel grid too large
    GridTooLarge = 2001,
    /// SUPPORT-2002: Distance field computation failed
    SdfFailed = 2002,
}

impl SupportErrorCode {
    /// Returns the error code as a string in the format `SUPPORT-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportErrorCode::EmptyMesh => "SUPPORT-1001",
            SupportErrorCode::InvalidParams => "SUPPORT-1002",
            SupportErrorCode::InvalidMesh => "SUPPORT-1003",
            SupportErrorCode::GridTooLarge => "SUPPORT-2001",
            SupportErrorCode::SdfFailed => "SUPPORT-2002",
        }
    }
}

impl std::fmt::Display for SupportErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for support errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SupportRecoverySuggestion {
    /// Reduce grid dimensions to fit the voxel budget.
    ReduceGridResolution {
        current: [usize; 3],
        suggested: [usize; 3],
    },
    /// Repair input mesh first.
    RepairInputMesh,
    /// Fix the named parameter.
    FixParameter { name: String },
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for SupportRecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupportRecoverySuggestion::ReduceGridResolution { current, suggested } => {
                write!(
                    f,
                    "Reduce grid resolution from {:?} to {:?}",
                    current, suggested
                )
            }
            SupportRecoverySuggestion::RepairInputMesh => {
                write!(f, "Repair the input mesh (remove NaN vertices and bad faces) first")
            }
            SupportRecoverySuggestion::FixParameter { name } => {
                write!(f, "Check the value of `{}`", name)
            }
            SupportRecoverySuggestion::None => {
                write!(f, "No specific suggestion available")
            }
        }
    }
}

/// Errors that can occur during support generation.
#[derive(Debug, Error, Diagnostic)]
pub enum SupportError {
    /// Input mesh is empty.
    #[error("input mesh is empty")]
    #[diagnostic(
        code(support::input::empty),
        help(
            "The input mesh must have at least one vertex and one face. Check that the mesh was loaded correctly."
        )
    )]
    EmptyMesh,

    /// Invalid parameters.
    #[error("invalid support parameters: {details}")]
    #[diagnostic(
        code(support::params::invalid),
        help("Check parameter values: cell_size > 0, radii > 0, angles within (0, 90) degrees, alpha within [0, 1].")
    )]
    InvalidParams {
        details: String,
        param_name: Option<String>,
        param_value: Option<String>,
    },

    /// Voxel grid would be too large.
    #[error("voxel grid too large: {dims:?} = {total} voxels exceeds limit of {max}")]
    #[diagnostic(
        code(support::grid::too_large),
        help("Increase the cell size, lower grid_resolution or raise max_voxels.")
    )]
    GridTooLarge {
        dims: [usize; 3],
        total: usize,
        max: usize,
    },

    /// Distance field computation failed.
    #[error("distance field computation failed: {details}")]
    #[diagnostic(
        code(support::sdf::failed),
        help("The mesh may have degenerate triangles or non-manifold geometry. Repair it first.")
    )]
    SdfFailed {
        details: String,
        grid_dims: Option<[usize; 3]>,
    },

    /// Underlying mesh error.
    #[error("mesh operation failed: {0}")]
    #[diagnostic(code(support::mesh::error))]
    MeshError(#[from] mesh_core::MeshError),
}

impl SupportError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> SupportErrorCode {
        match self {
            SupportError::EmptyMesh => SupportErrorCode::EmptyMesh,
            SupportError::InvalidParams { .. } => SupportErrorCode::InvalidParams,
            SupportError::GridTooLarge { .. } => SupportErrorCode::GridTooLarge,
            SupportError::SdfFailed { .. } => SupportErrorCode::SdfFailed,
            SupportError::MeshError(mesh_core::MeshError::EmptyMesh { .. }) => {
                SupportErrorCode::EmptyMesh
            }
            SupportError::MeshError(_) => SupportErrorCode::InvalidMesh,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> SupportRecoverySuggestion {
        match self {
            SupportError::EmptyMesh => SupportRecoverySuggestion::RepairInputMesh,
            SupportError::InvalidParams { param_name, .. } => match param_name {
                Some(name) => SupportRecoverySuggestion::FixParameter { name: name.clone() },
                None => SupportRecoverySuggestion::None,
            },
            SupportError::GridTooLarge { dims, max, .. } => {
                // Scale every axis by the same factor so the product fits
                let scale = (*max as f64 / (dims[0] * dims[1] * dims[2]) as f64).powf(1.0 / 3.0);
                let suggested = [
                    ((dims[0] as f64 * scale) as usize).max(1),
                    ((dims[1] as f64 * scale) as usize).max(1),
                    ((dims[2] as f64 * scale) as usize).max(1),
                ];
                SupportRecoverySuggestion::ReduceGridResolution {
                    current: *dims,
                    suggested,
                }
            }
            SupportError::SdfFailed { .. } => SupportRecoverySuggestion::RepairInputMesh,
            SupportError::MeshError(_) => SupportRecoverySuggestion::RepairInputMesh,
        }
    }

    // Constructor helpers

    /// Create an empty mesh error.
    pub fn empty_mesh() -> Self {
        SupportError::EmptyMesh
    }

    /// Create a grid too large error.
    pub fn grid_too_large(dims: [usize; 3], max: usize) -> Self {
        SupportError::GridTooLarge {
            dims,
            total: dims[0] * dims[1] * dims[2],
            max,
        }
    }

    /// Create an SDF failed error with grid dimensions.
    pub fn sdf_failed_with_grid(details: impl Into<String>, grid_dims: [usize; 3]) -> Self {
        SupportError::SdfFailed {
            details: details.into(),
            grid_dims: Some(grid_dims),
        }
    }

    /// Create an invalid params error with param info.
    pub fn invalid_param(
        param_name: impl Into<String>,
        param_value: impl ToString,
        details: impl Into<String>,
    ) -> Self {
        SupportError::InvalidParams {
            details: details.into(),
            param_name: Some(param_name.into()),
            param_value: Some(param_value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SupportError::empty_mesh();
        assert_eq!(err.code(), SupportErrorCode::EmptyMesh);
        assert_eq!(err.code().as_str(), "SUPPORT-1001");
    }

    #[test]
    fn test_grid_too_large_suggestion() {
        let err = SupportError::grid_too_large([400, 200, 400], 1_000_000);
        match err.recovery_suggestion() {
            SupportRecoverySuggestion::ReduceGridResolution { current, suggested } => {
                assert_eq!(current, [400, 200, 400]);
                assert!(suggested[0] < 400 && suggested[1] < 200 && suggested[2] < 400);
            }
            other => panic!("Expected ReduceGridResolution, got {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = SupportError::grid_too_large([100, 100, 100], 500_000);
        let display = format!("{}", err);
        assert!(display.contains("1000000 voxels"));
        assert!(display.contains("500000"));
    }

    #[test]
    fn test_invalid_param_suggestion() {
        let err = SupportError::invalid_param("post_radius", -1.0, "must be positive");
        assert_eq!(err.code(), SupportErrorCode::InvalidParams);
        assert_eq!(
            err.recovery_suggestion(),
            SupportRecoverySuggestion::FixParameter {
                name: "post_radius".to_string()
            }
        );
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_from_mesh_error() {
        let empty: SupportError = mesh_core::MeshError::empty_mesh("test").into();
        assert_eq!(empty.code(), SupportErrorCode::EmptyMesh);

        let bad: SupportError = mesh_core::MeshError::InvalidCoordinate { vertex: 2 }.into();
        assert!(matches!(bad, SupportError::MeshError(_)));
        assert_eq!(bad.code(), SupportErrorCode::InvalidMesh);
    }
}
