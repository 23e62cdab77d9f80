//! Error types for mesh operations with rich diagnostics.
//!
//! Each error has a unique code in the format `MESH-XXXX`:
//! - `MESH-2xxx`: Validation errors (topology, coordinates)
//! - `MESH-3xxx`: Query errors (spatial structures that could not be built)

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes for mesh operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// MESH-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,
    /// MESH-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,
    /// MESH-3001: Spatial index has no usable triangles
    NoUsableTriangles = 3001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidVertexIndex => "MESH-2001",
            ErrorCode::InvalidCoordinate => "MESH-2002",
            ErrorCode::EmptyMesh => "MESH-2003",
            ErrorCode::NoUsableTriangles => "MESH-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while validating or indexing a mesh.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Mesh has no vertices or faces.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validate::empty),
        help("The mesh must contain at least one vertex and one triangle.")
    )]
    EmptyMesh { details: String },

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but mesh has only {vertex_count} vertices")]
    #[diagnostic(
        code(mesh::validate::vertex_index),
        help("The face list is corrupt. Re-export the mesh or drop the offending faces.")
    )]
    InvalidVertexIndex {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    /// A vertex has a NaN or infinite coordinate.
    #[error("vertex {vertex} has a non-finite coordinate")]
    #[diagnostic(
        code(mesh::validate::coordinate),
        help("Remove or fix vertices with NaN/Infinity coordinates before processing.")
    )]
    InvalidCoordinate { vertex: usize },

    /// Every triangle of the mesh is degenerate.
    #[error("no usable triangles for spatial index ({faces} faces, all degenerate)")]
    #[diagnostic(
        code(mesh::spatial::no_triangles),
        help("The mesh contains only zero-area triangles.")
    )]
    NoUsableTriangles { faces: usize },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::NoUsableTriangles { .. } => ErrorCode::NoUsableTriangles,
        }
    }

    /// Create an empty mesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }
}

/// Check that a mesh is non-empty, references only valid vertices and has
/// finite coordinates.
pub fn validate_mesh(mesh: &crate::Mesh) -> MeshResult<()> {
    if mesh.vertices.is_empty() {
        return Err(MeshError::empty_mesh("no vertices"));
    }
    if mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh("no faces"));
    }
    if let Some((face, index)) = mesh.first_invalid_index() {
        return Err(MeshError::InvalidVertexIndex {
            face,
            index,
            vertex_count: mesh.vertices.len(),
        });
    }
    if let Some(vertex) = mesh.vertices.iter().position(|v| {
        !(v.position.x.is_finite() && v.position.y.is_finite() && v.position.z.is_finite())
    }) {
        return Err(MeshError::InvalidCoordinate { vertex });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mesh, Vertex};

    #[test]
    fn test_error_codes() {
        let err = MeshError::empty_mesh("test");
        assert_eq!(err.code(), ErrorCode::EmptyMesh);
        assert_eq!(err.code().as_str(), "MESH-2003");
    }

    #[test]
    fn test_validate_empty() {
        let mesh = Mesh::new();
        assert!(matches!(
            validate_mesh(&mesh),
            Err(MeshError::EmptyMesh { .. })
        ));

        let mut points_only = Mesh::new();
        points_only.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        assert!(matches!(
            validate_mesh(&points_only),
            Err(MeshError::EmptyMesh { .. })
        ));
    }

    #[test]
    fn test_validate_bad_coordinate() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(f64::NAN, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);

        let err = validate_mesh(&mesh).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCoordinate);
    }

    #[test]
    fn test_error_display() {
        let err = MeshError::InvalidVertexIndex {
            face: 3,
            index: 9,
            vertex_count: 4,
        };
        let display = format!("{}", err);
        assert!(display.contains("face 3"));
        assert!(display.contains("vertex 9"));
    }
}
