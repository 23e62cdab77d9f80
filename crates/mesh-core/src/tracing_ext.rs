//! Tracing helpers for support generation.
//!
//! Nothing is printed unless the application installs a subscriber:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_support=debug,mesh_core::timing=info
//! ```

use std::time::Instant;
use tracing::{Span, debug, info};

use crate::Mesh;

/// Logs the duration of a whole operation when dropped.
///
/// ```rust,ignore
/// let _timer = OperationTimer::with_context("generate_graph_support", faces, vertices);
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("support_operation", operation = name);
        debug!(target: "mesh_core::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Timer whose span carries the input mesh size.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "support_operation",
            operation = name,
            faces = face_count,
            vertices = vertex_count
        );
        debug!(
            target: "mesh_core::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_core::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Times one phase of an operation.
///
/// Unlike [`OperationTimer`] the duration is handed back by
/// [`finish`](Self::finish) so it can land in the result statistics.
#[derive(Debug)]
pub struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(phase: &'static str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    /// Milliseconds since [`start`](Self::start), logged at debug level.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            target: "mesh_core::timing",
            phase = self.phase,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Phase completed"
        );
        elapsed_ms
    }
}

/// Log the size of `mesh` and its height range at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let Some((min, max)) = mesh.bounds() else {
        debug!(target: "mesh_core::mesh_state", context, "Mesh is empty");
        return;
    };
    let dims = max - min;

    debug!(
        target: "mesh_core::mesh_state",
        context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        min_y = min.y,
        max_y = max.y,
        "Mesh state"
    );
}
