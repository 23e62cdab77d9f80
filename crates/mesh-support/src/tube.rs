//! Meshing a support graph as a union of tubes.
//!
//! Every edge becomes a capsule, thin where it touches the model; every
//! ground vertex gets a wider foot sphere for bed adhesion. The union is
//! sampled on a regular grid, clipped at the bed and iso-surfaced.

use nalgebra::Vector3;
use tracing::{info, warn};

use mesh_core::Mesh;

use crate::error::SupportResult;
use crate::field::extract::{extract_isosurface, support_extraction_bounds};
use crate::field::implicit::{Capsule, Difference, HalfSpace, ImplicitSampler, Sphere};
use crate::graph::{SupportGraph, VertexRole};
use crate::params::GraphParams;

/// Foot spheres sink this fraction of their radius below the ground vertex.
const FOOT_SINK: f64 = 0.25;

/// Capsules for every strut of `graph`.
///
/// Struts whose upper end is a tip use `params.tip_radius`.
pub fn strut_capsules(graph: &SupportGraph, params: &GraphParams) -> Vec<Capsule> {
    graph
        .edges()
        .iter()
        .map(|&[upper, lower]| {
            let radius = if graph.role(upper) == VertexRole::Tip {
                params.tip_radius
            } else {
                params.post_radius
            };
            Capsule::new(graph.position(upper), graph.position(lower), radius)
        })
        .collect()
}

/// Foot spheres under every ground vertex.
pub fn foot_spheres(graph: &SupportGraph, params: &GraphParams) -> Vec<Sphere> {
    let sink = Vector3::new(0.0, FOOT_SINK * params.ground_radius, 0.0);
    graph
        .grounds()
        .into_iter()
        .map(|v| Sphere::new(graph.position(v) - sink, params.ground_radius))
        .collect()
}

/// Mesh `graph` as tubes resting on the bed at `ground_y`.
///
/// An empty graph yields an empty mesh.
pub fn mesh_tubes(graph: &SupportGraph, params: &GraphParams, ground_y: f64) -> SupportResult<Mesh> {
    let Some(graph_bounds) = graph.bounds() else {
        warn!("Support graph is empty, nothing to mesh");
        return Ok(Mesh::new());
    };

    let cell = params.sampler_cell();
    let max_radius = params
        .post_radius
        .max(params.tip_radius)
        .max(params.ground_radius);
    let sample_bounds = graph_bounds.expand(max_radius + cell);

    let capsules = strut_capsules(graph, params);
    let feet = foot_spheres(graph, params);

    info!(
        struts = capsules.len(),
        feet = feet.len(),
        cell_size = cell,
        "Meshing support tubes"
    );

    let mut sampler = ImplicitSampler::new(&sample_bounds, cell, params.grid.max_voxels)?;
    sampler.union_all(&capsules);
    sampler.union_all(&feet);
    let field = sampler.into_implicit();

    let bounds = support_extraction_bounds(&graph_bounds.expand(max_radius), cell, ground_y);
    let clipped = Difference::new(field, HalfSpace::below(ground_y));
    let mesh = extract_isosurface(&clipped, &bounds, cell, params.grid.max_voxels)?;

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Support tubes meshed"
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::make_branch;
    use nalgebra::Point3;

    #[test]
    fn test_radii_by_role() {
        let g = make_branch();
        let params = GraphParams::default();
        let capsules = strut_capsules(&g, &params);
        assert_eq!(capsules.len(), 3);
        assert_eq!(capsules[0].radius, params.tip_radius);
        assert_eq!(capsules[1].radius, params.post_radius);

        let feet = foot_spheres(&g, &params);
        assert_eq!(feet.len(), 1);
        assert_eq!(feet[0].center, Point3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn test_tip_radius_only_from_upper_end() {
        // A tip stored as the lower end is not a tip strut
        let mut g = SupportGraph::new();
        let post = g.add_vertex(Point3::new(0.0, 3.0, 0.0), VertexRole::Interior);
        let tip = g.add_vertex(Point3::new(0.0, 2.0, 0.0), VertexRole::Tip);
        g.add_edge(post, tip);

        let params = GraphParams::default();
        let capsules = strut_capsules(&g, &params);
        assert_eq!(capsules[0].radius, params.post_radius);
    }

    #[test]
    fn test_branch_meshes_above_bed() {
        let g = make_branch();
        let params = GraphParams {
            sampler_cell_size: Some(0.25),
            ..Default::default()
        };
        let mesh = mesh_tubes(&g, &params, 0.0).unwrap();
        assert!(!mesh.is_empty());

        let (lo, hi) = mesh.bounds().unwrap();
        assert!(lo.y >= -0.25, "min y {}", lo.y);
        assert!(hi.y <= 4.0 + params.tip_radius + 0.25);
        // The foot is wider than the post
        assert!(hi.x - lo.x > 2.0 * params.post_radius);
    }

    #[test]
    fn test_empty_graph() {
        let mesh = mesh_tubes(&SupportGraph::new(), &GraphParams::default(), 0.0).unwrap();
        assert!(mesh.is_empty());
    }
}
