//! Spatial queries against a triangle mesh.
//!
//! [`MeshSpatial`] wraps a bounding volume hierarchy over the non-degenerate
//! triangles of a mesh and answers three kinds of query:
//!
//! - closest ray hit ([`MeshSpatial::ray_cast`])
//! - closest surface point ([`MeshSpatial::nearest`])
//! - point containment by crossing parity ([`MeshSpatial::is_inside`])
//!
//! The index is immutable after construction and is `Send + Sync`, so a
//! single instance can be shared by rayon workers.

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Triangle};

/// Triangles whose doubled area is below this are left out of the index.
const DEGENERATE_AREA: f64 = 1e-12;

/// Closest intersection of a ray with the mesh.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    /// Distance along the (normalized) ray direction.
    pub t: f64,
    /// World-space hit point.
    pub point: Point3<f64>,
    /// Unit face normal of the hit triangle.
    pub normal: Vector3<f64>,
    /// Index of the hit face in the source mesh.
    pub face: usize,
}

/// Closest point on the mesh surface to a query point.
#[derive(Debug, Clone, Copy)]
pub struct NearestHit {
    pub point: Point3<f64>,
    /// Unit face normal of the triangle containing `point`.
    pub normal: Vector3<f64>,
    pub distance: f64,
    pub face: usize,
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &Triangle) -> Self {
        let (min, max) = tri.bounds();
        Self { min, max }
    }

    fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn expand(&self, epsilon: f64) -> Self {
        let e = Vector3::repeat(epsilon);
        Self {
            min: self.min - e,
            max: self.max + e,
        }
    }

    /// Slab test. Returns the entry distance, clamped to zero.
    fn ray_entry(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<f64> {
        let t1 = (self.min.x - origin.x) * dir_inv.x;
        let t2 = (self.max.x - origin.x) * dir_inv.x;
        let t3 = (self.min.y - origin.y) * dir_inv.y;
        let t4 = (self.max.y - origin.y) * dir_inv.y;
        let t5 = (self.min.z - origin.z) * dir_inv.z;
        let t6 = (self.max.z - origin.z) * dir_inv.z;

        let t_min = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let t_max = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        // NaN from 0 * inf compares false and falls through to None
        if t_max >= t_min && t_max >= 0.0 {
            Some(t_min.max(0.0))
        } else {
            None
        }
    }

    fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        slot: usize,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn build(tris: &[IndexedTriangle], slots: &mut [usize], epsilon: f64) -> Option<Self> {
        match slots.len() {
            0 => return None,
            1 => {
                return Some(BvhNode::Leaf {
                    aabb: tris[slots[0]].aabb.expand(epsilon),
                    slot: slots[0],
                });
            }
            _ => {}
        }

        let aabb = slots
            .iter()
            .skip(1)
            .fold(tris[slots[0]].aabb, |acc, &s| acc.union(&tris[s].aabb))
            .expand(epsilon);

        let extent = aabb.max - aabb.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        slots.sort_by(|&a, &b| {
            let ca = tris[a].centroid[axis];
            let cb = tris[b].centroid[axis];
            ca.total_cmp(&cb)
        });

        let mid = slots.len() / 2;
        let (left_slots, right_slots) = slots.split_at_mut(mid);
        let left = BvhNode::build(tris, left_slots, epsilon);
        let right = BvhNode::build(tris, right_slots, epsilon);

        match (left, right) {
            (Some(l), Some(r)) => Some(BvhNode::Internal {
                aabb,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (Some(n), None) | (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

#[derive(Debug)]
struct IndexedTriangle {
    tri: Triangle,
    normal: Vector3<f64>,
    centroid: Point3<f64>,
    aabb: Aabb,
    face: usize,
}

/// Bounding volume hierarchy over a mesh's triangles.
#[derive(Debug)]
pub struct MeshSpatial {
    tris: Vec<IndexedTriangle>,
    root: BvhNode,
    epsilon: f64,
}

impl MeshSpatial {
    /// Build the index.
    ///
    /// Faces with out-of-range indices or near-zero area are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::EmptyMesh`] for a mesh with no faces and
    /// [`MeshError::NoUsableTriangles`] when every face is degenerate.
    pub fn build(mesh: &Mesh) -> MeshResult<Self> {
        if mesh.faces.is_empty() {
            return Err(MeshError::empty_mesh("no faces to index"));
        }

        let tris: Vec<IndexedTriangle> = (0..mesh.face_count())
            .filter_map(|face| {
                let tri = mesh.triangle(face)?;
                let n = tri.normal_unnormalized();
                if n.norm() < DEGENERATE_AREA {
                    return None;
                }
                Some(IndexedTriangle {
                    normal: n.normalize(),
                    centroid: tri.centroid(),
                    aabb: Aabb::from_triangle(&tri),
                    tri,
                    face,
                })
            })
            .collect();

        let scale = mesh
            .bounds()
            .map(|(lo, hi)| (hi - lo).norm())
            .unwrap_or(1.0)
            .max(1.0);
        let epsilon = 1e-9 * scale;

        let mut slots: Vec<usize> = (0..tris.len()).collect();
        let root = BvhNode::build(&tris, &mut slots, epsilon).ok_or(
            MeshError::NoUsableTriangles {
                faces: mesh.face_count(),
            },
        )?;

        Ok(Self {
            tris,
            root,
            epsilon,
        })
    }

    /// Number of indexed (non-degenerate) triangles.
    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    /// Cast a ray and return the closest hit within `max_dist`.
    ///
    /// `direction` does not need to be normalized; `t` is reported in world
    /// units. A zero direction never hits.
    pub fn ray_cast(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        max_dist: f64,
    ) -> Option<RayHit> {
        let dir = direction.try_normalize(f64::EPSILON)?;
        let dir_inv = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let (t, slot) = self.trace(&self.root, origin, &dir, &dir_inv, max_dist)?;
        let hit = &self.tris[slot];
        Some(RayHit {
            t,
            point: origin + dir * t,
            normal: hit.normal,
            face: hit.face,
        })
    }

    fn trace(
        &self,
        node: &BvhNode,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        dir_inv: &Vector3<f64>,
        max_dist: f64,
    ) -> Option<(f64, usize)> {
        let t_near = node.aabb().ray_entry(origin, dir_inv)?;
        if t_near > max_dist {
            return None;
        }

        match node {
            BvhNode::Leaf { slot, .. } => {
                ray_triangle_intersect(origin, dir, &self.tris[*slot].tri, self.epsilon)
                    .filter(|&t| t <= max_dist)
                    .map(|t| (t, *slot))
            }
            BvhNode::Internal { left, right, .. } => {
                let hit_left = self.trace(left, origin, dir, dir_inv, max_dist);
                let bound = hit_left.map_or(max_dist, |(t, _)| t);
                let hit_right = self.trace(right, origin, dir, dir_inv, bound);
                match (hit_left, hit_right) {
                    (Some(l), Some(r)) => Some(if l.0 <= r.0 { l } else { r }),
                    (Some(h), None) | (None, Some(h)) => Some(h),
                    (None, None) => None,
                }
            }
        }
    }

    /// Closest point on the surface to `point`.
    pub fn nearest(&self, point: &Point3<f64>) -> NearestHit {
        let mut best = (f64::INFINITY, 0usize, *point);
        self.nearest_in(&self.root, point, &mut best);
        let (dist_sq, slot, closest) = best;
        let tri = &self.tris[slot];
        NearestHit {
            point: closest,
            normal: tri.normal,
            distance: dist_sq.sqrt(),
            face: tri.face,
        }
    }

    fn nearest_in(&self, node: &BvhNode, p: &Point3<f64>, best: &mut (f64, usize, Point3<f64>)) {
        if node.aabb().distance_squared(p) >= best.0 {
            return;
        }
        match node {
            BvhNode::Leaf { slot, .. } => {
                let q = self.tris[*slot].tri.closest_point(p);
                let d = (q - p).norm_squared();
                if d < best.0 {
                    *best = (d, *slot, q);
                }
            }
            BvhNode::Internal { left, right, .. } => {
                // Visit the closer child first so the bound tightens sooner
                let dl = left.aabb().distance_squared(p);
                let dr = right.aabb().distance_squared(p);
                if dl <= dr {
                    self.nearest_in(left, p, best);
                    self.nearest_in(right, p, best);
                } else {
                    self.nearest_in(right, p, best);
                    self.nearest_in(left, p, best);
                }
            }
        }
    }

    /// Containment test by counting surface crossings along a fixed ray.
    ///
    /// Only meaningful for closed meshes.
    pub fn is_inside(&self, point: &Point3<f64>) -> bool {
        // Slightly skewed so the ray rarely grazes shared edges of axis-aligned meshes
        let dir = Vector3::new(1.0, 0.000_123_7, 0.000_271_3).normalize();
        let dir_inv = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let mut crossings = 0usize;
        self.count_crossings(&self.root, point, &dir, &dir_inv, &mut crossings);
        crossings % 2 == 1
    }

    fn count_crossings(
        &self,
        node: &BvhNode,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        dir_inv: &Vector3<f64>,
        count: &mut usize,
    ) {
        if node.aabb().ray_entry(origin, dir_inv).is_none() {
            return;
        }
        match node {
            BvhNode::Leaf { slot, .. } => {
                if ray_triangle_intersect(origin, dir, &self.tris[*slot].tri, self.epsilon)
                    .is_some()
                {
                    *count += 1;
                }
            }
            BvhNode::Internal { left, right, .. } => {
                self.count_crossings(left, origin, dir, dir_inv, count);
                self.count_crossings(right, origin, dir, dir_inv, count);
            }
        }
    }
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Returns the distance along `direction` for hits strictly in front of the
/// origin.
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
    epsilon: f64,
) -> Option<f64> {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Parallel
    if a.abs() < 1e-14 {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    if t > epsilon { Some(t) } else { None }
}
