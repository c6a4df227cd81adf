//! Contact manifold generation for every supported shape pair.
//!
//! Manifold contact points live in the local frame of the reference shape;
//! the solver derives world points each step from the body transforms.

use glam::Vec2;

use crate::{
    collision::{
        clipping::{clip_segment_to_line, ClipVertex},
        shapes::{EdgeShape, PolygonShape, Shape},
    },
    config::{ANGULAR_SLOP, LINEAR_SLOP, POLYGON_RADIUS},
    core::types::Transform,
    utils::math::{cross, cross_vs},
};

/// Which sub-feature of a shape participates in a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Identifies which feature of A met which feature of B at a contact point.
/// Used as the key for matching points across steps when warm-starting the
/// solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactFeature {
    pub type_a: FeatureType,
    pub index_a: u8,
    pub type_b: FeatureType,
    pub index_b: u8,
}

impl ContactFeature {
    pub fn flipped(self) -> Self {
        Self {
            type_a: self.type_b,
            index_a: self.index_b,
            type_b: self.type_a,
            index_b: self.index_a,
        }
    }
}

/// One manifold contact point with its persisted solver impulses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifoldPoint {
    /// Location in the non-reference shape's local frame (for face
    /// manifolds) or the circle center (for circle manifolds).
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub feature: ContactFeature,
}

/// Geometric flavor of a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    /// The reference face belongs to shape A.
    FaceA,
    /// The reference face belongs to shape B.
    FaceB,
}

/// Per-contact geometric summary: type, reference normal/point, and up to two
/// contact points. An empty point set means the shapes are not touching.
#[derive(Debug, Clone, Default)]
pub struct Manifold {
    pub kind: ManifoldType,
    /// Reference-face normal in the reference shape's local frame; unused by
    /// circle manifolds.
    pub local_normal: Vec2,
    /// Reference point (face midpoint or circle A center) in the reference
    /// shape's local frame.
    pub local_point: Vec2,
    points: [ManifoldPoint; 2],
    count: usize,
}

impl Manifold {
    pub fn point_count(&self) -> usize {
        self.count
    }

    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.count]
    }

    pub fn push_point(&mut self, point: ManifoldPoint) {
        debug_assert!(self.count < 2);
        self.points[self.count] = point;
        self.count += 1;
    }

    /// Re-expresses this manifold with the roles of A and B exchanged.
    pub fn flipped(mut self) -> Self {
        match self.kind {
            ManifoldType::Circles => {
                if self.count > 0 {
                    std::mem::swap(&mut self.local_point, &mut self.points[0].local_point);
                }
            }
            ManifoldType::FaceA => self.kind = ManifoldType::FaceB,
            ManifoldType::FaceB => self.kind = ManifoldType::FaceA,
        }
        for point in &mut self.points[..self.count] {
            point.feature = point.feature.flipped();
        }
        self
    }
}

/// World-space view of a manifold: unit normal from A to B, mid-surface
/// points and signed separations per contact point.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldManifold {
    pub normal: Vec2,
    pub points: [Vec2; 2],
    pub separations: [f32; 2],
    pub count: usize,
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = WorldManifold {
            count: manifold.point_count(),
            ..Default::default()
        };
        if manifold.point_count() == 0 {
            return out;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.transform_point(manifold.local_point);
                let point_b = xf_b.transform_point(manifold.points()[0].local_point);
                let mut normal = Vec2::X;
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + radius_a * normal;
                let c_b = point_b - radius_b * normal;
                out.normal = normal;
                out.points[0] = (c_a + c_b) * 0.5;
                out.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.rotate(manifold.local_normal);
                let plane_point = xf_a.transform_point(manifold.local_point);
                for (i, point) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.transform_point(point.local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(normal)) * normal;
                    let c_b = clip_point - radius_b * normal;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_b - c_a).dot(normal);
                }
                out.normal = normal;
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.rotate(manifold.local_normal);
                let plane_point = xf_b.transform_point(manifold.local_point);
                for (i, point) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.transform_point(point.local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Report the normal from A to B.
                out.normal = -normal;
            }
        }
        out
    }
}

/// Builds the manifold for two convex children. Pairs are expected in
/// canonical order (chain/edge/polygon before circle); the swapped orders are
/// handled by flipping, and unsupported pairs (edge against edge or chain)
/// produce an empty manifold.
pub fn evaluate(
    shape_a: &Shape,
    child_a: u32,
    xf_a: &Transform,
    shape_b: &Shape,
    child_b: u32,
    xf_b: &Transform,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle { .. }, Shape::Circle { .. }) => {
            collide_circles(shape_a, xf_a, shape_b, xf_b)
        }
        (Shape::Polygon(polygon), Shape::Circle { .. }) => {
            collide_polygon_circle(polygon, xf_a, shape_b, xf_b)
        }
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(edge), Shape::Circle { .. }) => {
            collide_edge_circle(edge, xf_a, shape_b, xf_b)
        }
        (Shape::Edge(edge), Shape::Polygon(polygon)) => {
            collide_edge_polygon(edge, xf_a, polygon, xf_b)
        }
        (Shape::Chain(_), Shape::Circle { .. }) => {
            let edge = shape_a.chain_child_edge(child_a);
            collide_edge_circle(&edge, xf_a, shape_b, xf_b)
        }
        (Shape::Chain(_), Shape::Polygon(polygon)) => {
            let edge = shape_a.chain_child_edge(child_a);
            collide_edge_polygon(&edge, xf_a, polygon, xf_b)
        }
        // Non-canonical orders: evaluate swapped and flip.
        (Shape::Circle { .. }, Shape::Polygon(_))
        | (Shape::Circle { .. }, Shape::Edge(_))
        | (Shape::Circle { .. }, Shape::Chain(_))
        | (Shape::Polygon(_), Shape::Edge(_))
        | (Shape::Polygon(_), Shape::Chain(_)) => {
            evaluate(shape_b, child_b, xf_b, shape_a, child_a, xf_a).flipped()
        }
        // Edges and chains have no volume; they do not collide together.
        _ => Manifold::default(),
    }
}

fn circle_params(shape: &Shape) -> (Vec2, f32) {
    match shape {
        Shape::Circle { center, radius } => (*center, *radius),
        _ => unreachable!("expected a circle shape"),
    }
}

fn collide_circles(circle_a: &Shape, xf_a: &Transform, circle_b: &Shape, xf_b: &Transform) -> Manifold {
    let (center_a, radius_a) = circle_params(circle_a);
    let (center_b, radius_b) = circle_params(circle_b);

    let p_a = xf_a.transform_point(center_a);
    let p_b = xf_b.transform_point(center_b);
    let total = radius_a + radius_b;
    if p_a.distance_squared(p_b) > total * total {
        return Manifold::default();
    }

    let mut manifold = Manifold {
        kind: ManifoldType::Circles,
        local_normal: Vec2::ZERO,
        local_point: center_a,
        ..Default::default()
    };
    manifold.push_point(ManifoldPoint {
        local_point: center_b,
        ..Default::default()
    });
    manifold
}

fn collide_polygon_circle(
    polygon: &PolygonShape,
    xf_a: &Transform,
    circle: &Shape,
    xf_b: &Transform,
) -> Manifold {
    let (center, circle_radius) = circle_params(circle);

    // Circle center in the polygon's frame.
    let c = xf_a.inv_transform_point(xf_b.transform_point(center));
    let total = POLYGON_RADIUS + circle_radius;

    let vertices = polygon.vertices();
    let normals = polygon.normals();

    let mut separation = f32::NEG_INFINITY;
    let mut normal_index = 0;
    for i in 0..vertices.len() {
        let s = normals[i].dot(c - vertices[i]);
        if s > total {
            return Manifold::default();
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % vertices.len()];

    let face_manifold = |normal: Vec2, point: Vec2| {
        let mut manifold = Manifold {
            kind: ManifoldType::FaceA,
            local_normal: normal,
            local_point: point,
            ..Default::default()
        };
        manifold.push_point(ManifoldPoint {
            local_point: center,
            ..Default::default()
        });
        manifold
    };

    // Center inside the polygon: use the face of max separation directly.
    if separation < f32::EPSILON {
        return face_manifold(normals[normal_index], (v1 + v2) * 0.5);
    }

    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        // Vertex region at v1: the closest feature is a point, so the
        // manifold degrades to the circles form with that vertex as A.
        if c.distance_squared(v1) > total * total {
            return Manifold::default();
        }
        let mut manifold = Manifold {
            kind: ManifoldType::Circles,
            local_point: v1,
            ..Default::default()
        };
        manifold.push_point(ManifoldPoint {
            local_point: center,
            ..Default::default()
        });
        manifold
    } else if u2 <= 0.0 {
        if c.distance_squared(v2) > total * total {
            return Manifold::default();
        }
        let mut manifold = Manifold {
            kind: ManifoldType::Circles,
            local_point: v2,
            ..Default::default()
        };
        manifold.push_point(ManifoldPoint {
            local_point: center,
            ..Default::default()
        });
        manifold
    } else {
        let face_center = (v1 + v2) * 0.5;
        if (c - face_center).dot(normals[normal_index]) > total {
            return Manifold::default();
        }
        face_manifold(normals[normal_index], face_center)
    }
}

/// Largest separation of `poly2`'s hull from any face of `poly1`, with the
/// face index achieving it.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (f32, usize) {
    // Work in poly2's frame.
    let xf = xf2.inv_mul(*xf1);
    let mut best = f32::NEG_INFINITY;
    let mut best_index = 0;
    for (i, (n, v)) in poly1
        .normals()
        .iter()
        .zip(poly1.vertices().iter())
        .enumerate()
    {
        let n = xf.q.rotate(*n);
        let v1 = xf.transform_point(*v);
        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::INFINITY, f32::min);
        if si > best {
            best = si;
            best_index = i;
        }
    }
    (best, best_index)
}

/// The edge of `poly2` most anti-parallel to `poly1`'s reference face normal.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal expressed in poly2's frame.
    let normal1 = xf2.q.inv_rotate(xf1.q.rotate(poly1.normals()[edge1]));

    let mut index = 0;
    let mut min_dot = f32::INFINITY;
    for (i, n) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (index + 1) % poly2.vertices().len();
    [
        ClipVertex {
            v: xf2.transform_point(poly2.vertices()[i1]),
            feature: ContactFeature {
                type_a: FeatureType::Face,
                index_a: edge1 as u8,
                type_b: FeatureType::Vertex,
                index_b: i1 as u8,
            },
        },
        ClipVertex {
            v: xf2.transform_point(poly2.vertices()[i2]),
            feature: ContactFeature {
                type_a: FeatureType::Face,
                index_a: edge1 as u8,
                type_b: FeatureType::Vertex,
                index_b: i2 as u8,
            },
        },
    ]
}

fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let total_radius = 2.0 * POLYGON_RADIUS;

    let (separation_a, edge_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return Manifold::default();
    }
    let (separation_b, edge_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return Manifold::default();
    }

    // The reference face is the one of smallest max-separation, biased so
    // tiny perturbations cannot flip the choice between steps.
    let k_tol = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, kind, flip) =
        if separation_b > 0.98 * separation_a + k_tol {
            (poly_b, xf_b, poly_a, xf_a, edge_b, ManifoldType::FaceB, true)
        } else {
            (poly_a, xf_a, poly_b, xf_b, edge_a, ManifoldType::FaceA, false)
        };

    let incident = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertices().len();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;
    let v11 = poly1.vertices()[iv1];
    let v12 = poly1.vertices()[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.rotate(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    let v11w = xf1.transform_point(v11);
    let v12w = xf1.transform_point(v12);

    let front_offset = normal.dot(v11w);
    let side_offset1 = -tangent.dot(v11w) + total_radius;
    let side_offset2 = tangent.dot(v12w) + total_radius;

    let Some(clip1) = clip_segment_to_line(&incident, -tangent, side_offset1, iv1 as u8) else {
        return Manifold::default();
    };
    let Some(clip2) = clip_segment_to_line(&clip1, tangent, side_offset2, iv2 as u8) else {
        return Manifold::default();
    };

    let mut manifold = Manifold {
        kind,
        local_normal,
        local_point: plane_point,
        ..Default::default()
    };
    for cv in &clip2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            manifold.push_point(ManifoldPoint {
                local_point: xf2.inv_transform_point(cv.v),
                feature: if flip { cv.feature.flipped() } else { cv.feature },
                ..Default::default()
            });
        }
    }
    manifold
}

fn collide_edge_circle(
    edge: &EdgeShape,
    xf_a: &Transform,
    circle: &Shape,
    xf_b: &Transform,
) -> Manifold {
    let (center, circle_radius) = circle_params(circle);

    let q = xf_a.inv_transform_point(xf_b.transform_point(center));
    let a = edge.v1;
    let b = edge.v2;
    let e = b - a;
    let total = POLYGON_RADIUS + circle_radius;

    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let circles_manifold = |local_a: Vec2, index_a: u8| {
        let mut manifold = Manifold {
            kind: ManifoldType::Circles,
            local_point: local_a,
            ..Default::default()
        };
        manifold.push_point(ManifoldPoint {
            local_point: center,
            feature: ContactFeature {
                type_a: FeatureType::Vertex,
                index_a,
                type_b: FeatureType::Vertex,
                index_b: 0,
            },
            ..Default::default()
        });
        manifold
    };

    // Region A: closest to the first vertex.
    if v <= 0.0 {
        if q.distance_squared(a) > total * total {
            return Manifold::default();
        }
        // A leading ghost vertex owns this region; the neighboring segment
        // will produce the contact instead.
        if let Some(v0) = edge.v0 {
            let e1 = a - v0;
            if e1.dot(a - q) > 0.0 {
                return Manifold::default();
            }
        }
        return circles_manifold(a, 0);
    }

    // Region B: closest to the second vertex.
    if u <= 0.0 {
        if q.distance_squared(b) > total * total {
            return Manifold::default();
        }
        if let Some(v3) = edge.v3 {
            let e2 = v3 - b;
            if e2.dot(q - b) > 0.0 {
                return Manifold::default();
            }
        }
        return circles_manifold(b, 1);
    }

    // Interior region: project onto the segment.
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (u * a + v * b) / den;
    if q.distance_squared(p) > total * total {
        return Manifold::default();
    }

    let mut normal = Vec2::new(-e.y, e.x);
    if normal.dot(q - a) < 0.0 {
        normal = -normal;
    }
    let mut manifold = Manifold {
        kind: ManifoldType::FaceA,
        local_normal: normal.normalize(),
        local_point: a,
        ..Default::default()
    };
    manifold.push_point(ManifoldPoint {
        local_point: center,
        feature: ContactFeature {
            type_a: FeatureType::Face,
            index_a: 0,
            type_b: FeatureType::Vertex,
            index_b: 0,
        },
        ..Default::default()
    });
    manifold
}

/// One-sided edge versus polygon. Ghost vertices bound the range of
/// admissible contact normals so interior chain vertices cannot snag.
fn collide_edge_polygon(
    edge: &EdgeShape,
    xf_a: &Transform,
    polygon: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    // Everything below happens in the edge's frame.
    let xf = xf_a.inv_mul(*xf_b);
    let centroid_b = xf.transform_point(polygon.centroid());

    let v1 = edge.v1;
    let v2 = edge.v2;
    let edge1 = (v2 - v1).normalize();
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    let ghost0 = edge.v0.map(|v0| {
        let edge0 = (v1 - v0).normalize();
        let normal0 = Vec2::new(edge0.y, -edge0.x);
        let convex = cross(edge0, edge1) >= 0.0;
        (normal0, normal0.dot(centroid_b - v0), convex)
    });
    let ghost3 = edge.v3.map(|v3| {
        let edge2 = (v3 - v2).normalize();
        let normal2 = Vec2::new(edge2.y, -edge2.x);
        let convex = cross(edge1, edge2) >= 0.0;
        (normal2, normal2.dot(centroid_b - v2), convex)
    });

    // Determine the facing side and the admissible normal range.
    let (front, normal, lower_limit, upper_limit) = match (ghost0, ghost3) {
        (Some((normal0, offset0, convex1)), Some((normal2, offset2, convex2))) => {
            match (convex1, convex2) {
                (true, true) => {
                    let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        (true, normal1, normal0, normal2)
                    } else {
                        (false, -normal1, -normal1, -normal1)
                    }
                }
                (true, false) => {
                    let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                    if front {
                        (true, normal1, normal0, normal1)
                    } else {
                        (false, -normal1, -normal2, -normal1)
                    }
                }
                (false, true) => {
                    let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                    if front {
                        (true, normal1, normal1, normal2)
                    } else {
                        (false, -normal1, -normal1, -normal0)
                    }
                }
                (false, false) => {
                    let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        (true, normal1, normal1, normal1)
                    } else {
                        (false, -normal1, -normal2, -normal0)
                    }
                }
            }
        }
        (Some((normal0, offset0, convex1)), None) => {
            if convex1 {
                let front = offset0 >= 0.0 || offset1 >= 0.0;
                if front {
                    (true, normal1, normal0, -normal1)
                } else {
                    (false, -normal1, normal1, -normal1)
                }
            } else {
                let front = offset0 >= 0.0 && offset1 >= 0.0;
                if front {
                    (true, normal1, normal1, -normal1)
                } else {
                    (false, -normal1, normal1, -normal0)
                }
            }
        }
        (None, Some((normal2, offset2, convex2))) => {
            if convex2 {
                let front = offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal2)
                } else {
                    (false, -normal1, -normal1, normal1)
                }
            } else {
                let front = offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal1)
                } else {
                    (false, -normal1, -normal2, normal1)
                }
            }
        }
        (None, None) => {
            let front = offset1 >= 0.0;
            if front {
                (true, normal1, -normal1, -normal1)
            } else {
                (false, -normal1, normal1, normal1)
            }
        }
    };

    // Polygon B transformed into the edge frame.
    let pb_vertices: Vec<Vec2> = polygon
        .vertices()
        .iter()
        .map(|v| xf.transform_point(*v))
        .collect();
    let pb_normals: Vec<Vec2> = polygon.normals().iter().map(|n| xf.q.rotate(*n)).collect();
    let count_b = pb_vertices.len();

    let radius = 2.0 * POLYGON_RADIUS;

    // Separation along the edge normal.
    let edge_separation = pb_vertices
        .iter()
        .map(|v| normal.dot(*v - v1))
        .fold(f32::INFINITY, f32::min);
    if edge_separation > radius {
        return Manifold::default();
    }

    // Separation along polygon face normals, restricted to the admissible
    // range defined by the ghost vertices.
    let perp = Vec2::new(-normal.y, normal.x);
    let mut polygon_separation = f32::NEG_INFINITY;
    let mut polygon_index = usize::MAX;
    for i in 0..count_b {
        let n = -pb_normals[i];
        let s1 = n.dot(pb_vertices[i] - v1);
        let s2 = n.dot(pb_vertices[i] - v2);
        let s = s1.min(s2);
        if s > radius {
            return Manifold::default();
        }
        if n.dot(perp) >= 0.0 {
            if (n - upper_limit).dot(normal) < -ANGULAR_SLOP {
                continue;
            }
        } else if (n - lower_limit).dot(normal) < -ANGULAR_SLOP {
            continue;
        }
        if s > polygon_separation {
            polygon_separation = s;
            polygon_index = i;
        }
    }

    let use_polygon_face =
        polygon_index != usize::MAX && polygon_separation > 0.98 * edge_separation + 0.001;

    // Reference face data plus the incident segment.
    let (kind, ref_v1, ref_v2, ref_normal, ref_i1, ref_i2, incident) = if use_polygon_face {
        let i1 = polygon_index;
        let i2 = (i1 + 1) % count_b;
        let incident = [
            ClipVertex {
                v: v1,
                feature: ContactFeature {
                    type_a: FeatureType::Vertex,
                    index_a: 0,
                    type_b: FeatureType::Face,
                    index_b: i1 as u8,
                },
            },
            ClipVertex {
                v: v2,
                feature: ContactFeature {
                    type_a: FeatureType::Vertex,
                    index_a: 1,
                    type_b: FeatureType::Face,
                    index_b: i1 as u8,
                },
            },
        ];
        (
            ManifoldType::FaceB,
            pb_vertices[i1],
            pb_vertices[i2],
            pb_normals[i1],
            i1,
            i2,
            incident,
        )
    } else {
        // Incident edge: the polygon face most anti-parallel to the normal.
        let mut best = 0;
        let mut best_dot = f32::INFINITY;
        for (i, n) in pb_normals.iter().enumerate() {
            let dot = normal.dot(*n);
            if dot < best_dot {
                best_dot = dot;
                best = i;
            }
        }
        let i1 = best;
        let i2 = (i1 + 1) % count_b;
        let incident = [
            ClipVertex {
                v: pb_vertices[i1],
                feature: ContactFeature {
                    type_a: FeatureType::Face,
                    index_a: 0,
                    type_b: FeatureType::Vertex,
                    index_b: i1 as u8,
                },
            },
            ClipVertex {
                v: pb_vertices[i2],
                feature: ContactFeature {
                    type_a: FeatureType::Face,
                    index_a: 0,
                    type_b: FeatureType::Vertex,
                    index_b: i2 as u8,
                },
            },
        ];
        let (rv1, rv2, rnormal) = if front {
            (v1, v2, normal1)
        } else {
            (v2, v1, -normal1)
        };
        (ManifoldType::FaceA, rv1, rv2, rnormal, 0, 1, incident)
    };

    let tangent = (ref_v2 - ref_v1).normalize();
    let side_offset1 = -tangent.dot(ref_v1);
    let side_offset2 = tangent.dot(ref_v2);

    let Some(clip1) = clip_segment_to_line(&incident, -tangent, side_offset1, ref_i1 as u8) else {
        return Manifold::default();
    };
    let Some(clip2) = clip_segment_to_line(&clip1, tangent, side_offset2, ref_i2 as u8) else {
        return Manifold::default();
    };

    let mut manifold = match kind {
        ManifoldType::FaceA => Manifold {
            kind,
            local_normal: ref_normal,
            local_point: ref_v1,
            ..Default::default()
        },
        _ => Manifold {
            kind,
            local_normal: polygon.normals()[ref_i1],
            local_point: polygon.vertices()[ref_i1],
            ..Default::default()
        },
    };

    for cv in &clip2 {
        let separation = ref_normal.dot(cv.v - ref_v1);
        if separation <= radius {
            let (local_point, feature) = if use_polygon_face {
                // Contact points live on the edge (shape A): already local.
                (cv.v, cv.feature.flipped())
            } else {
                (xf.inv_transform_point(cv.v), cv.feature)
            };
            manifold.push_point(ManifoldPoint {
                local_point,
                feature,
                ..Default::default()
            });
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn touching_circles_produce_a_circles_manifold() {
        let a = Shape::circle(1.0).unwrap();
        let b = Shape::circle(1.0).unwrap();
        let manifold = evaluate(
            &a,
            0,
            &Transform::IDENTITY,
            &b,
            0,
            &Transform::new(Vec2::new(1.9, 0.0), 0.0),
        );
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert_eq!(manifold.point_count(), 1);

        let world = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            1.0,
            &Transform::new(Vec2::new(1.9, 0.0), 0.0),
            1.0,
        );
        assert_relative_eq!(world.normal.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(world.separations[0], -0.1, epsilon = 1e-5);
    }

    #[test]
    fn separated_circles_produce_nothing() {
        let a = Shape::circle(0.5).unwrap();
        let b = Shape::circle(0.5).unwrap();
        let manifold = evaluate(
            &a,
            0,
            &Transform::IDENTITY,
            &b,
            0,
            &Transform::new(Vec2::new(3.0, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count(), 0);
    }

    #[test]
    fn flush_boxes_clip_to_two_points() {
        let a = Shape::rect(0.5, 0.5).unwrap();
        let b = Shape::rect(0.5, 0.5).unwrap();
        // Side by side, faces flush.
        let manifold = evaluate(
            &a,
            0,
            &Transform::IDENTITY,
            &b,
            0,
            &Transform::new(Vec2::new(0.99, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count(), 2);
        // Both shared corners appear as features, one per clip vertex.
        let features: Vec<ContactFeature> =
            manifold.points().iter().map(|p| p.feature).collect();
        assert_ne!(features[0], features[1]);
    }

    #[test]
    fn box_resting_on_box_reports_face_manifold_with_depth() {
        let a = Shape::rect(2.0, 0.5).unwrap();
        let b = Shape::rect(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 0.95), 0.0);
        let manifold = evaluate(&a, 0, &Transform::IDENTITY, &b, 0, &xf_b);
        assert_eq!(manifold.point_count(), 2);
        let world = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            POLYGON_RADIUS,
            &xf_b,
            POLYGON_RADIUS,
        );
        assert_relative_eq!(world.normal.y.abs(), 1.0, epsilon = 1e-5);
        for i in 0..2 {
            assert!(world.separations[i] < 0.0);
            assert!(world.separations[i] > -0.1);
        }
    }

    #[test]
    fn polygon_circle_vertex_region_degrades_to_circles() {
        let a = Shape::rect(0.5, 0.5).unwrap();
        let b = Shape::circle(0.3).unwrap();
        // Diagonally off the corner (0.5, 0.5).
        let xf_b = Transform::new(Vec2::new(0.7, 0.7), 0.0);
        let manifold = evaluate(&a, 0, &Transform::IDENTITY, &b, 0, &xf_b);
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert_eq!(manifold.point_count(), 1);
        assert_relative_eq!(manifold.local_point.x, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn circle_resting_on_edge_gets_face_manifold() {
        let edge = Shape::edge(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)).unwrap();
        let circle = Shape::circle(1.0).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 0.95), 0.0);
        let manifold = evaluate(&edge, 0, &Transform::IDENTITY, &circle, 0, &xf_b);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert_eq!(manifold.point_count(), 1);
        assert_relative_eq!(manifold.local_normal.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn ghost_vertex_suppresses_end_vertex_contact() {
        // The circle sits past v1, in the region owned by the neighboring
        // segment (ghost v0 present).
        let ghosted = Shape::edge_with_ghosts(
            Some(Vec2::new(-2.0, 0.0)),
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            None,
        )
        .unwrap();
        let circle = Shape::circle(0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(-0.3, 0.3), 0.0);
        let manifold = evaluate(&ghosted, 0, &Transform::IDENTITY, &circle, 0, &xf_b);
        assert_eq!(manifold.point_count(), 0);

        // Without the ghost the same position produces a vertex contact.
        let bare = Shape::edge(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0)).unwrap();
        let manifold = evaluate(&bare, 0, &Transform::IDENTITY, &circle, 0, &xf_b);
        assert_eq!(manifold.point_count(), 1);
    }

    #[test]
    fn box_on_edge_produces_two_points() {
        let edge = Shape::edge(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).unwrap();
        let poly = Shape::rect(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 0.49), 0.0);
        let manifold = evaluate(&edge, 0, &Transform::IDENTITY, &poly, 0, &xf_b);
        assert_eq!(manifold.point_count(), 2);
        let world = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            POLYGON_RADIUS,
            &xf_b,
            POLYGON_RADIUS,
        );
        assert_relative_eq!(world.normal.y, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn swapped_pairs_flip_to_equivalent_manifolds() {
        let poly = Shape::rect(1.0, 1.0).unwrap();
        let circle = Shape::circle(0.5).unwrap();
        let xf_circle = Transform::new(Vec2::new(0.0, 1.4), 0.0);

        let canonical = evaluate(&poly, 0, &Transform::IDENTITY, &circle, 0, &xf_circle);
        let swapped = evaluate(&circle, 0, &xf_circle, &poly, 0, &Transform::IDENTITY);
        assert_eq!(canonical.point_count(), swapped.point_count());
        assert_eq!(canonical.kind, ManifoldType::FaceA);
        assert_eq!(swapped.kind, ManifoldType::FaceB);

        let world_a = WorldManifold::new(
            &canonical,
            &Transform::IDENTITY,
            POLYGON_RADIUS,
            &xf_circle,
            0.5,
        );
        let world_b = WorldManifold::new(&swapped, &xf_circle, 0.5, &Transform::IDENTITY, POLYGON_RADIUS);
        // Normals point from A to B in both cases, so they are opposite.
        assert_relative_eq!(world_a.normal.y, -world_b.normal.y, epsilon = 1e-5);
        assert_relative_eq!(world_a.separations[0], world_b.separations[0], epsilon = 1e-5);
    }
}
