//! Convex shape definitions and the distance-proxy view the narrow phase
//! consumes.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    collision::{Aabb, RayCastInput, RayCastOutput},
    config::{MAX_POLYGON_VERTICES, POLYGON_RADIUS},
    core::{
        types::{MassData, Transform},
        PhysicsError,
    },
    utils::math::cross,
};

/// Convex polygon with precomputed edge normals and centroid. Vertices wind
/// counter-clockwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonShape {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    centroid: Vec2,
}

/// Line segment, optionally flanked by ghost vertices that make it one-sided
/// when it is part of a larger surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeShape {
    pub v1: Vec2,
    pub v2: Vec2,
    /// Ghost vertex preceding `v1` on the surface, if any.
    pub v0: Option<Vec2>,
    /// Ghost vertex following `v2` on the surface, if any.
    pub v3: Option<Vec2>,
}

/// Polyline whose children are its segments, each with ghost vertices taken
/// from its neighbors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainShape {
    vertices: Vec<Vec2>,
}

/// Supported collision geometries. Shapes are immutable after construction
/// and may be shared between fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    Circle { center: Vec2, radius: f32 },
    Polygon(PolygonShape),
    Edge(EdgeShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn circle(radius: f32) -> Result<Self, PhysicsError> {
        Self::circle_at(Vec2::ZERO, radius)
    }

    pub fn circle_at(center: Vec2, radius: f32) -> Result<Self, PhysicsError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::InvalidArgument("circle radius must be positive"));
        }
        Ok(Self::Circle { center, radius })
    }

    /// Builds a convex polygon from the given points. Welds near-coincident
    /// points, computes the convex hull, and rejects degenerate input.
    pub fn polygon(points: &[Vec2]) -> Result<Self, PhysicsError> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::CapacityExceeded("too many polygon vertices"));
        }
        let hull = convex_hull(points)?;
        let n = hull.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = hull[(i + 1) % n] - hull[i];
            if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return Err(PhysicsError::InvalidArgument("polygon has a zero-length edge"));
            }
            normals.push(Vec2::new(edge.y, -edge.x).normalize());
        }
        let centroid = polygon_centroid(&hull);
        Ok(Self::Polygon(PolygonShape {
            vertices: hull,
            normals,
            centroid,
        }))
    }

    /// Axis-aligned box centered on the local origin.
    pub fn rect(half_width: f32, half_height: f32) -> Result<Self, PhysicsError> {
        if !(half_width > 0.0 && half_height > 0.0) {
            return Err(PhysicsError::InvalidArgument("box half-extents must be positive"));
        }
        Self::polygon(&[
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ])
    }

    pub fn edge(v1: Vec2, v2: Vec2) -> Result<Self, PhysicsError> {
        if v1.distance_squared(v2) <= f32::EPSILON {
            return Err(PhysicsError::InvalidArgument("edge vertices coincide"));
        }
        Ok(Self::Edge(EdgeShape {
            v1,
            v2,
            v0: None,
            v3: None,
        }))
    }

    pub fn edge_with_ghosts(
        v0: Option<Vec2>,
        v1: Vec2,
        v2: Vec2,
        v3: Option<Vec2>,
    ) -> Result<Self, PhysicsError> {
        if v1.distance_squared(v2) <= f32::EPSILON {
            return Err(PhysicsError::InvalidArgument("edge vertices coincide"));
        }
        Ok(Self::Edge(EdgeShape { v1, v2, v0, v3 }))
    }

    pub fn chain(vertices: &[Vec2]) -> Result<Self, PhysicsError> {
        if vertices.len() < 2 {
            return Err(PhysicsError::InvalidArgument("chain needs at least two vertices"));
        }
        for pair in vertices.windows(2) {
            if pair[0].distance_squared(pair[1]) <= f32::EPSILON {
                return Err(PhysicsError::InvalidArgument("chain has coincident vertices"));
            }
        }
        Ok(Self::Chain(ChainShape {
            vertices: vertices.to_vec(),
        }))
    }

    /// Number of convex children this shape decomposes into.
    pub fn child_count(&self) -> u32 {
        match self {
            Shape::Circle { .. } | Shape::Polygon(_) | Shape::Edge(_) => 1,
            Shape::Chain(chain) => (chain.vertices.len() - 1) as u32,
        }
    }

    /// Rounding radius carried by the given child.
    pub fn vertex_radius(&self) -> f32 {
        match self {
            Shape::Circle { radius, .. } => *radius,
            Shape::Polygon(_) | Shape::Edge(_) | Shape::Chain(_) => POLYGON_RADIUS,
        }
    }

    /// View over one convex child for the distance and TOI algorithms.
    pub fn distance_proxy(&self, child: u32) -> DistanceProxy {
        match self {
            Shape::Circle { center, radius } => {
                DistanceProxy::new(&[*center], *radius)
            }
            Shape::Polygon(polygon) => DistanceProxy::new(&polygon.vertices, POLYGON_RADIUS),
            Shape::Edge(edge) => DistanceProxy::new(&[edge.v1, edge.v2], POLYGON_RADIUS),
            Shape::Chain(chain) => {
                let i = child as usize;
                DistanceProxy::new(&chain.vertices[i..i + 2], POLYGON_RADIUS)
            }
        }
    }

    /// The edge geometry of a chain child, ghosts included.
    pub fn chain_child_edge(&self, child: u32) -> EdgeShape {
        match self {
            Shape::Chain(chain) => {
                let i = child as usize;
                EdgeShape {
                    v1: chain.vertices[i],
                    v2: chain.vertices[i + 1],
                    v0: (i > 0).then(|| chain.vertices[i - 1]),
                    v3: chain.vertices.get(i + 2).copied(),
                }
            }
            _ => panic!("chain_child_edge called on a non-chain shape"),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: u32) -> Aabb {
        match self {
            Shape::Circle { center, radius } => {
                let p = xf.transform_point(*center);
                Aabb::new(p - Vec2::splat(*radius), p + Vec2::splat(*radius))
            }
            Shape::Polygon(polygon) => {
                let mut aabb = Aabb::EMPTY;
                for v in &polygon.vertices {
                    let p = xf.transform_point(*v);
                    aabb = aabb.union(&Aabb::new(p, p));
                }
                aabb.fattened(POLYGON_RADIUS)
            }
            Shape::Edge(edge) => {
                let p1 = xf.transform_point(edge.v1);
                let p2 = xf.transform_point(edge.v2);
                Aabb::from_points(p1, p2).fattened(POLYGON_RADIUS)
            }
            Shape::Chain(chain) => {
                let i = child as usize;
                let p1 = xf.transform_point(chain.vertices[i]);
                let p2 = xf.transform_point(chain.vertices[i + 1]);
                Aabb::from_points(p1, p2).fattened(POLYGON_RADIUS)
            }
        }
    }

    /// Mass properties at the given density. Edges and chains have no area
    /// and report zero mass.
    pub fn mass_data(&self, density: f32) -> MassData {
        match self {
            Shape::Circle { center, radius } => {
                let mass = density * std::f32::consts::PI * radius * radius;
                MassData {
                    mass,
                    center: *center,
                    inertia: mass * (0.5 * radius * radius + center.length_squared()),
                }
            }
            Shape::Polygon(polygon) => polygon_mass_data(&polygon.vertices, density),
            Shape::Edge(edge) => MassData {
                mass: 0.0,
                center: (edge.v1 + edge.v2) * 0.5,
                inertia: 0.0,
            },
            Shape::Chain(_) => MassData::default(),
        }
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        match self {
            Shape::Circle { center, radius } => {
                xf.transform_point(*center).distance_squared(point) <= radius * radius
            }
            Shape::Polygon(polygon) => {
                let local = xf.inv_transform_point(point);
                polygon
                    .vertices
                    .iter()
                    .zip(polygon.normals.iter())
                    .all(|(v, n)| n.dot(local - *v) <= 0.0)
            }
            // Edges and chains enclose no area.
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: u32,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle { center, radius } => ray_cast_circle(input, xf, *center, *radius),
            Shape::Polygon(polygon) => ray_cast_polygon(input, xf, polygon),
            Shape::Edge(edge) => ray_cast_segment(input, xf, edge.v1, edge.v2),
            Shape::Chain(chain) => {
                let i = child as usize;
                ray_cast_segment(input, xf, chain.vertices[i], chain.vertices[i + 1])
            }
        }
    }
}

impl PolygonShape {
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }
}

/// Snapshot of one convex child: its vertices (inline, bounded by the
/// polygon vertex cap) and rounding radius.
#[derive(Debug, Clone, Copy)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    radius: f32,
}

impl DistanceProxy {
    pub fn new(vertices: &[Vec2], radius: f32) -> Self {
        debug_assert!(!vertices.is_empty() && vertices.len() <= MAX_POLYGON_VERTICES);
        let mut storage = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        storage[..vertices.len()].copy_from_slice(vertices);
        Self {
            vertices: storage,
            count: vertices.len(),
            radius,
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Index of the vertex with the largest projection onto `direction`.
    pub fn get_support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_dot = self.vertices[0].dot(direction);
        for (i, v) in self.vertices().iter().enumerate().skip(1) {
            let dot = v.dot(direction);
            if dot > best_dot {
                best_dot = dot;
                best = i;
            }
        }
        best
    }
}

fn convex_hull(points: &[Vec2]) -> Result<Vec<Vec2>, PhysicsError> {
    // Weld points closer than half the linear slop.
    let weld_dist_sq = (0.5 * crate::config::LINEAR_SLOP).powi(2);
    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if !p.x.is_finite() || !p.y.is_finite() {
            return Err(PhysicsError::InvalidArgument("polygon vertex is not finite"));
        }
        if unique.iter().all(|q| q.distance_squared(*p) > weld_dist_sq) {
            unique.push(*p);
        }
    }
    if unique.len() < 3 {
        return Err(PhysicsError::InvalidArgument(
            "polygon needs at least three distinct vertices",
        ));
    }

    // Gift wrapping from the rightmost point.
    let start = unique
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| (a.x, a.y).partial_cmp(&(b.x, b.y)).unwrap())
        .map(|(i, _)| i)
        .unwrap();
    let mut hull_indices = Vec::with_capacity(unique.len());
    let mut current = start;
    loop {
        hull_indices.push(current);
        let mut next = 0;
        for candidate in 1..unique.len() {
            if next == current {
                next = candidate;
                continue;
            }
            let r = unique[next] - unique[current];
            let v = unique[candidate] - unique[current];
            let c = cross(r, v);
            if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                next = candidate;
            }
        }
        current = next;
        if current == start {
            break;
        }
        if hull_indices.len() > unique.len() {
            return Err(PhysicsError::InvalidArgument("polygon hull failed to close"));
        }
    }
    if hull_indices.len() < 3 {
        return Err(PhysicsError::InvalidArgument("polygon vertices are collinear"));
    }
    Ok(hull_indices.into_iter().map(|i| unique[i]).collect())
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let reference = vertices[0];
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - reference;
        let e2 = vertices[i + 1] - reference;
        let tri_area = 0.5 * cross(e1, e2);
        area += tri_area;
        c += tri_area * (e1 + e2) / 3.0;
    }
    reference + if area.abs() > f32::EPSILON { c / area } else { Vec2::ZERO }
}

fn polygon_mass_data(vertices: &[Vec2], density: f32) -> MassData {
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let mut inertia = 0.0;
    let reference = vertices[0];
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - reference;
        let e2 = vertices[i + 1] - reference;
        let d = cross(e1, e2);
        let tri_area = 0.5 * d;
        area += tri_area;
        center += tri_area * (e1 + e2) / 3.0;
        let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 / 3.0) * d * (intx2 + inty2);
    }
    let mass = density * area;
    center = reference + if area.abs() > f32::EPSILON { center / area } else { Vec2::ZERO };
    // Inertia was taken about the reference vertex; shift to the local origin.
    let about_origin = density * inertia
        + mass * (center.length_squared() - (center - reference).length_squared());
    MassData {
        mass,
        center,
        inertia: about_origin,
    }
}

fn ray_cast_circle(
    input: &RayCastInput,
    xf: &Transform,
    center: Vec2,
    radius: f32,
) -> Option<RayCastOutput> {
    let position = xf.transform_point(center);
    let s = input.p1 - position;
    let b = s.length_squared() - radius * radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.length_squared();
    let sigma = c * c - rr * b;
    if sigma < 0.0 || rr < f32::EPSILON {
        return None;
    }
    let t = -(c + sigma.sqrt());
    if t >= 0.0 && t <= input.max_fraction * rr {
        let fraction = t / rr;
        let normal = (s + fraction * r).normalize_or_zero();
        return Some(RayCastOutput { normal, fraction });
    }
    None
}

fn ray_cast_polygon(
    input: &RayCastInput,
    xf: &Transform,
    polygon: &PolygonShape,
) -> Option<RayCastOutput> {
    let p1 = xf.inv_transform_point(input.p1);
    let p2 = xf.inv_transform_point(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0f32;
    let mut upper = input.max_fraction;
    let mut index = None;

    for i in 0..polygon.vertices.len() {
        let normal = polygon.normals[i];
        let numerator = normal.dot(polygon.vertices[i] - p1);
        let denominator = normal.dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else {
            let t = numerator / denominator;
            if denominator < 0.0 && t > lower {
                lower = t;
                index = Some(i);
            } else if denominator > 0.0 && t < upper {
                upper = t;
            }
        }
        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastOutput {
        normal: xf.q.rotate(polygon.normals[i]),
        fraction: lower,
    })
}

fn ray_cast_segment(
    input: &RayCastInput,
    xf: &Transform,
    v1: Vec2,
    v2: Vec2,
) -> Option<RayCastOutput> {
    let p1 = xf.inv_transform_point(input.p1);
    let p2 = xf.inv_transform_point(input.p2);
    let d = p2 - p1;

    let e = v2 - v1;
    let normal = Vec2::new(e.y, -e.x).normalize_or_zero();

    // p1 + t * d = v1 + s * e
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }
    let t = normal.dot(v1 - p1) / denominator;
    if t < 0.0 || t > input.max_fraction {
        return None;
    }
    let hit = p1 + t * d;
    let ee = e.length_squared();
    if ee == 0.0 {
        return None;
    }
    let s = (hit - v1).dot(e) / ee;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    // Report the normal facing the ray origin.
    let normal = if normal.dot(d) > 0.0 { -normal } else { normal };
    Some(RayCastOutput {
        normal: xf.q.rotate(normal),
        fraction: t,
    })
}
