//! GJK distance between convex shapes with simplex-cache warm starting.

use glam::Vec2;

use crate::{
    collision::shapes::DistanceProxy,
    core::types::Transform,
    utils::math::{cross, cross_sv, cross_vs},
};

const EPSILON: f32 = 1e-6;

/// One simplex vertex: a support point on each proxy plus their difference in
/// world space and the barycentric weight assigned by the solver.
#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point on proxy A in world coordinates.
    w_a: Vec2,
    /// Support point on proxy B in world coordinates.
    w_b: Vec2,
    /// `w_b - w_a`.
    w: Vec2,
    /// Barycentric weight; the weights of a solved simplex sum to one.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

/// Snapshot of a solved simplex used to warm-start the next distance query
/// on the same proxy pair. The metric and index pairs are always written
/// together.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexCache {
    metric: f32,
    count: usize,
    index_a: [u8; 3],
    index_b: [u8; 3],
}

impl SimplexCache {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn metric(&self) -> f32 {
        self.metric
    }

    /// The cached support-index pairs of the winning simplex.
    pub fn index_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.count).map(|i| (self.index_a[i] as usize, self.index_b[i] as usize))
    }
}

/// Distance query input: a convex child per side with its world transform.
#[derive(Debug, Clone, Copy)]
pub struct DistanceInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub xf_a: Transform,
    pub proxy_b: &'a DistanceProxy,
    pub xf_b: Transform,
    /// Subtract the proxies' vertex radii from the reported points/distance.
    pub use_radii: bool,
    pub max_iterations: u32,
}

/// Closest points, their separation, and how many GJK iterations were spent.
#[derive(Debug, Clone, Copy)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: u32,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut simplex = Simplex::default();

        // Rebuild the cached simplex in the current transforms.
        if cache.count > 0 {
            for i in 0..cache.count {
                let index_a = cache.index_a[i] as usize;
                let index_b = cache.index_b[i] as usize;
                if index_a >= proxy_a.count() || index_b >= proxy_b.count() {
                    simplex.count = 0;
                    break;
                }
                let w_a = xf_a.transform_point(proxy_a.vertex(index_a));
                let w_b = xf_b.transform_point(proxy_b.vertex(index_b));
                simplex.v[i] = SimplexVertex {
                    w_a,
                    w_b,
                    w: w_b - w_a,
                    a: 0.0,
                    index_a,
                    index_b,
                };
                simplex.count = i + 1;
            }

            // A stale cache whose metric no longer matches gets discarded.
            if simplex.count > 1 {
                let metric1 = cache.metric;
                let metric2 = simplex.metric();
                if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < EPSILON {
                    simplex.count = 0;
                }
            }
        }

        if simplex.count == 0 {
            let w_a = xf_a.transform_point(proxy_a.vertex(0));
            let w_b = xf_b.transform_point(proxy_b.vertex(0));
            simplex.v[0] = SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 1.0,
                index_a: 0,
                index_b: 0,
            };
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].w_a, self.v[0].w_b),
            2 => (
                self.v[0].a * self.v[0].w_a + self.v[1].a * self.v[1].w_a,
                self.v[0].a * self.v[0].w_b + self.v[1].a * self.v[1].w_b,
            ),
            3 => {
                let p = self.v[0].a * self.v[0].w_a
                    + self.v[1].a * self.v[1].w_a
                    + self.v[2].a * self.v[2].w_a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            1 => 0.0,
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest-point solve for a 1-simplex (a segment): reduce to the
    /// Voronoi region of the origin.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest-point solve for a 2-simplex (a triangle) via the origin's
    /// Voronoi region, using signed triangle areas for the face weights.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // Vertex 1 region.
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 1-2 region.
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }
        // Edge 1-3 region.
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }
        // Vertex 2 region.
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Vertex 3 region.
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[0] = self.v[2];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 2-3 region.
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }
        // Interior: the origin is inside the triangle.
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Computes the closest points between two convex proxies, warm-started from
/// (and writing back to) `cache`.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput<'_>) -> DistanceOutput {
    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;
    let xf_a = input.xf_a;
    let xf_b = input.xf_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, &xf_a, proxy_b, &xf_b);

    let mut iterations = 0;
    let mut saved_a = [0usize; 3];
    let mut saved_b = [0usize; 3];

    while iterations < input.max_iterations {
        // Remember the current simplex so new support points can be checked
        // for duplication (no progress).
        let saved_count = simplex.count;
        for i in 0..saved_count {
            saved_a[i] = simplex.v[i].index_a;
            saved_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            1 => {}
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => unreachable!(),
        }

        // A full simplex contains the origin: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < EPSILON * EPSILON {
            // The origin sits on an edge or vertex of the simplex. Touching,
            // but not overlapping; witness points remain valid.
            break;
        }

        let index_a = proxy_a.get_support(xf_a.q.inv_rotate(-d));
        let index_b = proxy_b.get_support(xf_b.q.inv_rotate(d));
        let w_a = xf_a.transform_point(proxy_a.vertex(index_a));
        let w_b = xf_b.transform_point(proxy_b.vertex(index_b));

        iterations += 1;

        let duplicate = (0..saved_count).any(|i| saved_a[i] == index_a && saved_b[i] == index_b);
        if duplicate {
            break;
        }

        let vertex = &mut simplex.v[simplex.count];
        *vertex = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius();
        let r_b = proxy_b.radius();
        if dist > r_a + r_b && dist > EPSILON {
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        } else {
            let mid = (point_a + point_b) * 0.5;
            point_a = mid;
            point_b = mid;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}
