//! Continuous collision: separation functions over swept shapes and the
//! conservative-advancement time-of-impact root finder.

use glam::Vec2;

use crate::{
    collision::{
        narrowphase::{distance, DistanceInput, SimplexCache},
        shapes::DistanceProxy,
    },
    core::types::{Sweep, Transform},
    config::MAX_SHAPE_VERTICES,
    utils::math::{cross_vs, next_after},
};

/// Tuning for one time-of-impact query.
#[derive(Debug, Clone, Copy)]
pub struct ToiConf {
    /// Upper bound of the search interval, in [0, 1].
    pub t_max: f32,
    /// How deep past touching the target separation lies.
    pub target_depth: f32,
    /// Half-width of the acceptance band around the target separation.
    pub tolerance: f32,
    pub max_toi_iters: u32,
    pub max_root_iters: u32,
    pub max_dist_iters: u32,
}

impl Default for ToiConf {
    fn default() -> Self {
        Self {
            t_max: 1.0,
            target_depth: crate::config::LINEAR_SLOP * 3.0,
            tolerance: crate::config::LINEAR_SLOP / 4.0,
            max_toi_iters: 20,
            max_root_iters: 30,
            max_dist_iters: 20,
        }
    }
}

/// Definitive result of a TOI query. Only `Touching` identifies an actual
/// impact time; every other state tells the caller why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    /// Within the target range at the reported time.
    Touching,
    /// Separated beyond the target over the whole interval.
    Separated,
    /// Already closer than the minimum target at the interval start.
    Overlapped,
    /// The root finder fell below the minimum target.
    BelowMinTarget,
    MaxRootIters,
    MaxToiIters,
    MaxDistIters,
    /// Hit the floating-point precision floor between root brackets.
    NextAfter,
    NotFinite,
    /// The requested target depth exceeds the proxies' combined radius.
    TargetDepthExceedsTotalRadius,
}

/// Iteration accounting for a TOI query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToiStats {
    pub toi_iters: u32,
    pub sum_dist_iters: u32,
    pub max_dist_iters: u32,
    pub sum_root_iters: u32,
    pub max_root_iters: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiOutput {
    pub state: ToiState,
    /// The time at which the search stopped; the impact time for `Touching`.
    pub t: f32,
    pub stats: ToiStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SeparationKind {
    /// Vertex on A against vertex on B.
    Points,
    /// Face on A against a vertex on B.
    FaceA,
    /// Face on B against a vertex on A.
    FaceB,
}

/// A 1-D signed separation function along an axis fixed by the winning
/// simplex at the interval start.
struct SeparationFinder<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    kind: SeparationKind,
    /// Face midpoint in the face owner's local frame (face flavors only).
    local_point: Vec2,
    /// Separation axis in the face owner's local frame, oriented so the
    /// separation is positive at the interval start.
    axis: Vec2,
}

impl<'a> SeparationFinder<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        xf_a: &Transform,
        proxy_b: &'a DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let pairs: Vec<(usize, usize)> = cache.index_pairs().collect();
        debug_assert!(!pairs.is_empty() && pairs.len() <= 2);

        if pairs.len() == 1 {
            let point_a = xf_a.transform_point(proxy_a.vertex(pairs[0].0));
            let point_b = xf_b.transform_point(proxy_b.vertex(pairs[0].1));
            return Self {
                proxy_a,
                proxy_b,
                kind: SeparationKind::Points,
                local_point: Vec2::ZERO,
                axis: (point_b - point_a).normalize_or_zero(),
            };
        }

        if pairs[0].0 == pairs[1].0 {
            // Two support points on B: the axis is B's face normal.
            let local_b1 = proxy_b.vertex(pairs[0].1);
            let local_b2 = proxy_b.vertex(pairs[1].1);
            let mut axis = cross_vs(local_b2 - local_b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.rotate(axis);
            let local_point = (local_b1 + local_b2) * 0.5;
            let point_b = xf_b.transform_point(local_point);
            let point_a = xf_a.transform_point(proxy_a.vertex(pairs[0].0));
            if (point_a - point_b).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                kind: SeparationKind::FaceB,
                local_point,
                axis,
            }
        } else {
            // Two support points on A.
            let local_a1 = proxy_a.vertex(pairs[0].0);
            let local_a2 = proxy_a.vertex(pairs[1].0);
            let mut axis = cross_vs(local_a2 - local_a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.rotate(axis);
            let local_point = (local_a1 + local_a2) * 0.5;
            let point_a = xf_a.transform_point(local_point);
            let point_b = xf_b.transform_point(proxy_b.vertex(pairs[0].1));
            if (point_b - point_a).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                kind: SeparationKind::FaceA,
                local_point,
                axis,
            }
        }
    }

    /// Minimum separation over all vertex pairs at the given transforms,
    /// with the pair achieving it.
    fn find_min_separation(&self, xf_a: &Transform, xf_b: &Transform) -> (f32, usize, usize) {
        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.inv_rotate(self.axis);
                let axis_b = xf_b.q.inv_rotate(-self.axis);
                let index_a = self.proxy_a.get_support(axis_a);
                let index_b = self.proxy_b.get_support(axis_b);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let axis_b = xf_b.q.inv_rotate(-normal);
                let index_b = self.proxy_b.get_support(axis_b);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let axis_a = xf_a.q.inv_rotate(-normal);
                let index_a = self.proxy_a.get_support(axis_a);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of a specific vertex pair at the given transforms.
    fn evaluate(
        &self,
        xf_a: &Transform,
        xf_b: &Transform,
        index_a: usize,
        index_b: usize,
    ) -> f32 {
        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Finds the earliest time in `[0, conf.t_max]` at which the swept shapes
/// reach the target separation, by conservative advancement over successive
/// separating axes.
///
/// Success branches report the later bracket time `t2`; covered by the
/// `toi_separated_reports_t2` test.
pub fn time_of_impact(
    proxy_a: &DistanceProxy,
    sweep_a: &Sweep,
    proxy_b: &DistanceProxy,
    sweep_b: &Sweep,
    conf: ToiConf,
) -> ToiOutput {
    let mut stats = ToiStats::default();

    // Large rotations destabilize the root finder; only the relative angle
    // matters.
    let mut sweep_a = *sweep_a;
    let mut sweep_b = *sweep_b;
    sweep_a.normalize();
    sweep_b.normalize();

    let total_radius = proxy_a.radius() + proxy_b.radius();
    if conf.target_depth > total_radius {
        return ToiOutput {
            state: ToiState::TargetDepthExceedsTotalRadius,
            t: 0.0,
            stats,
        };
    }
    let target = total_radius - conf.target_depth;
    let max_target = (target + conf.tolerance).max(0.0);
    let min_target = (target - conf.tolerance).max(0.0);
    if !max_target.is_finite() {
        return ToiOutput {
            state: ToiState::NotFinite,
            t: 0.0,
            stats,
        };
    }

    let mut t1 = 0.0f32;
    let mut xf_a1 = sweep_a.transform(t1);
    let mut xf_b1 = sweep_b.transform(t1);
    let mut cache = SimplexCache::default();

    // Outer loop: one separating axis per iteration, until an axis repeats
    // or the caps hit.
    while stats.toi_iters < conf.max_toi_iters {
        let dinfo = distance(
            &mut cache,
            &DistanceInput {
                proxy_a,
                xf_a: xf_a1,
                proxy_b,
                xf_b: xf_b1,
                use_radii: false,
                max_iterations: conf.max_dist_iters,
            },
        );
        stats.toi_iters += 1;
        stats.sum_dist_iters += dinfo.iterations;
        stats.max_dist_iters = stats.max_dist_iters.max(dinfo.iterations);

        if dinfo.iterations >= conf.max_dist_iters {
            return ToiOutput {
                state: ToiState::MaxDistIters,
                t: t1,
                stats,
            };
        }
        if dinfo.distance < min_target {
            return ToiOutput {
                state: ToiState::Overlapped,
                t: t1,
                stats,
            };
        }
        if dinfo.distance <= max_target {
            return ToiOutput {
                state: ToiState::Touching,
                t: t1,
                stats,
            };
        }

        let fcn = SeparationFinder::new(&cache, proxy_a, &xf_a1, proxy_b, &xf_b1);

        // Push-back loop: resolve the deepest vertex pair at t2, bounded by
        // the vertex count.
        let mut t2 = conf.t_max;
        let mut xf_a2 = sweep_a.transform(t2);
        let mut xf_b2 = sweep_b.transform(t2);

        let mut push_backs = 0;
        while push_backs < MAX_SHAPE_VERTICES {
            push_backs += 1;

            let (s2, index_a, index_b) = fcn.find_min_separation(&xf_a2, &xf_b2);

            if s2 > max_target {
                // Separated over the whole remaining interval. The reported
                // fraction is t2 (always t_max on this branch).
                return ToiOutput {
                    state: ToiState::Separated,
                    t: t2,
                    stats,
                };
            }

            if s2 >= min_target {
                if t2 == t1 {
                    // No progress possible; the real distance at t1 is
                    // already separated.
                    return ToiOutput {
                        state: ToiState::Separated,
                        t: t2,
                        stats,
                    };
                }
                // Advance and search for a fresh axis.
                t1 = t2;
                xf_a1 = xf_a2;
                xf_b1 = xf_b2;
                break;
            }

            let s1 = fcn.evaluate(&xf_a1, &xf_b1, index_a, index_b);
            if s1 < min_target {
                return ToiOutput {
                    state: ToiState::BelowMinTarget,
                    t: t1,
                    stats,
                };
            }
            if s1 <= max_target {
                return ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                    stats,
                };
            }

            // Root-find f(t) = target on [t1, t2], alternating bisection for
            // guaranteed progress with secant for convergence.
            let mut a1 = t1;
            let mut a2 = t2;
            let mut f1 = s1;
            let mut f2 = s2;
            let mut roots = 0u32;
            let mut t = t1;
            loop {
                let state = if roots == conf.max_root_iters {
                    Some(ToiState::MaxRootIters)
                } else if next_after(a1, a2) >= a2 {
                    // The bracket collapsed to adjacent floats.
                    Some(ToiState::NextAfter)
                } else {
                    None
                };
                if let Some(state) = state {
                    stats.sum_root_iters += roots;
                    stats.max_root_iters = stats.max_root_iters.max(roots);
                    return ToiOutput { state, t, stats };
                }

                t = if roots % 2 == 1 {
                    a1 + (target - f1) * (a2 - a1) / (f2 - f1)
                } else {
                    0.5 * (a1 + a2)
                };
                roots += 1;

                let xf_a = sweep_a.transform(t);
                let xf_b = sweep_b.transform(t);
                let f = fcn.evaluate(&xf_a, &xf_b, index_a, index_b);

                if (f - target).abs() <= conf.tolerance {
                    // Use this root as the next push-back endpoint.
                    t2 = t;
                    xf_a2 = xf_a;
                    xf_b2 = xf_b;
                    break;
                }
                if f > target {
                    a1 = t;
                    f1 = f;
                } else {
                    a2 = t;
                    f2 = f;
                }
            }
            stats.sum_root_iters += roots;
            stats.max_root_iters = stats.max_root_iters.max(roots);
        }
    }

    ToiOutput {
        state: ToiState::MaxToiIters,
        t: t1,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::Shape;

    fn stationary(c: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: c,
            c,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    fn moving(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn approaching_circles_touch_at_the_expected_time() {
        let a = Shape::circle(0.5).unwrap();
        let b = Shape::circle(0.5).unwrap();
        let proxy_a = a.distance_proxy(0);
        let proxy_b = b.distance_proxy(0);
        let conf = ToiConf::default();

        let out = time_of_impact(
            &proxy_a,
            &stationary(Vec2::ZERO),
            &proxy_b,
            &moving(Vec2::new(2.0, 0.0), Vec2::ZERO),
            conf,
        );
        assert_eq!(out.state, ToiState::Touching);
        // Centers close 2 m over the step; touching at separation ~1 means
        // roughly halfway.
        let expected = (2.0 - (1.0 - conf.target_depth)) / 2.0;
        assert!(
            (out.t - expected).abs() < 0.01,
            "t = {}, expected about {expected}",
            out.t
        );
    }

    #[test]
    fn toi_separated_reports_t2() {
        let a = Shape::circle(0.5).unwrap();
        let b = Shape::circle(0.5).unwrap();
        let proxy_a = a.distance_proxy(0);
        let proxy_b = b.distance_proxy(0);
        let conf = ToiConf {
            t_max: 0.75,
            ..Default::default()
        };

        let out = time_of_impact(
            &proxy_a,
            &stationary(Vec2::ZERO),
            &proxy_b,
            &moving(Vec2::new(3.0, 0.0), Vec2::new(5.0, 0.0)),
            conf,
        );
        assert_eq!(out.state, ToiState::Separated);
        // The success branch reports t2, which equals t_max here.
        assert_eq!(out.t, 0.75);
    }

    #[test]
    fn initial_overlap_is_reported_at_time_zero() {
        let a = Shape::circle(1.0).unwrap();
        let b = Shape::circle(1.0).unwrap();
        let proxy_a = a.distance_proxy(0);
        let proxy_b = b.distance_proxy(0);

        let out = time_of_impact(
            &proxy_a,
            &stationary(Vec2::ZERO),
            &proxy_b,
            &moving(Vec2::new(0.5, 0.0), Vec2::new(4.0, 0.0)),
            ToiConf::default(),
        );
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn excessive_target_depth_is_rejected() {
        let a = Shape::circle(0.001).unwrap();
        let b = Shape::circle(0.001).unwrap();
        let proxy_a = a.distance_proxy(0);
        let proxy_b = b.distance_proxy(0);
        let out = time_of_impact(
            &proxy_a,
            &stationary(Vec2::ZERO),
            &proxy_b,
            &stationary(Vec2::new(1.0, 0.0)),
            ToiConf {
                target_depth: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(out.state, ToiState::TargetDepthExceedsTotalRadius);
    }

    #[test]
    fn box_sweeping_into_box_yields_touching_before_overlap() {
        let a = Shape::rect(0.5, 0.5).unwrap();
        let b = Shape::rect(0.5, 0.5).unwrap();
        let proxy_a = a.distance_proxy(0);
        let proxy_b = b.distance_proxy(0);

        let out = time_of_impact(
            &proxy_a,
            &stationary(Vec2::ZERO),
            &proxy_b,
            &moving(Vec2::new(5.0, 0.0), Vec2::new(-5.0, 0.0)),
            ToiConf::default(),
        );
        assert_eq!(out.state, ToiState::Touching);
        // Faces meet when center distance reaches ~1; starting at 5 and
        // traveling 10 over the step that is just before t = 0.4.
        assert!(out.t > 0.35 && out.t < 0.41, "t = {}", out.t);
    }
}
