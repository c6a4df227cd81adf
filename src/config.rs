//! Global configuration constants and the per-step configuration struct.

use serde::{Deserialize, Serialize};

/// Collision and constraint tolerance. Chosen to be numerically significant
/// but visually insignificant.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular analogue of [`LINEAR_SLOP`] (2 degrees).
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * std::f32::consts::PI;

/// Amount by which broad-phase AABBs are fattened beyond the tight shape
/// bounds, so that small movements need no tree update.
pub const AABB_EXTENSION: f32 = LINEAR_SLOP * 20.0;

/// Predicted-displacement multiplier applied when re-fattening a moved proxy.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Rounding radius carried by polygons and edges so that GJK operates on
/// slightly shrunken cores.
pub const POLYGON_RADIUS: f32 = LINEAR_SLOP * 2.0;

/// Maximum vertices accepted on a single polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Maximum contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Upper bound on vertices of any convex child shape; bounds the TOI
/// push-back loop.
pub const MAX_SHAPE_VERTICES: usize = 254;

/// Default gravity vector (Y-up).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, -9.81];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Per-step configuration. Field defaults reproduce the reference tuning;
/// everything is adjustable per call to `World::step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConf {
    /// Simulation delta time; drives integration and TOI.
    pub delta_time: f32,
    /// Velocity iterations for the regular solve phase.
    pub reg_velocity_iters: u32,
    /// Position iterations for the regular solve phase.
    pub reg_position_iters: u32,
    /// Velocity iterations for TOI mini-island solves.
    pub toi_velocity_iters: u32,
    /// Position iterations for TOI mini-island solves.
    pub toi_position_iters: u32,
    /// Outer TOI iterations per contact pair.
    pub max_toi_iters: u32,
    /// TOI root-finder iterations per separating axis.
    pub max_root_iters: u32,
    /// GJK distance iterations.
    pub max_distance_iters: u32,
    /// Total TOI islands solved per step.
    pub max_substeps: u32,
    pub linear_slop: f32,
    pub angular_slop: f32,
    /// Fat-AABB extension used when (re)inserting proxies.
    pub aabb_extension: f32,
    /// Relative normal velocity below which restitution is clamped to zero.
    pub velocity_threshold: f32,
    /// Per-position-iteration correction cap.
    pub max_linear_correction: f32,
    pub max_angular_correction: f32,
    /// Per-step integration caps.
    pub max_translation: f32,
    pub max_rotation: f32,
    /// Position-correction factor for the regular phase.
    pub baumgarte: f32,
    /// Position-correction factor for the TOI phase.
    pub toi_baumgarte: f32,
    pub allow_sleep: bool,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    /// Seconds a body must remain under the sleep tolerances before its
    /// island may be put to sleep.
    pub min_still_time_to_sleep: f32,
    /// Skip the solver warm-start phase when false.
    pub do_warm_start: bool,
    /// Enable the continuous-collision sub-step loop.
    pub do_toi: bool,
    /// Enable the simultaneous 2-point block solver.
    pub do_blocksolve: bool,
}

impl Default for StepConf {
    fn default() -> Self {
        Self {
            delta_time: DEFAULT_TIME_STEP,
            reg_velocity_iters: 8,
            reg_position_iters: 3,
            toi_velocity_iters: 8,
            toi_position_iters: 20,
            max_toi_iters: 20,
            max_root_iters: 30,
            max_distance_iters: 20,
            max_substeps: 8,
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            aabb_extension: AABB_EXTENSION,
            velocity_threshold: 1.0,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * std::f32::consts::PI,
            max_translation: 2.0,
            max_rotation: std::f32::consts::FRAC_PI_2,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            allow_sleep: true,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * std::f32::consts::PI,
            min_still_time_to_sleep: 0.5,
            do_warm_start: true,
            do_toi: true,
            do_blocksolve: true,
        }
    }
}

impl StepConf {
    pub fn with_delta_time(mut self, dt: f32) -> Self {
        self.delta_time = dt;
        self
    }

    /// Target separation depth the TOI root finder aims for.
    pub fn target_depth(&self) -> f32 {
        self.linear_slop * 3.0
    }

    /// Tolerance band around the TOI target separation.
    pub fn toi_tolerance(&self) -> f32 {
        self.linear_slop / 4.0
    }

    pub fn inv_delta_time(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }
}
