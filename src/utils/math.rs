//! Additional 2-D math helpers layered on top of `glam`.

use glam::Vec2;

/// Two-dimensional cross product (the z component of the 3-D cross).
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (out-of-plane angular quantity) with a vector.
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Cross product of a vector with a scalar.
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// The next representable float after `a` in the direction of `b`.
pub fn next_after(a: f32, b: f32) -> f32 {
    if a < b {
        a.next_up()
    } else if a > b {
        a.next_down()
    } else {
        b
    }
}

/// Normalizes an angle into the [-pi, pi] range.
pub fn normalize_angle(angle: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    let wrapped = angle - two_pi * (angle / two_pi).floor();
    if wrapped > std::f32::consts::PI {
        wrapped - two_pi
    } else {
        wrapped
    }
}

/// Signed 32-bit fixed-point scalar with a configurable number of fraction
/// bits.
///
/// Provides the arithmetic and transcendental operations the engine requires
/// of a scalar (`sqrt`, `sin`, `cos`, `atan2`, total ordering) without any
/// platform-dependent float semantics. Arithmetic widens through `i64` so
/// intermediate products cannot wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed<const FRAC: u32>(i32);

impl<const FRAC: u32> Fixed<FRAC> {
    pub const SCALE: i32 = 1 << FRAC;

    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(Self::SCALE);
    pub const PI: Self = Self((std::f64::consts::PI * (1u64 << FRAC) as f64) as i32);

    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn from_int(value: i32) -> Self {
        Self(value.saturating_mul(Self::SCALE))
    }

    pub fn from_f32(value: f32) -> Self {
        Self((value as f64 * Self::SCALE as f64) as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Non-negative square root via integer Newton iteration on the widened
    /// representation. Returns zero for negative inputs.
    pub fn sqrt(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        let widened = (self.0 as i64) << FRAC;
        let mut guess = widened;
        let mut prev = 0i64;
        while guess != prev && guess != 0 {
            prev = guess;
            guess = (guess + widened / guess) / 2;
        }
        Self(guess as i32)
    }

    /// Sine by rational approximation after range reduction to [-pi, pi].
    /// Accurate to about three decimal places at 16 fraction bits.
    pub fn sin(self) -> Self {
        let x = self.reduce_angle();
        // Bhaskara I: sin(x) ~= 16x(pi - x) / (5pi^2 - 4x(pi - x)) on [0, pi].
        let (x, negate) = if x.0 < 0 { (Self(-x.0), true) } else { (x, false) };
        let pi = Self::PI;
        let a = x.mul(pi.sub(x));
        let num = a.mul_int(16);
        let den = pi.mul(pi).mul_int(5).sub(a.mul_int(4));
        if den.0 == 0 {
            return Self::ZERO;
        }
        let result = num.div(den);
        if negate {
            Self(-result.0)
        } else {
            result
        }
    }

    pub fn cos(self) -> Self {
        Self(Self::PI.0 / 2).sub(self).sin()
    }

    /// Four-quadrant arctangent using a rational approximation of atan on
    /// [0, 1] plus octant folding.
    pub fn atan2(self, x: Self) -> Self {
        let y = self;
        let pi = Self::PI;
        let half_pi = Self(pi.0 / 2);
        if x.0 == 0 {
            return match y.0.cmp(&0) {
                std::cmp::Ordering::Greater => half_pi,
                std::cmp::Ordering::Less => Self(-half_pi.0),
                std::cmp::Ordering::Equal => Self::ZERO,
            };
        }
        let abs_y = y.abs();
        let abs_x = x.abs();
        let (ratio, swapped) = if abs_y.0 <= abs_x.0 {
            (abs_y.div(abs_x), false)
        } else {
            (abs_x.div(abs_y), true)
        };
        // atan(r) ~= r * (pi/4 + 0.273 * (1 - r)) for r in [0, 1].
        let quarter_pi = Self(pi.0 / 4);
        let k = Self::from_f32(0.273);
        let mut angle = ratio.mul(quarter_pi.add(k.mul(Self::ONE.sub(ratio))));
        if swapped {
            angle = half_pi.sub(angle);
        }
        if x.0 < 0 {
            angle = pi.sub(angle);
        }
        if y.0 < 0 {
            angle = Self(-angle.0);
        }
        angle
    }

    pub fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i64 * rhs.0 as i64) >> FRAC;
        Self(wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    pub fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return if self.0 >= 0 {
                Self(i32::MAX)
            } else {
                Self(i32::MIN)
            };
        }
        let wide = ((self.0 as i64) << FRAC) / rhs.0 as i64;
        Self(wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    fn mul_int(self, rhs: i32) -> Self {
        Self(self.0.saturating_mul(rhs))
    }

    fn reduce_angle(self) -> Self {
        let two_pi = Self::PI.0.wrapping_mul(2);
        let mut x = self.0 % two_pi;
        if x > Self::PI.0 {
            x -= two_pi;
        } else if x < -Self::PI.0 {
            x += two_pi;
        }
        Self(x)
    }
}

impl<const FRAC: u32> std::ops::Add for Fixed<FRAC> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Fixed::add(self, rhs)
    }
}

impl<const FRAC: u32> std::ops::Sub for Fixed<FRAC> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Fixed::sub(self, rhs)
    }
}

impl<const FRAC: u32> std::ops::Mul for Fixed<FRAC> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Fixed::mul(self, rhs)
    }
}

impl<const FRAC: u32> std::ops::Div for Fixed<FRAC> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Fixed::div(self, rhs)
    }
}

impl<const FRAC: u32> std::ops::Neg for Fixed<FRAC> {
    type Output = Self;
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Fx = Fixed<16>;

    #[test]
    fn cross_products_are_consistent() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, 4.0);
        assert!((cross(a, b) - a.perp_dot(b)).abs() < 1e-6);
        assert_eq!(cross_sv(1.0, Vec2::X), Vec2::Y);
        assert_eq!(cross_vs(Vec2::X, 1.0), -Vec2::Y);
    }

    #[test]
    fn next_after_moves_one_ulp() {
        let a = 1.0f32;
        let up = next_after(a, 2.0);
        assert!(up > a);
        assert_eq!(next_after(up, 0.0), a);
        assert_eq!(next_after(a, a), a);
    }

    #[test]
    fn fixed_round_trips_and_arithmetic() {
        let a = Fx::from_f32(1.5);
        let b = Fx::from_f32(-2.25);
        assert!((a.to_f32() - 1.5).abs() < 1e-4);
        assert!(((a + b).to_f32() + 0.75).abs() < 1e-4);
        assert!(((a * b).to_f32() + 3.375).abs() < 1e-3);
        assert!(((b / a).to_f32() + 1.5).abs() < 1e-3);
    }

    #[test]
    fn fixed_sqrt_converges() {
        let x = Fx::from_int(9);
        assert!((x.sqrt().to_f32() - 3.0).abs() < 1e-3);
        let x = Fx::from_f32(2.0);
        assert!((x.sqrt().to_f32() - std::f32::consts::SQRT_2).abs() < 1e-3);
        assert_eq!(Fx::from_int(-4).sqrt(), Fx::ZERO);
    }

    #[test]
    fn fixed_trig_tracks_float_trig() {
        for i in -8..=8 {
            let angle = i as f32 * 0.4;
            let fx = Fx::from_f32(angle);
            assert!((fx.sin().to_f32() - angle.sin()).abs() < 0.01, "sin({angle})");
            assert!((fx.cos().to_f32() - angle.cos()).abs() < 0.01, "cos({angle})");
        }
        let a = Fx::from_f32(1.0).atan2(Fx::from_f32(1.0));
        assert!((a.to_f32() - std::f32::consts::FRAC_PI_4).abs() < 0.01);
        let a = Fx::from_f32(-1.0).atan2(Fx::from_f32(-1.0));
        assert!((a.to_f32() + 3.0 * std::f32::consts::FRAC_PI_4).abs() < 0.02);
    }
}
