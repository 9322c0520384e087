//! Parameter ramps with cancel-and-replace semantics
//!
//! Every audible change (volume, position) goes through a ramp so nothing
//! jumps between ticks. Starting a new ramp always begins from the value the
//! old ramp had reached, so two ramps on the same parameter can never fight.

use glam::Vec3;

/// Fade curve types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    /// Straight line between start and target
    #[default]
    Linear,
    /// Quarter-sine shape (constant perceived power in crossfades)
    EqualPower,
    /// Square-root shape (fast start, gentle landing)
    Logarithmic,
}

impl FadeCurve {
    /// Map linear progress (0.0 to 1.0) onto the curve
    ///
    /// All curves are monotonically non-decreasing with `shape(0) == 0` and
    /// `shape(1) == 1`, so a ramp never overshoots its target.
    pub fn shape(&self, progress: f32) -> f32 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * std::f32::consts::FRAC_PI_2).sin(),
            FadeCurve::Logarithmic => t.sqrt(),
        }
    }

    /// Calculate volumes for fade-out and fade-in at a given progress (0.0 to 1.0)
    pub fn crossfade_volumes(&self, progress: f32) -> (f32, f32) {
        let t = progress.clamp(0.0, 1.0);
        (self.shape(1.0 - t), self.shape(t))
    }
}

/// A scalar ramp toward a target value
#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    from: f32,
    to: f32,
    current: f32,
    elapsed: f32,
    duration: f32,
    curve: FadeCurve,
}

impl Ramp {
    /// Create a settled ramp holding `value`
    pub fn new(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            current: value,
            elapsed: 0.0,
            duration: 0.0,
            curve: FadeCurve::Linear,
        }
    }

    /// Use a different curve for subsequent ramps
    pub fn with_curve(mut self, curve: FadeCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Current value
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Value the ramp is heading toward
    pub fn target(&self) -> f32 {
        self.to
    }

    /// Whether the ramp has reached its target
    pub fn is_settled(&self) -> bool {
        self.current == self.to
    }

    /// Seconds left until the target is reached
    pub fn remaining(&self) -> f32 {
        if self.is_settled() {
            0.0
        } else {
            (self.duration - self.elapsed).max(0.0)
        }
    }

    /// Start ramping toward `target` over `duration` seconds, replacing any
    /// ramp in flight
    pub fn ramp_to(&mut self, target: f32, duration: f32) {
        if duration <= 0.0 {
            self.set_immediate(target);
            return;
        }
        self.from = self.current;
        self.to = target;
        self.elapsed = 0.0;
        self.duration = duration;
    }

    /// Jump to `value` with no ramp (emergency stop only)
    pub fn set_immediate(&mut self, value: f32) {
        self.from = value;
        self.to = value;
        self.current = value;
        self.elapsed = 0.0;
        self.duration = 0.0;
    }

    /// Advance the ramp and return the new value
    pub fn advance(&mut self, delta_time: f32) -> f32 {
        if self.is_settled() {
            return self.current;
        }
        self.elapsed += delta_time.max(0.0);
        let progress = if self.duration > 0.0 {
            self.elapsed / self.duration
        } else {
            1.0
        };
        if progress >= 1.0 {
            self.current = self.to;
        } else {
            self.current = self.from + (self.to - self.from) * self.curve.shape(progress);
        }
        self.current
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A linear position ramp
#[derive(Debug, Clone, PartialEq)]
pub struct Vec3Ramp {
    from: Vec3,
    to: Vec3,
    current: Vec3,
    elapsed: f32,
    duration: f32,
}

impl Vec3Ramp {
    pub fn new(value: Vec3) -> Self {
        Self {
            from: value,
            to: value,
            current: value,
            elapsed: 0.0,
            duration: 0.0,
        }
    }

    pub fn value(&self) -> Vec3 {
        self.current
    }

    pub fn target(&self) -> Vec3 {
        self.to
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.to
    }

    pub fn ramp_to(&mut self, target: Vec3, duration: f32) {
        if duration <= 0.0 {
            self.set_immediate(target);
            return;
        }
        self.from = self.current;
        self.to = target;
        self.elapsed = 0.0;
        self.duration = duration;
    }

    pub fn set_immediate(&mut self, value: Vec3) {
        self.from = value;
        self.to = value;
        self.current = value;
        self.elapsed = 0.0;
        self.duration = 0.0;
    }

    pub fn advance(&mut self, delta_time: f32) -> Vec3 {
        if self.is_settled() {
            return self.current;
        }
        self.elapsed += delta_time.max(0.0);
        let progress = if self.duration > 0.0 {
            self.elapsed / self.duration
        } else {
            1.0
        };
        self.current = if progress >= 1.0 {
            self.to
        } else {
            self.from.lerp(self.to, progress)
        };
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_endpoints() {
        for curve in [FadeCurve::Linear, FadeCurve::EqualPower, FadeCurve::Logarithmic] {
            assert!(curve.shape(0.0).abs() < 1e-6);
            assert!((curve.shape(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn equal_power_crossfade_balanced_midway() {
        let (out, in_) = FadeCurve::EqualPower.crossfade_volumes(0.5);
        assert!((out - in_).abs() < 0.01);
    }

    #[test]
    fn ramp_reaches_target() {
        let mut ramp = Ramp::new(0.0);
        ramp.ramp_to(1.0, 1.0);
        ramp.advance(0.5);
        assert!((ramp.value() - 0.5).abs() < 1e-5);
        ramp.advance(0.6);
        assert_eq!(ramp.value(), 1.0);
        assert!(ramp.is_settled());
    }

    #[test]
    fn newer_ramp_supersedes_older_from_current_value() {
        let mut ramp = Ramp::new(0.0);
        ramp.ramp_to(1.0, 1.0);
        ramp.advance(0.5);

        ramp.ramp_to(0.0, 1.0);
        assert!((ramp.value() - 0.5).abs() < 1e-5, "no snap on replace");
        ramp.advance(0.5);
        assert!((ramp.value() - 0.25).abs() < 1e-5);
        ramp.advance(0.5);
        assert_eq!(ramp.value(), 0.0);
        assert_eq!(ramp.target(), 0.0);
    }

    #[test]
    fn ramp_never_overshoots() {
        let mut ramp = Ramp::new(0.2).with_curve(FadeCurve::EqualPower);
        ramp.ramp_to(0.8, 0.3);
        let mut last = ramp.value();
        for _ in 0..20 {
            let v = ramp.advance(0.02);
            assert!(v >= last && v <= 0.8);
            last = v;
        }
    }

    #[test]
    fn zero_duration_is_immediate() {
        let mut ramp = Ramp::new(0.3);
        ramp.ramp_to(0.9, 0.0);
        assert_eq!(ramp.value(), 0.9);
    }

    #[test]
    fn vec3_ramp_converges_and_stays() {
        let mut ramp = Vec3Ramp::new(Vec3::ZERO);
        let target = Vec3::new(4.0, 0.0, -2.0);
        for _ in 0..5 {
            ramp.ramp_to(target, 0.1);
            for _ in 0..10 {
                ramp.advance(0.016);
            }
        }
        assert_eq!(ramp.value(), target);
        ramp.ramp_to(target, 0.1);
        assert_eq!(ramp.advance(0.05), target);
    }
}
