//! Dust production: heliocentric power law, sublimation memory and the per
//! tick birth accumulator.

use crate::constants::MAX_BIRTHS_PER_TICK;

/// Floor on the heliocentric distance (AU) used in the power law.
pub const MIN_PRODUCTION_RADIUS_AU: f64 = 1e-3;

/// Accumulated sublimation exposure and the law that fades activity with it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActivityState {
  /// Sum of dt/r² (days / AU²) collected inside the cutoff radius.
  pub cumulative_exposure: f64,
  pub half_life_days: f64,
  pub production_exponent: f64,
  pub production_scale: f64,
}

impl ActivityState {
  #[must_use]
  pub fn new(half_life_days: f64, production_exponent: f64, production_scale: f64) -> Self {
    Self {
      cumulative_exposure: 0.0,
      half_life_days,
      production_exponent,
      production_scale,
    }
  }

  /// Accumulate exposure only while the comet is inside `cutoff_au`.
  pub fn update_exposure(&mut self, heliocentric_distance_au: f64, dt_days: f64, cutoff_au: f64) {
    if heliocentric_distance_au <= cutoff_au && dt_days > 0.0 {
      let r = heliocentric_distance_au.max(MIN_PRODUCTION_RADIUS_AU);
      self.cumulative_exposure += dt_days / (r * r);
    }
  }

  /// 2^(-exposure / half-life), in (0, 1].
  #[must_use]
  pub fn age_factor(&self) -> f64 {
    (-self.cumulative_exposure / self.half_life_days).exp2()
  }

  #[must_use]
  pub fn production_rate(&self, heliocentric_distance_au: f64) -> f64 {
    production_rate(
      heliocentric_distance_au,
      self.age_factor(),
      self.production_scale,
      self.production_exponent,
    )
  }

  pub fn reset(&mut self) {
    self.cumulative_exposure = 0.0;
  }
}

/// Q = k · ageFactor / r^n.
#[must_use]
pub fn production_rate(heliocentric_distance_au: f64, age_factor: f64, k: f64, n: f64) -> f64 {
  let r = heliocentric_distance_au.max(MIN_PRODUCTION_RADIUS_AU);
  k.max(0.0) * age_factor / r.powf(n.max(0.0))
}

/// Carries the fractional part of the per-tick birth target so the long run
/// average matches it regardless of frame rate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BirthAccumulator {
  carry: f64,
}

impl BirthAccumulator {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Add `target` births and return the whole ones, at most `cap`.
  pub fn take(&mut self, target: f64, cap: u32) -> u32 {
    if target.is_finite() && target > 0.0 {
      self.carry += target;
    }
    let whole = self.carry.floor();
    self.carry -= whole;
    (whole as u32).min(cap)
  }

  pub fn take_capped(&mut self, target: f64) -> u32 {
    self.take(target, MAX_BIRTHS_PER_TICK)
  }

  #[must_use]
  pub fn carry(&self) -> f64 {
    self.carry
  }

  pub fn reset(&mut self) {
    self.carry = 0.0;
  }
}
