//! Ejection of dust grains from the nucleus.

use crate::constants::{AU, GM_SUN, SECONDS_PER_DAY};
use crate::orbit::{BodyState, Vec3};
use cgmath::InnerSpace;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How emission directions are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectionModel {
  /// Uniform inside a cone around the anti-solar direction.
  Cone { half_angle_deg: f64 },
  /// cos^k weighted hemisphere around the sub-solar direction.
  CosinePower { concentration: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionConfig {
  /// Reference ejection speed (m/s) at β = 1, r = 1 AU, cos z = 1.
  pub v0_ms: f64,
  pub exp_beta: f64,
  pub exp_rh: f64,
  pub exp_cosz: f64,
  pub direction: DirectionModel,
  /// Offset of the emission point from the nucleus centre (m).
  pub nucleus_radius_m: f64,
}

impl Default for EmissionConfig {
  fn default() -> Self {
    Self {
      v0_ms: 400.0,
      exp_beta: 0.5,
      exp_rh: -0.5,
      exp_cosz: 1.0,
      direction: DirectionModel::Cone { half_angle_deg: 90.0 },
      nucleus_radius_m: 0.0,
    }
  }
}

/// An emission direction together with the axis it was drawn around.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionSample {
  pub direction: Vec3,
  /// cosine of the angle to the sampling axis, floored at 0
  pub cos_zenith: f64,
}

/// Initial state of a freshly emitted grain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmittedParticle {
  pub position: Vec3,
  pub velocity: Vec3,
  pub mu_eff: f64,
  pub beta: f64,
  pub lifetime_seconds: f64,
}

/// Right-handed orthonormal pair perpendicular to `axis` (unit).
fn basis_around(axis: Vec3) -> (Vec3, Vec3) {
  let helper = if axis.x.abs() < 0.99 {
    Vec3::unit_x()
  } else {
    Vec3::unit_y()
  };
  let x_axis = helper.cross(axis).normalize();
  let y_axis = axis.cross(x_axis).normalize();
  (x_axis, y_axis)
}

fn from_polar(axis: Vec3, cos_polar: f64, azimuth: f64) -> Vec3 {
  let (x_axis, y_axis) = basis_around(axis);
  let sin_polar = (1.0 - cos_polar * cos_polar).max(0.0).sqrt();
  (axis * cos_polar + x_axis * (sin_polar * azimuth.cos()) + y_axis * (sin_polar * azimuth.sin()))
    .normalize()
}

/// Uniform direction within `half_angle` (rad) of `axis`, from two uniforms.
#[must_use]
pub fn sample_cone_direction(axis: Vec3, half_angle: f64, u: f64, v: f64) -> Vec3 {
  let axis = axis.normalize();
  let cos_polar = 1.0 - u * (1.0 - half_angle.cos());
  from_polar(axis, cos_polar, 2.0 * PI * v)
}

/// Hemisphere direction with density ∝ cos^k θ around `axis`.
#[must_use]
pub fn sample_cosine_power_hemisphere(axis: Vec3, k: f64, u: f64, v: f64) -> Vec3 {
  let axis = axis.normalize();
  let cos_polar = u.powf(1.0 / (k.max(0.0) + 1.0));
  from_polar(axis, cos_polar, 2.0 * PI * v)
}

impl EmissionConfig {
  /// speed = v0 · β^pβ · r^pr · cos z^pz, each base floored before the power.
  #[must_use]
  pub fn ejection_speed(&self, beta: f64, heliocentric_distance_au: f64, cos_zenith: f64) -> f64 {
    self.v0_ms
      * beta.max(1e-6).powf(self.exp_beta)
      * heliocentric_distance_au.max(1e-6).powf(self.exp_rh)
      * cos_zenith.max(1e-3).powf(self.exp_cosz)
  }

  pub fn sample_direction<R: Rng + ?Sized>(&self, comet: &BodyState, rng: &mut R) -> DirectionSample {
    let anti_solar = comet.position.normalize();
    let (u, v): (f64, f64) = (rng.gen(), rng.gen());
    let (axis, direction) = match self.direction {
      DirectionModel::Cone { half_angle_deg } => (
        anti_solar,
        sample_cone_direction(anti_solar, half_angle_deg.to_radians(), u, v),
      ),
      DirectionModel::CosinePower { concentration } => {
        let sub_solar = -anti_solar;
        (sub_solar, sample_cosine_power_hemisphere(sub_solar, concentration, u, v))
      }
    };
    DirectionSample {
      direction,
      cos_zenith: direction.dot(axis).max(0.0),
    }
  }

  /// Combine the comet state with an ejection along `sample`.
  #[must_use]
  pub fn build_particle(
    &self,
    comet: &BodyState,
    beta: f64,
    sample: &DirectionSample,
    lifetime_days: f64,
    velocity_scale: f64,
  ) -> EmittedParticle {
    let r_au = comet.position.magnitude() / AU;
    let speed = self.ejection_speed(beta, r_au, sample.cos_zenith);
    let beta = beta.clamp(0.0, 1.0);
    EmittedParticle {
      position: comet.position + sample.direction * self.nucleus_radius_m,
      velocity: comet.velocity + sample.direction * speed,
      mu_eff: effective_mu(beta),
      beta,
      lifetime_seconds: lifetime_days / velocity_scale.max(1e-9) * SECONDS_PER_DAY,
    }
  }
}

/// Solar attraction left over after radiation pressure.
#[must_use]
pub fn effective_mu(beta: f64) -> f64 {
  GM_SUN * (1.0 - beta).max(0.0)
}
