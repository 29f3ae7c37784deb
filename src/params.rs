//! User parameters and the quantities derived from them.
//!
//! Everything here is in user units (AU, degrees, days, Julian dates), the
//! same units the TOML file uses. [`Parameters::sanitized`] is the only place
//! malformed input is corrected.

use crate::beta::{BetaRange, BetaSampler, BetaTable, ControlPoint};
use crate::constants::{AU, CPU_CAPACITY, GM_SUN, GPU_CAPACITY, SECONDS_PER_DAY, TIMELINE_BASE_JD};
use crate::emission::{DirectionModel, EmissionConfig};
use crate::orbit::{orbit_path, OrbitalElements, Vec3};
use crate::strategy::ColorSettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ORBIT_PATH_SEGMENTS: usize = 800;
/// Open orbits are drawn out to this radius (AU).
pub const ORBIT_PATH_MAX_RADIUS_AU: f64 = 20.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
  #[default]
  Cpu,
  Gpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
  pub eccentricity: f64,
  pub perihelion_au: f64,
  pub inclination_deg: f64,
  pub node_deg: f64,
  pub perihelion_arg_deg: f64,
  /// Time of perihelion passage (JD)
  pub perihelion_jd: f64,
}

impl Default for OrbitConfig {
  fn default() -> Self {
    Self {
      eccentricity: 0.5,
      perihelion_au: 1.0,
      inclination_deg: 0.0,
      node_deg: 0.0,
      perihelion_arg_deg: 0.0,
      perihelion_jd: 2_451_545.0,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
  /// n in Q = k / r^n
  pub exponent: f64,
  /// k in Q = k / r^n
  pub scale: f64,
  pub half_life_days: f64,
  /// Exposure accumulates only inside this heliocentric distance (AU).
  pub cutoff_au: f64,
}

impl Default for ActivityConfig {
  fn default() -> Self {
    Self {
      exponent: 2.0,
      scale: 1.0,
      half_life_days: 365.0,
      cutoff_au: 3.0,
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaMode {
  #[default]
  Curve,
  Range,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaConfig {
  pub mode: BetaMode,
  pub control_points: Vec<ControlPoint>,
  pub range: BetaRange,
}

impl Default for BetaConfig {
  fn default() -> Self {
    Self {
      mode: BetaMode::Curve,
      control_points: vec![
        ControlPoint::new(0.0, 0.2),
        ControlPoint::new(0.1, 1.0),
        ControlPoint::new(0.4, 0.5),
        ControlPoint::new(1.0, 0.05),
      ],
      range: BetaRange::default(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
  pub orbit: OrbitConfig,
  pub activity: ActivityConfig,
  pub beta: BetaConfig,
  pub emission: EmissionConfig,
  pub color: ColorSettings,
  /// Base particle lifetime (days)
  pub lifetime_days: f64,
  /// Births per tick at 1 AU with full activity.
  pub max_births_per_frame: f64,
  /// Divides the particle lifetime.
  pub velocity_scale: f64,
  /// Simulated seconds per real second at speed multiplier 1.
  pub base_time_rate: f64,
  /// Speed slider position, see [`crate::time::speed_from_slider`].
  pub speed_slider: f64,
  /// Epoch the timeline starts from (JD)
  pub start_jd: f64,
  pub backend: Backend,
  pub cpu_capacity: usize,
  pub gpu_capacity: usize,
}

impl Default for Parameters {
  fn default() -> Self {
    Self {
      orbit: OrbitConfig::default(),
      activity: ActivityConfig::default(),
      beta: BetaConfig::default(),
      emission: EmissionConfig::default(),
      color: ColorSettings::default(),
      lifetime_days: 30.0,
      max_births_per_frame: 20.0,
      velocity_scale: 1.0,
      base_time_rate: SECONDS_PER_DAY,
      speed_slider: 0.0,
      start_jd: TIMELINE_BASE_JD,
      backend: Backend::Cpu,
      cpu_capacity: CPU_CAPACITY,
      gpu_capacity: GPU_CAPACITY,
    }
  }
}

/// `value` when finite and accepted by `ok`, else `fallback`.
fn or_default(value: f64, ok: impl Fn(f64) -> bool, fallback: f64) -> f64 {
  if value.is_finite() && ok(value) {
    value
  } else {
    fallback
  }
}

fn positive(v: f64) -> bool {
  v > 0.0
}

/// Derived on every apply.
#[derive(Clone, Debug, PartialEq)]
pub struct Derived {
  /// None for open orbits
  pub semi_major_axis_au: Option<f64>,
  pub period_days: Option<f64>,
  /// sqrt(μ/a) in m/s, None for open orbits
  pub mean_speed_ms: Option<f64>,
  pub orbit_path: Vec<Vec3>,
}

impl Parameters {
  pub fn load(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&text)
  }

  pub fn from_toml(text: &str) -> Result<Self> {
    let params: Self = toml::from_str(text)?;
    Ok(params.sanitized())
  }

  pub fn to_toml(&self) -> Result<String> {
    Ok(toml::to_string_pretty(self)?)
  }

  /// Replace unusable values with safe ones.
  #[must_use]
  pub fn sanitized(mut self) -> Self {
    let defaults = Self::default();

    let orbit = &mut self.orbit;
    orbit.eccentricity = or_default(orbit.eccentricity, |e| e >= 0.0, defaults.orbit.eccentricity);
    orbit.perihelion_au = or_default(orbit.perihelion_au, positive, defaults.orbit.perihelion_au);
    orbit.inclination_deg = or_default(orbit.inclination_deg, |_| true, 0.0);
    orbit.node_deg = or_default(orbit.node_deg, |_| true, 0.0);
    orbit.perihelion_arg_deg = or_default(orbit.perihelion_arg_deg, |_| true, 0.0);
    orbit.perihelion_jd = or_default(orbit.perihelion_jd, |_| true, defaults.orbit.perihelion_jd);

    let activity = &mut self.activity;
    activity.exponent = or_default(activity.exponent, |_| true, 2.0).clamp(0.0, 6.0);
    activity.scale = or_default(activity.scale, |_| true, 1.0).max(0.0);
    activity.half_life_days = or_default(activity.half_life_days, positive, defaults.activity.half_life_days);
    activity.cutoff_au = or_default(activity.cutoff_au, positive, defaults.activity.cutoff_au);

    let range = &mut self.beta.range;
    range.min = or_default(range.min, |_| true, 0.0).clamp(0.0, 1.0);
    range.max = or_default(range.max, |_| true, 1.0).clamp(0.0, 1.0);
    if range.min > range.max {
      std::mem::swap(&mut range.min, &mut range.max);
    }
    range.skew = or_default(range.skew, |_| true, 0.0);
    self
      .beta
      .control_points
      .retain(|p| p.x.is_finite() && p.y.is_finite());

    let emission = &mut self.emission;
    emission.v0_ms = or_default(emission.v0_ms, |v| v >= 0.0, defaults.emission.v0_ms);
    emission.exp_beta = or_default(emission.exp_beta, |_| true, defaults.emission.exp_beta);
    emission.exp_rh = or_default(emission.exp_rh, |_| true, defaults.emission.exp_rh);
    emission.exp_cosz = or_default(emission.exp_cosz, |_| true, defaults.emission.exp_cosz);
    emission.nucleus_radius_m = or_default(emission.nucleus_radius_m, |r| r >= 0.0, 0.0);
    emission.direction = match emission.direction {
      DirectionModel::Cone { half_angle_deg } => DirectionModel::Cone {
        half_angle_deg: or_default(half_angle_deg, |_| true, 90.0).clamp(0.0, 180.0),
      },
      DirectionModel::CosinePower { concentration } => DirectionModel::CosinePower {
        concentration: or_default(concentration, |_| true, 0.0).max(0.0),
      },
    };

    self.lifetime_days = or_default(self.lifetime_days, positive, defaults.lifetime_days);
    self.max_births_per_frame = or_default(self.max_births_per_frame, |_| true, 0.0).max(0.0);
    self.velocity_scale = or_default(self.velocity_scale, positive, 1.0);
    self.base_time_rate = or_default(self.base_time_rate, |r| r >= 0.0, defaults.base_time_rate);
    self.speed_slider = or_default(self.speed_slider, |_| true, 0.0);
    self.start_jd = or_default(self.start_jd, |_| true, defaults.start_jd);
    self.cpu_capacity = self.cpu_capacity.max(1);
    self.gpu_capacity = self.gpu_capacity.max(1);
    self
  }

  #[must_use]
  pub fn elements(&self) -> OrbitalElements {
    let o = &self.orbit;
    OrbitalElements::from_user_units(
      o.eccentricity,
      o.perihelion_au,
      o.inclination_deg,
      o.node_deg,
      o.perihelion_arg_deg,
      o.perihelion_jd,
    )
  }

  #[must_use]
  pub fn beta_sampler(&self) -> BetaSampler {
    match self.beta.mode {
      BetaMode::Curve => BetaSampler::Curve(BetaTable::rebuild(&self.beta.control_points)),
      BetaMode::Range => BetaSampler::Range(self.beta.range),
    }
  }

  #[must_use]
  pub fn capacity(&self) -> usize {
    match self.backend {
      Backend::Cpu => self.cpu_capacity,
      Backend::Gpu => self.gpu_capacity,
    }
  }

  /// Simulated seconds per real second.
  #[must_use]
  pub fn time_rate(&self) -> f64 {
    self.base_time_rate * crate::time::speed_from_slider(self.speed_slider)
  }

  #[must_use]
  pub fn lifetime_seconds(&self) -> f64 {
    self.lifetime_days / self.velocity_scale * SECONDS_PER_DAY
  }

  #[must_use]
  pub fn derive(&self) -> Derived {
    let elements = self.elements();
    let a = elements.semi_major_axis().filter(|_| elements.e < 1.0);
    Derived {
      semi_major_axis_au: a.map(|a| a / AU),
      period_days: elements.period_days(),
      mean_speed_ms: a.map(|a| (GM_SUN / a).sqrt()),
      orbit_path: orbit_path(&elements, ORBIT_PATH_SEGMENTS, ORBIT_PATH_MAX_RADIUS_AU * AU),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn default_round_trips_through_toml() {
    let params = Parameters::default();
    let text = params.to_toml().unwrap();
    assert_eq!(Parameters::from_toml(&text).unwrap(), params);
  }

  #[test]
  fn partial_file_uses_defaults() {
    let params = Parameters::from_toml(
      r#"
        lifetime_days = 12.0
        backend = "gpu"

        [orbit]
        eccentricity = 1.2

        [emission.direction]
        kind = "cosine_power"
        concentration = 3.0
      "#,
    )
    .unwrap();
    assert_relative_eq!(params.lifetime_days, 12.0);
    assert_eq!(params.backend, Backend::Gpu);
    assert_relative_eq!(params.orbit.eccentricity, 1.2);
    assert_relative_eq!(params.orbit.perihelion_au, 1.0);
    assert_eq!(params.emission.direction, DirectionModel::CosinePower { concentration: 3.0 });
    assert_eq!(params.capacity(), GPU_CAPACITY);
  }

  #[test]
  fn bad_toml_is_an_error() {
    assert!(matches!(Parameters::from_toml("orbit = 3"), Err(Error::ConfigParse(_))));
  }

  #[test]
  fn sanitize_clamps_activity_and_beta() {
    let mut params = Parameters::default();
    params.activity.exponent = f64::NAN;
    params.activity.scale = -4.0;
    params.beta.range.min = 0.9;
    params.beta.range.max = 1.7;
    params.max_births_per_frame = -1.0;
    params.velocity_scale = 0.0;
    params.orbit.perihelion_au = -2.0;
    let params = params.sanitized();
    assert_relative_eq!(params.activity.exponent, 2.0);
    assert_relative_eq!(params.activity.scale, 0.0);
    assert_relative_eq!(params.beta.range.min, 0.9);
    assert_relative_eq!(params.beta.range.max, 1.0);
    assert_relative_eq!(params.max_births_per_frame, 0.0);
    assert_relative_eq!(params.velocity_scale, 1.0);
    assert_relative_eq!(params.orbit.perihelion_au, 1.0);

    let mut params = Parameters::default();
    params.activity.exponent = 40.0;
    params.beta.range.min = 0.8;
    params.beta.range.max = 0.2;
    let params = params.sanitized();
    assert_relative_eq!(params.activity.exponent, 6.0);
    assert_relative_eq!(params.beta.range.min, 0.2);
    assert_relative_eq!(params.beta.range.max, 0.8);
  }

  #[test]
  fn derived_elliptic_orbit() {
    let derived = Parameters::default().derive();
    assert_relative_eq!(derived.semi_major_axis_au.unwrap(), 2.0, max_relative = 1e-12);
    assert_relative_eq!(derived.period_days.unwrap(), 365.256_9 * 2.0_f64.powf(1.5), max_relative = 1e-3);
    assert_eq!(derived.orbit_path.len(), ORBIT_PATH_SEGMENTS + 1);
  }

  #[test]
  fn derived_open_orbit_has_no_axis() {
    let mut params = Parameters::default();
    params.orbit.eccentricity = 1.5;
    let derived = params.derive();
    assert!(derived.semi_major_axis_au.is_none());
    assert!(derived.period_days.is_none());
    assert!(derived.mean_speed_ms.is_none());
  }

  #[test]
  fn lifetime_and_rate() {
    let mut params = Parameters::default();
    params.velocity_scale = 2.0;
    assert_relative_eq!(params.lifetime_seconds(), 15.0 * SECONDS_PER_DAY);
    params.speed_slider = 4.0;
    assert_relative_eq!(params.time_rate(), 1.6 * SECONDS_PER_DAY);
  }
}
