//! β (radiation pressure / gravity) distributions.
//!
//! The user edits a handful of control points; [`BetaTable::rebuild`] turns
//! them into a sampled PDF and CDF over β ∈ [0, 1] that can be inverted with
//! a single uniform draw.

use rand::Rng;
use rand_distr::{Distribution, Standard};
use serde::{Deserialize, Serialize};

pub const TABLE_RESOLUTION: usize = 512;

/// A user control point: `x` is β, `y` the relative weight in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
  pub x: f64,
  pub y: f64,
}

impl ControlPoint {
  #[must_use]
  pub const fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BetaTable {
  pub pdf: Vec<f64>,
  pub cdf: Vec<f64>,
  /// x-range covered by the control points
  pub domain: (f64, f64),
  /// Fewer than two points or a domain narrower than one bin; sampling
  /// falls back to the domain.
  pub degenerate: bool,
}

/// Catmull-Rom through p0..p3, evaluated between p1 and p2.
fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
  let t2 = t * t;
  let t3 = t2 * t;
  0.5
    * (2.0 * p1
      + (-p0 + p2) * t
      + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
      + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

fn interpolate(points: &[ControlPoint], x: f64) -> f64 {
  let last = points.len() - 1;
  if x < points[0].x || x > points[last].x {
    return 0.0;
  }
  // segment j such that points[j].x <= x <= points[j + 1].x
  let j = points
    .partition_point(|p| p.x <= x)
    .saturating_sub(1)
    .min(last.saturating_sub(1));
  let (a, b) = (points[j], points[j + 1]);
  let span = b.x - a.x;
  if span <= 0.0 {
    return a.y.max(b.y).clamp(0.0, 1.0);
  }
  let t = ((x - a.x) / span).clamp(0.0, 1.0);
  let p0 = if j == 0 { a.y } else { points[j - 1].y };
  let p3 = if j + 2 > last { b.y } else { points[j + 2].y };
  catmull_rom(p0, a.y, b.y, p3, t).clamp(0.0, 1.0)
}

fn sample_x(i: usize) -> f64 {
  i as f64 / (TABLE_RESOLUTION - 1) as f64
}

impl BetaTable {
  /// Resample the control curve into a normalized table.
  ///
  /// Points are sorted by `x`; non-finite points are ignored. With fewer than
  /// two usable points, or a curve that integrates to zero, the PDF becomes
  /// uniform over the control points' x-range. A range narrower than one bin
  /// puts all mass on the bin nearest its centre, so the CDF always ends at 1.
  #[must_use]
  pub fn rebuild(control_points: &[ControlPoint]) -> Self {
    let mut points: Vec<ControlPoint> = control_points
      .iter()
      .filter(|p| p.x.is_finite() && p.y.is_finite())
      .map(|p| ControlPoint::new(p.x.clamp(0.0, 1.0), p.y))
      .collect();
    points.sort_by(|a, b| a.x.total_cmp(&b.x));

    let domain = match (points.first(), points.last()) {
      (Some(first), Some(last)) => (first.x, last.x),
      _ => (0.0, 1.0),
    };

    let mut weights: Vec<f64> = if points.len() >= 2 {
      (0..TABLE_RESOLUTION)
        .map(|i| interpolate(&points, sample_x(i)))
        .collect()
    } else {
      vec![0.0; TABLE_RESOLUTION]
    };

    if weights.iter().sum::<f64>() <= 0.0 {
      weights = (0..TABLE_RESOLUTION)
        .map(|i| {
          let x = sample_x(i);
          if x >= domain.0 && x <= domain.1 {
            1.0
          } else {
            0.0
          }
        })
        .collect();
    }

    if weights.iter().sum::<f64>() <= 0.0 {
      // no sample falls inside the domain
      let centre = 0.5 * (domain.0 + domain.1) * (TABLE_RESOLUTION - 1) as f64;
      let nearest = (centre.round() as usize).min(TABLE_RESOLUTION - 1);
      weights[nearest] = 1.0;
    }

    let total: f64 = weights.iter().sum();
    let dx = 1.0 / (TABLE_RESOLUTION - 1) as f64;
    let degenerate = points.len() < 2 || domain.1 - domain.0 <= dx;

    let pdf = weights.iter().map(|w| w / (total * dx)).collect();
    let mut running = 0.0;
    let mut cdf: Vec<f64> = weights
      .iter()
      .map(|w| {
        running += w / total;
        running.min(1.0)
      })
      .collect();
    cdf[TABLE_RESOLUTION - 1] = 1.0;

    Self {
      pdf,
      cdf,
      domain,
      degenerate,
    }
  }

  /// Invert the CDF at `u` ∈ [0, 1].
  #[must_use]
  pub fn sample_at(&self, u: f64) -> f64 {
    let u = u.clamp(0.0, 1.0);
    if self.degenerate || self.cdf.is_empty() {
      return self.domain.0 + u * (self.domain.1 - self.domain.0);
    }
    let i = self.cdf.partition_point(|&c| c < u).min(self.cdf.len() - 1);
    if i == 0 {
      return self.domain.0;
    }
    let (c0, c1) = (self.cdf[i - 1], self.cdf[i]);
    let (x0, x1) = (sample_x(i - 1), sample_x(i));
    let t = if c1 > c0 { (u - c0) / (c1 - c0) } else { 0.0 };
    // the first weighted bin interpolates from a neighbour outside the domain
    (x0 + t * (x1 - x0)).clamp(self.domain.0, self.domain.1)
  }
}

impl Distribution<f64> for BetaTable {
  fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
    self.sample_at(Standard.sample(rng))
  }
}

/// Uniform β in [min, max], optionally skewed toward either end.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BetaRange {
  pub min: f64,
  pub max: f64,
  pub skew: f64,
}

impl Default for BetaRange {
  fn default() -> Self {
    Self {
      min: 0.0,
      max: 1.0,
      skew: 0.0,
    }
  }
}

impl BetaRange {
  #[must_use]
  pub fn sample_at(&self, u: f64) -> f64 {
    if self.min == self.max {
      return self.min;
    }
    let mut u = u;
    if self.skew != 0.0 {
      let k = 1.0 + self.skew.abs();
      u = if self.skew < 0.0 {
        1.0 - (1.0 - u).powf(k)
      } else {
        u.powf(k)
      };
    }
    self.min + u * (self.max - self.min)
  }
}

impl Distribution<f64> for BetaRange {
  fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
    self.sample_at(Standard.sample(rng))
  }
}

/// The β distribution currently driving emission.
#[derive(Clone, Debug, PartialEq)]
pub enum BetaSampler {
  Curve(BetaTable),
  Range(BetaRange),
}

impl Distribution<f64> for BetaSampler {
  fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
    match self {
      Self::Curve(table) => Distribution::sample(table, rng),
      Self::Range(range) => Distribution::sample(range, rng),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;
  use rand::{rngs::SmallRng, SeedableRng};

  fn curve() -> Vec<ControlPoint> {
    vec![
      ControlPoint::new(0.0, 0.1),
      ControlPoint::new(0.2, 1.0),
      ControlPoint::new(0.5, 0.4),
      ControlPoint::new(1.0, 0.0),
    ]
  }

  fn assert_valid_cdf(table: &BetaTable) {
    assert_eq!(table.cdf.len(), TABLE_RESOLUTION);
    assert!(table.cdf.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*table.cdf.last().unwrap(), 1.0);
  }

  #[test]
  fn cdf_is_closed_and_monotonic() {
    assert_valid_cdf(&BetaTable::rebuild(&curve()));
    assert_valid_cdf(&BetaTable::rebuild(&[
      ControlPoint::new(0.9, 0.3),
      ControlPoint::new(0.1, 0.7),
    ]));
    // control points out of order and spiking above 1
    assert_valid_cdf(&BetaTable::rebuild(&[
      ControlPoint::new(0.6, 3.0),
      ControlPoint::new(0.0, 0.0),
      ControlPoint::new(0.3, 1.0),
      ControlPoint::new(1.0, 0.0),
    ]));
    // control points closer together than one bin
    assert_valid_cdf(&BetaTable::rebuild(&[
      ControlPoint::new(0.3, 0.5),
      ControlPoint::new(0.301, 0.5),
    ]));
  }

  #[test]
  fn pdf_integrates_to_one() {
    let table = BetaTable::rebuild(&curve());
    let dx = 1.0 / (TABLE_RESOLUTION - 1) as f64;
    assert_abs_diff_eq!(table.pdf.iter().sum::<f64>() * dx, 1.0, epsilon = 1e-9);
  }

  #[test]
  fn flat_zero_curve_becomes_uniform_over_domain() {
    let table = BetaTable::rebuild(&[ControlPoint::new(0.25, 0.0), ControlPoint::new(0.75, 0.0)]);
    assert!(!table.degenerate);
    assert_valid_cdf(&table);
    let median = table.sample_at(0.5);
    assert_abs_diff_eq!(median, 0.5, epsilon = 0.01);
    assert!(table.sample_at(0.001) >= 0.24);
    assert!(table.sample_at(0.999) <= 0.76);
  }

  #[test]
  fn samples_stay_inside_the_control_domain() {
    let flat = BetaTable::rebuild(&[ControlPoint::new(0.25, 1.0), ControlPoint::new(0.75, 1.0)]);
    assert_eq!(flat.sample_at(0.0), 0.25);
    for u in [1e-6, 1e-3, 0.5, 0.999_999, 1.0] {
      let beta = flat.sample_at(u);
      assert!((0.25..=0.75).contains(&beta), "u = {u}, beta = {beta}");
    }

    let narrow = BetaTable::rebuild(&[ControlPoint::new(0.3, 0.5), ControlPoint::new(0.301, 0.5)]);
    assert!(narrow.degenerate);
    for u in [0.0, 0.4, 1.0] {
      assert!((0.3..=0.301).contains(&narrow.sample_at(u)));
    }
  }

  #[test]
  fn single_point_is_degenerate() {
    let table = BetaTable::rebuild(&[ControlPoint::new(0.4, 1.0)]);
    assert!(table.degenerate);
    assert_eq!(table.sample_at(0.7), 0.4);
    let empty = BetaTable::rebuild(&[]);
    assert!(empty.degenerate);
    assert_abs_diff_eq!(empty.sample_at(0.3), 0.3);
  }

  #[test]
  fn samples_follow_the_curve() {
    let table = BetaTable::rebuild(&curve());
    let mut rng = SmallRng::seed_from_u64(7);
    let draws: Vec<f64> = (0..20_000).map(|_| Distribution::sample(&table, &mut rng)).collect();
    assert!(draws.iter().all(|b| (0.0..=1.0).contains(b)));
    let low = draws.iter().filter(|b| **b < 0.5).count();
    // most weight sits below β = 0.5
    assert!(low > 14_000, "low = {low}");
  }

  #[test]
  fn range_sampler_matches_bounds_and_skew() {
    let range = BetaRange {
      min: 0.2,
      max: 0.6,
      skew: 0.0,
    };
    assert_abs_diff_eq!(range.sample_at(0.0), 0.2);
    assert_abs_diff_eq!(range.sample_at(1.0), 0.6);
    let skewed = BetaRange { skew: 2.0, ..range };
    assert!(skewed.sample_at(0.5) < range.sample_at(0.5));
    let skewed = BetaRange { skew: -2.0, ..range };
    assert!(skewed.sample_at(0.5) > range.sample_at(0.5));
    let fixed = BetaRange {
      min: 0.3,
      max: 0.3,
      skew: 1.0,
    };
    assert_eq!(fixed.sample_at(0.9), 0.3);
  }
}
