//! Synchrones, syndynes and their sky-plane geometry.
//!
//! Offsets are signed days relative to the observation epoch, so dust
//! released ten days before observation has offset `-10`.

use crate::constants::{OBLIQUITY_DEG, SECONDS_PER_DAY};
use crate::emission::effective_mu;
use crate::orbit::{comet_state_at_epoch, planet_state_at_epoch, propagate_universal, OrbitalElements, Vec3, EARTH};
use cgmath::InnerSpace;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinePoint {
  pub beta: f64,
  pub offset_days: f64,
  /// Heliocentric ecliptic position at the observation epoch (m)
  pub position: Vec3,
}

/// Fixed release time, β varies along the line.
#[derive(Clone, Debug, PartialEq)]
pub struct SynchroneLine {
  pub offset_days: f64,
  pub points: Vec<LinePoint>,
}

/// Fixed β, release time varies along the line.
#[derive(Clone, Debug, PartialEq)]
pub struct SyndyneLine {
  pub beta: f64,
  pub points: Vec<LinePoint>,
}

/// Where a grain of `beta` released at `epoch + offset_days` is at `epoch`.
#[must_use]
pub fn dust_position(elements: &OrbitalElements, epoch: f64, offset_days: f64, beta: f64) -> LinePoint {
  let release = comet_state_at_epoch(elements, epoch + offset_days);
  let (position, _) = propagate_universal(
    release.position,
    release.velocity,
    -offset_days * SECONDS_PER_DAY,
    effective_mu(beta),
  );
  LinePoint {
    beta,
    offset_days,
    position,
  }
}

#[must_use]
pub fn build_synchrones(elements: &OrbitalElements, epoch: f64, offsets: &[f64], betas: &[f64]) -> Vec<SynchroneLine> {
  offsets
    .iter()
    .map(|&offset_days| SynchroneLine {
      offset_days,
      points: betas
        .iter()
        .map(|&beta| dust_position(elements, epoch, offset_days, beta))
        .collect(),
    })
    .collect()
}

#[must_use]
pub fn build_syndynes(elements: &OrbitalElements, epoch: f64, offsets: &[f64], betas: &[f64]) -> Vec<SyndyneLine> {
  betas
    .iter()
    .map(|&beta| SyndyneLine {
      beta,
      points: offsets
        .iter()
        .map(|&offset_days| dust_position(elements, epoch, offset_days, beta))
        .collect(),
    })
    .collect()
}

/// Heliocentric ecliptic to equatorial, rotating about x by the obliquity.
#[must_use]
pub fn ecliptic_to_equatorial(v: Vec3) -> Vec3 {
  let (sin_e, cos_e) = OBLIQUITY_DEG.to_radians().sin_cos();
  Vec3::new(v.x, v.y * cos_e - v.z * sin_e, v.y * sin_e + v.z * cos_e)
}

/// Geocentric right ascension and declination (degrees) of an ecliptic
/// position, RA in [0, 360).
#[must_use]
pub fn ra_dec(position: Vec3, earth: Vec3) -> (f64, f64) {
  let d = ecliptic_to_equatorial(position - earth);
  let r = d.magnitude();
  if r == 0.0 {
    return (0.0, 0.0);
  }
  let ra = d.y.atan2(d.x).to_degrees().rem_euclid(360.0);
  let dec = (d.z / r).clamp(-1.0, 1.0).asin().to_degrees();
  (ra, dec)
}

/// Position angle (degrees, north through east, [0, 360)) of the line near
/// the comet as seen from Earth. None when the line has fewer than two
/// points or runs along the line of sight.
#[must_use]
pub fn position_angle(points: &[LinePoint], comet: Vec3, earth: Vec3) -> Option<f64> {
  let mut by_distance: Vec<&LinePoint> = points.iter().collect();
  by_distance.sort_by(|a, b| {
    let da = (a.position - comet).magnitude2();
    let db = (b.position - comet).magnitude2();
    da.total_cmp(&db)
  });
  let [near, next, ..] = by_distance.as_slice() else {
    return None;
  };

  let comet_eq = ecliptic_to_equatorial(comet);
  let earth_eq = ecliptic_to_equatorial(earth);
  let sight = (comet_eq - earth_eq).normalize();
  let along = ecliptic_to_equatorial(next.position - near.position);
  let tangent = along - sight * along.dot(sight);
  if !(tangent.magnitude2() > 0.0) {
    return None;
  }

  let pole = Vec3::unit_z();
  let east = pole.cross(sight);
  if !(east.magnitude2() > 0.0) {
    return None;
  }
  let east = east.normalize();
  let north = sight.cross(east);
  Some(tangent.dot(east).atan2(tangent.dot(north)).to_degrees().rem_euclid(360.0))
}

/// One exported row: a point with its sky coordinates and its line's PA.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyRow {
  pub line: usize,
  pub beta: f64,
  pub offset_days: f64,
  pub ra_deg: f64,
  pub dec_deg: f64,
  pub pa_deg: Option<f64>,
}

impl SkyRow {
  pub const HEADER: &'static str = "line,beta,offset_days,ra_deg,dec_deg,pa_deg";

  #[must_use]
  pub fn to_csv(&self) -> String {
    let pa = self.pa_deg.map(|pa| format!("{pa:.3}")).unwrap_or_default();
    format!(
      "{},{:.4},{:.3},{:.5},{:.5},{}",
      self.line, self.beta, self.offset_days, self.ra_deg, self.dec_deg, pa
    )
  }
}

/// RA/Dec for every point of every line plus each line's PA, at `epoch`.
#[must_use]
pub fn sky_rows<'a>(
  elements: &OrbitalElements,
  epoch: f64,
  lines: impl IntoIterator<Item = &'a [LinePoint]>,
) -> Vec<SkyRow> {
  let comet = comet_state_at_epoch(elements, epoch).position;
  let earth = planet_state_at_epoch(&EARTH, epoch);
  let mut rows = Vec::new();
  for (line, points) in lines.into_iter().enumerate() {
    let pa_deg = position_angle(points, comet, earth);
    for p in points {
      let (ra_deg, dec_deg) = ra_dec(p.position, earth);
      rows.push(SkyRow {
        line,
        beta: p.beta,
        offset_days: p.offset_days,
        ra_deg,
        dec_deg,
        pa_deg,
      });
    }
  }
  rows
}
