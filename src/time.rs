use crate::constants::{JD_UNIX_EPOCH, SECONDS_PER_DAY};
use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: f64 = SECONDS_PER_DAY * 1_000.0;

/// Julian date to a UTC timestamp. None outside chrono's representable range.
#[must_use]
pub fn jd_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
  let millis = ((jd - JD_UNIX_EPOCH) * MILLIS_PER_DAY).round();
  if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
    return None;
  }
  DateTime::from_timestamp_millis(millis as i64)
}

/// `YYYY/MM/DD HH:MM:SS UTC`
#[must_use]
pub fn format_jd(jd: f64) -> String {
  match jd_to_datetime(jd) {
    Some(t) => t.format("%Y/%m/%d %H:%M:%S UTC").to_string(),
    None => format!("JD {jd:.5}"),
  }
}

/// `YYYY-MM-DD`
#[must_use]
pub fn jd_to_iso_date(jd: f64) -> String {
  match jd_to_datetime(jd) {
    Some(t) => t.format("%Y-%m-%d").to_string(),
    None => format!("JD {jd:.5}"),
  }
}

/// Time-rate multiplier for a speed slider position.
#[must_use]
pub fn speed_from_slider(position: f64) -> f64 {
  0.8 * (position / 4.0).exp2()
}
