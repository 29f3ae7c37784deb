//! Physical constants and fixed simulation limits.

/// Astronomical unit in metres.
pub const AU: f64 = 1.495_978_707e11;
/// Heliocentric gravitational parameter GM_sun (m³/s²).
pub const GM_SUN: f64 = 1.327_124_400_18e20;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const DEG: f64 = std::f64::consts::PI / 180.0;

/// Metres to scene units for anything handed to the GPU as f32.
pub const SCENE_SCALE: f64 = 1e-10;
/// GM_sun expressed in scene units.
pub const MU_SCENE: f64 = GM_SUN * SCENE_SCALE * SCENE_SCALE * SCENE_SCALE;

/// Mean obliquity of the ecliptic at J2000 (degrees).
pub const OBLIQUITY_DEG: f64 = 23.439_291;

pub const J2000_JD: f64 = 2_451_545.0;
/// Start of the timeline; scrubbing offsets are whole days from here.
pub const TIMELINE_BASE_JD: f64 = 2_451_544.5;
pub const JD_UNIX_EPOCH: f64 = 2_440_587.5;

pub const CPU_CAPACITY: usize = 2_000;
pub const GPU_CAPACITY: usize = 100_000;

/// Upper bound on births emitted in a single tick.
pub const MAX_BIRTHS_PER_TICK: u32 = 512;

/// Real seconds between status log lines.
pub const UI_PERIOD: f64 = 0.15;
