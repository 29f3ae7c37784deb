//! Per-tick particle advancement, on the CPU or forwarded to a GPU
//! collaborator. Emission and activity never see which one is in use.

use crate::constants::{MU_SCENE, SCENE_SCALE, SECONDS_PER_DAY};
use crate::orbit::{propagate_universal, BodyState, Vec3};
use crate::store::{ParticleSlot, ParticleStore};
use crate::{FrameUniform, ParticleSeed};
use cgmath::InnerSpace;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
  #[default]
  White,
  Age,
  Beta,
  RelativeVelocity,
  Distance,
}

impl ColorMode {
  /// Index the GPU draw stage switches on.
  #[must_use]
  pub const fn shader_index(self) -> u32 {
    match self {
      Self::White => 0,
      Self::Age => 1,
      Self::Beta => 2,
      Self::RelativeVelocity => 3,
      Self::Distance => 4,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
  pub mode: ColorMode,
  /// Relative speed (m/s) mapped to the hot end of the gradient.
  pub speed_norm_ms: f64,
  /// Distance from the nucleus (m) mapped to the hot end of the gradient.
  pub distance_norm_m: f64,
}

impl Default for ColorSettings {
  fn default() -> Self {
    Self {
      mode: ColorMode::White,
      speed_norm_ms: 2_000.0,
      distance_norm_m: 5e9,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorInput {
  pub life_fraction: f64,
  pub beta: f64,
  pub relative_speed_ms: f64,
  pub distance_m: f64,
}

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
const COLD: [f32; 3] = [0.35, 0.55, 1.0];
const HOT: [f32; 3] = [1.0, 0.45, 0.15];

fn lerp(a: [f32; 3], b: [f32; 3], t: f64) -> [f32; 3] {
  let t = t.clamp(0.0, 1.0) as f32;
  [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t, a[2] + (b[2] - a[2]) * t]
}

/// The one colour mapping shared by both backends.
#[must_use]
pub fn colorize(settings: &ColorSettings, input: &ColorInput) -> [f32; 3] {
  match settings.mode {
    ColorMode::White => WHITE,
    ColorMode::Age => lerp(WHITE, HOT, 1.0 - input.life_fraction),
    ColorMode::Beta => lerp(COLD, HOT, input.beta),
    ColorMode::RelativeVelocity => lerp(COLD, HOT, input.relative_speed_ms / settings.speed_norm_ms.max(1e-9)),
    ColorMode::Distance => lerp(COLD, HOT, input.distance_m / settings.distance_norm_m.max(1e-9)),
  }
}

/// Everything a strategy needs to advance one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
  /// Current epoch (JD)
  pub epoch: f64,
  /// Store clock (s) used for expiry
  pub clock: f64,
  pub dt_seconds: f64,
  pub comet: BodyState,
  pub color: ColorSettings,
  pub base_lifetime_seconds: f64,
  pub view_proj: [[f32; 4]; 4],
}

/// A live particle as handed to the renderer by the CPU backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderedParticle {
  pub index: usize,
  pub position: Vec3,
  pub velocity: Vec3,
  /// remaining life fraction
  pub alpha: f32,
  pub beta: f64,
  pub color: [f32; 3],
}

pub trait ParticleIntegrationStrategy {
  fn capacity(&self) -> usize;
  /// A slot was (re)written by emission.
  fn seed(&mut self, index: usize, slot: &ParticleSlot);
  /// Bring every live slot to `frame.epoch`.
  fn advance(&mut self, store: &ParticleStore, frame: &Frame);
  fn clear(&mut self);
  /// Live particles as of the last `advance`.
  fn active_count(&self) -> usize;
}

/// Position and velocity of `slot` at `epoch`, from its birth state.
#[must_use]
pub fn slot_state_at(slot: &ParticleSlot, epoch: f64) -> (Vec3, Vec3) {
  let dt = (epoch - slot.birth_epoch) * SECONDS_PER_DAY;
  if dt < 0.0 {
    return (slot.position0, slot.velocity0);
  }
  propagate_universal(slot.position0, slot.velocity0, dt, slot.mu_eff)
}

/// Re-derives each live particle analytically from its birth state every
/// tick, so results do not depend on frame rate.
#[derive(Debug)]
pub struct CpuIntegrator {
  capacity: usize,
  particles: Vec<RenderedParticle>,
}

impl CpuIntegrator {
  #[must_use]
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      particles: Vec::with_capacity(capacity),
    }
  }

  #[must_use]
  pub fn particles(&self) -> &[RenderedParticle] {
    &self.particles
  }
}

impl ParticleIntegrationStrategy for CpuIntegrator {
  fn capacity(&self) -> usize {
    self.capacity
  }

  fn seed(&mut self, _index: usize, _slot: &ParticleSlot) {}

  fn advance(&mut self, store: &ParticleStore, frame: &Frame) {
    self.particles.clear();
    for (index, slot) in store.live(frame.clock) {
      let (position, velocity) = slot_state_at(slot, frame.epoch);
      let life_fraction = slot.life_fraction(frame.clock);
      let input = ColorInput {
        life_fraction,
        beta: slot.beta,
        relative_speed_ms: (velocity - frame.comet.velocity).magnitude(),
        distance_m: (position - frame.comet.position).magnitude(),
      };
      self.particles.push(RenderedParticle {
        index,
        position,
        velocity,
        alpha: life_fraction as f32,
        beta: slot.beta,
        color: colorize(&frame.color, &input),
      });
    }
  }

  fn clear(&mut self) {
    self.particles.clear();
  }

  fn active_count(&self) -> usize {
    self.particles.len()
  }
}

/// The GPU side of the boundary: buffers and dispatch live behind this.
pub trait GpuSink {
  fn capacity(&self) -> usize;
  fn seed(&mut self, index: usize, seed: &ParticleSeed);
  fn update(&mut self, uniform: &FrameUniform);
  fn clear(&mut self);
}

fn to_scene(v: Vec3, w: f64) -> [f32; 4] {
  [
    (v.x * SCENE_SCALE) as f32,
    (v.y * SCENE_SCALE) as f32,
    (v.z * SCENE_SCALE) as f32,
    w as f32,
  ]
}

#[must_use]
pub fn seed_for(slot: &ParticleSlot) -> ParticleSeed {
  ParticleSeed {
    pos_life: to_scene(slot.position0, slot.lifetime_seconds),
    vel_beta: to_scene(slot.velocity0, slot.beta),
  }
}

#[must_use]
pub fn frame_uniform(frame: &Frame, max_count: usize) -> FrameUniform {
  FrameUniform {
    view_proj: frame.view_proj,
    comet_pos: to_scene(frame.comet.position, 1.0),
    comet_vel: to_scene(frame.comet.velocity, 0.0),
    dt_seconds: frame.dt_seconds as f32,
    max_count: u32::try_from(max_count.max(1)).unwrap_or(u32::MAX),
    mu_scene: MU_SCENE as f32,
    color_mode: frame.color.mode.shader_index(),
    life_fade_inv: (1.0 / frame.base_lifetime_seconds.max(1e-6)) as f32,
    speed_norm: (frame.color.speed_norm_ms * SCENE_SCALE) as f32,
    distance_norm: (frame.color.distance_norm_m * SCENE_SCALE) as f32,
    _pad: 0.0,
  }
}

/// Forwards seeds and one update per tick to a [`GpuSink`]. Nothing is read
/// back, so the active count comes from expiry bookkeeping.
///
/// Seeds written during a tick are held until that tick's dispatch has run,
/// so a grain born at `frame.epoch` sits at its birth state like it does on
/// the CPU.
pub struct GpuIntegrator<S: GpuSink> {
  sink: S,
  pending: Vec<(usize, ParticleSeed)>,
  active: usize,
}

impl<S: GpuSink> GpuIntegrator<S> {
  pub fn new(sink: S) -> Self {
    Self {
      sink,
      pending: Vec::new(),
      active: 0,
    }
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }
}

impl<S: GpuSink> ParticleIntegrationStrategy for GpuIntegrator<S> {
  fn capacity(&self) -> usize {
    self.sink.capacity()
  }

  fn seed(&mut self, index: usize, slot: &ParticleSlot) {
    self.pending.push((index, seed_for(slot)));
  }

  fn advance(&mut self, store: &ParticleStore, frame: &Frame) {
    self.sink.update(&frame_uniform(frame, store.max_used()));
    // in order, so a slot rewritten twice keeps its latest seed
    for (index, seed) in self.pending.drain(..) {
      self.sink.seed(index, &seed);
    }
    self.active = store.live_count(frame.clock);
  }

  fn clear(&mut self) {
    self.pending.clear();
    self.sink.clear();
    self.active = 0;
  }

  fn active_count(&self) -> usize {
    self.active
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::{AU, GM_SUN};
  use approx::assert_relative_eq;
  use cgmath::Zero;

  #[derive(Default)]
  struct RecordingSink {
    /// index, seed, and how many updates ran before it arrived
    seeds: Vec<(usize, ParticleSeed, usize)>,
    updates: Vec<FrameUniform>,
    clears: usize,
  }

  impl GpuSink for RecordingSink {
    fn capacity(&self) -> usize {
      1_000
    }

    fn seed(&mut self, index: usize, seed: &ParticleSeed) {
      self.seeds.push((index, *seed, self.updates.len()));
    }

    fn update(&mut self, uniform: &FrameUniform) {
      self.updates.push(*uniform);
    }

    fn clear(&mut self) {
      self.clears += 1;
    }
  }

  fn comet() -> BodyState {
    BodyState {
      position: Vec3::new(AU, 0.0, 0.0),
      velocity: Vec3::new(0.0, 42_000.0, 0.0),
      epoch: 2_451_545.0,
    }
  }

  fn frame(epoch: f64, clock: f64) -> Frame {
    Frame {
      epoch,
      clock,
      dt_seconds: 60.0,
      comet: comet(),
      color: ColorSettings::default(),
      base_lifetime_seconds: 10.0 * SECONDS_PER_DAY,
      view_proj: FrameUniform::default().view_proj,
    }
  }

  fn live_slot(beta: f64) -> ParticleSlot {
    let c = comet();
    ParticleSlot {
      birth_epoch: c.epoch,
      position0: c.position,
      velocity0: c.velocity,
      mu_eff: GM_SUN * (1.0 - beta),
      beta,
      lifetime_seconds: 10.0 * SECONDS_PER_DAY,
      expiry_time: 10.0 * SECONDS_PER_DAY,
      populated: true,
    }
  }

  #[test]
  fn colorize_modes() {
    let input = ColorInput {
      life_fraction: 1.0,
      beta: 1.0,
      relative_speed_ms: 1e9,
      distance_m: 0.0,
    };
    let mut settings = ColorSettings::default();
    assert_eq!(colorize(&settings, &input), WHITE);
    settings.mode = ColorMode::Age;
    assert_eq!(colorize(&settings, &input), WHITE);
    settings.mode = ColorMode::Beta;
    assert_eq!(colorize(&settings, &input), HOT);
    settings.mode = ColorMode::RelativeVelocity;
    assert_eq!(colorize(&settings, &input), HOT);
    settings.mode = ColorMode::Distance;
    assert_eq!(colorize(&settings, &input), COLD);
  }

  #[test]
  fn cpu_matches_analytic_propagation() {
    let mut store = ParticleStore::new(8);
    store.allocate(live_slot(0.0), 0.0);
    store.allocate(live_slot(1.0), 0.0);
    let mut cpu = CpuIntegrator::new(8);
    cpu.advance(&store, &frame(comet().epoch + 2.0, 2.0 * SECONDS_PER_DAY));
    assert_eq!(cpu.active_count(), 2);

    let c = comet();
    let dt = 2.0 * SECONDS_PER_DAY;
    let (expected, _) = propagate_universal(c.position, c.velocity, dt, GM_SUN);
    assert_relative_eq!(cpu.particles()[0].position.x, expected.x, max_relative = 1e-12);
    // β = 1 drifts in a straight line
    assert_relative_eq!(cpu.particles()[1].position.y, c.velocity.y * dt);
    assert_relative_eq!(cpu.particles()[1].alpha, 0.8, epsilon = 1e-6);
  }

  #[test]
  fn cpu_skips_expired() {
    let mut store = ParticleStore::new(4);
    store.allocate(live_slot(0.3), 0.0);
    let mut cpu = CpuIntegrator::new(4);
    cpu.advance(&store, &frame(comet().epoch + 11.0, 11.0 * SECONDS_PER_DAY));
    assert_eq!(cpu.active_count(), 0);
  }

  #[test]
  fn gpu_forwards_seeds_and_updates() {
    let mut store = ParticleStore::new(16);
    let mut gpu = GpuIntegrator::new(RecordingSink::default());
    for _ in 0..3 {
      let slot = live_slot(0.5);
      let index = store.allocate(slot, 0.0).unwrap();
      gpu.seed(index, &slot);
    }
    assert!(gpu.sink().seeds.is_empty());
    gpu.advance(&store, &frame(comet().epoch, 0.0));

    let sink = gpu.sink();
    assert_eq!(sink.seeds.len(), 3);
    // the dispatch for this tick runs before the new grains land
    assert!(sink.seeds.iter().all(|(_, _, updates)| *updates == 1));
    let (index, seed, _) = sink.seeds[2];
    assert_eq!(index, 2);
    assert_relative_eq!(seed.pos_life[0], (AU * SCENE_SCALE) as f32);
    assert_relative_eq!(seed.vel_beta[3], 0.5);
    assert_eq!(sink.updates.len(), 1);
    assert_eq!(sink.updates[0].max_count, 3);
    assert_eq!(gpu.active_count(), 3);

    gpu.clear();
    assert_eq!(gpu.sink().clears, 1);
    assert_eq!(gpu.active_count(), 0);
  }

  #[test]
  fn gpu_clear_drops_unflushed_seeds() {
    let mut store = ParticleStore::new(4);
    let mut gpu = GpuIntegrator::new(RecordingSink::default());
    let slot = live_slot(0.5);
    let index = store.allocate(slot, 0.0).unwrap();
    gpu.seed(index, &slot);
    gpu.clear();
    store.clear();
    gpu.advance(&store, &frame(comet().epoch, 0.0));
    assert!(gpu.sink().seeds.is_empty());
    assert_eq!(gpu.sink().updates.len(), 1);
  }

  #[test]
  fn empty_store_still_dispatches_one() {
    let store = ParticleStore::new(4);
    let mut f = frame(comet().epoch, 0.0);
    f.comet.velocity = Vec3::zero();
    let uniform = frame_uniform(&f, store.max_used());
    assert_eq!(uniform.max_count, 1);
  }
}
