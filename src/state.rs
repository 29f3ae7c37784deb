//! The simulation context and the headless driver around it.

use crate::activity::{ActivityState, BirthAccumulator};
use crate::beta::BetaSampler;
use crate::camera::Camera;
use crate::constants::{AU, SECONDS_PER_DAY, UI_PERIOD};
use crate::gpu::GpuParticles;
use crate::orbit::{comet_state_at_epoch, planet_state_at_epoch, BodyState, OrbitalElements, Vec3, EARTH};
use crate::params::{Backend, Derived, Parameters};
use crate::store::{ParticleSlot, ParticleStore};
use crate::strategy::{CpuIntegrator, Frame, GpuIntegrator, ParticleIntegrationStrategy};
use crate::synchrone::{build_synchrones, build_syndynes, SynchroneLine, SyndyneLine};
use crate::time::format_jd;
use crate::Result;
use cgmath::InnerSpace;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
  pub epoch: f64,
  pub dt_seconds: f64,
  pub heliocentric_distance_au: f64,
  pub born: u32,
  /// Births dropped because no slot was free.
  pub dropped: u32,
  pub live: usize,
}

fn activity_for(params: &Parameters) -> ActivityState {
  ActivityState::new(
    params.activity.half_life_days,
    params.activity.exponent,
    params.activity.scale,
  )
}

/// All mutable simulation state. Nothing in the crate keeps state outside it.
pub struct SimulationContext<S: ParticleIntegrationStrategy> {
  params: Parameters,
  derived: Derived,
  elements: OrbitalElements,
  activity: ActivityState,
  beta: BetaSampler,
  store: ParticleStore,
  births: BirthAccumulator,
  strategy: S,
  rng: SmallRng,
  /// Current epoch (JD)
  epoch: f64,
  /// Store clock (s), restarts at zero on every reset
  clock: f64,
  paused: bool,
  comet: BodyState,
  pub camera: Camera,
}

impl<S: ParticleIntegrationStrategy> SimulationContext<S> {
  pub fn new(params: Parameters, strategy: S) -> Self {
    Self::with_rng(params, strategy, SmallRng::from_entropy())
  }

  pub fn with_seed(params: Parameters, strategy: S, seed: u64) -> Self {
    Self::with_rng(params, strategy, SmallRng::seed_from_u64(seed))
  }

  fn with_rng(params: Parameters, strategy: S, rng: SmallRng) -> Self {
    let params = params.sanitized();
    let elements = params.elements();
    let epoch = params.start_jd;
    let capacity = strategy.capacity();
    let derived = params.derive();
    log::info!(
      "Simulating {} particles from {}; a = {:?} AU, period = {:?} days",
      capacity,
      format_jd(epoch),
      derived.semi_major_axis_au,
      derived.period_days
    );
    Self {
      derived,
      elements,
      activity: activity_for(&params),
      beta: params.beta_sampler(),
      store: ParticleStore::new(capacity),
      births: BirthAccumulator::new(),
      strategy,
      rng,
      epoch,
      clock: 0.0,
      paused: false,
      comet: comet_state_at_epoch(&elements, epoch),
      camera: Camera::default(),
      params,
    }
  }

  /// Swap in new parameters and recompute everything derived from them.
  /// Changed orbital elements invalidate every particle. The backend and
  /// capacities are fixed for the life of the context.
  pub fn apply(&mut self, params: Parameters) {
    let mut params = params.sanitized();
    if params.backend != self.params.backend || params.capacity() != self.params.capacity() {
      log::warn!(
        "Backend and capacity changes take effect on restart; keeping {:?} with {} slots",
        self.params.backend,
        self.store.capacity()
      );
      params.backend = self.params.backend;
      params.cpu_capacity = self.params.cpu_capacity;
      params.gpu_capacity = self.params.gpu_capacity;
    }
    let elements = params.elements();
    let orbit_changed = elements != self.elements;

    self.derived = params.derive();
    self.beta = params.beta_sampler();
    let exposure = self.activity.cumulative_exposure;
    self.activity = ActivityState {
      cumulative_exposure: exposure,
      ..activity_for(&params)
    };
    self.elements = elements;
    self.params = params;
    log::info!(
      "Applied parameters; a = {:?} AU, period = {:?} days",
      self.derived.semi_major_axis_au,
      self.derived.period_days
    );

    if orbit_changed {
      self.reset();
    }
    self.comet = comet_state_at_epoch(&self.elements, self.epoch);
  }

  /// Empty the store and forget all activity history.
  pub fn reset(&mut self) {
    self.store.clear();
    self.strategy.clear();
    self.activity.reset();
    self.births.reset();
    self.clock = 0.0;
    log::debug!("Cleared particle store");
  }

  pub fn set_paused(&mut self, paused: bool) {
    self.paused = paused;
  }

  #[must_use]
  pub fn paused(&self) -> bool {
    self.paused
  }

  /// Jump the timeline to `start_jd + day_offset`. Ignored unless paused.
  pub fn scrub_to(&mut self, day_offset: f64) -> bool {
    if !self.paused || !day_offset.is_finite() {
      return false;
    }
    self.epoch = self.params.start_jd + day_offset;
    self.reset();
    self.comet = comet_state_at_epoch(&self.elements, self.epoch);
    self.advance_strategy(0.0);
    log::info!("Scrubbed to {}", format_jd(self.epoch));
    true
  }

  /// One frame: advance time, age the nucleus, emit, then advance particles.
  pub fn tick(&mut self, real_dt: f64) -> TickReport {
    let dt_seconds = if self.paused || !(real_dt > 0.0) {
      0.0
    } else {
      real_dt * self.params.time_rate()
    };
    self.epoch += dt_seconds / SECONDS_PER_DAY;
    self.clock += dt_seconds;

    let comet = comet_state_at_epoch(&self.elements, self.epoch);
    self.comet = comet;
    let r_au = comet.position.magnitude() / AU;
    self
      .activity
      .update_exposure(r_au, dt_seconds / SECONDS_PER_DAY, self.params.activity.cutoff_au);

    let (mut born, mut dropped) = (0, 0);
    if !self.paused {
      let q = self.activity.production_rate(r_au);
      let target = self.params.max_births_per_frame * q.min(1.0);
      for _ in 0..self.births.take_capped(target) {
        let beta = self.beta.sample(&mut self.rng);
        let sample = self.params.emission.sample_direction(&comet, &mut self.rng);
        let particle = self.params.emission.build_particle(
          &comet,
          beta,
          &sample,
          self.params.lifetime_days,
          self.params.velocity_scale,
        );
        let slot = ParticleSlot::from_emission(&particle, self.epoch, self.clock);
        match self.store.allocate(slot, self.clock) {
          Some(index) => {
            self.strategy.seed(index, &slot);
            born += 1;
          }
          None => dropped += 1,
        }
      }
      if dropped > 0 {
        log::debug!("Dropped {dropped} births, store full");
      }
    }

    self.advance_strategy(dt_seconds);
    TickReport {
      epoch: self.epoch,
      dt_seconds,
      heliocentric_distance_au: r_au,
      born,
      dropped,
      live: self.strategy.active_count(),
    }
  }

  fn advance_strategy(&mut self, dt_seconds: f64) {
    self.camera.track(self.comet.position);
    let frame = Frame {
      epoch: self.epoch,
      clock: self.clock,
      dt_seconds,
      comet: self.comet,
      color: self.params.color,
      base_lifetime_seconds: self.params.lifetime_seconds(),
      view_proj: self.camera.view_proj(),
    };
    self.strategy.advance(&self.store, &frame);
  }

  /// Synchrones at the current epoch.
  #[must_use]
  pub fn synchrones(&self, offsets: &[f64], betas: &[f64]) -> Vec<SynchroneLine> {
    build_synchrones(&self.elements, self.epoch, offsets, betas)
  }

  /// Syndynes at the current epoch.
  #[must_use]
  pub fn syndynes(&self, offsets: &[f64], betas: &[f64]) -> Vec<SyndyneLine> {
    build_syndynes(&self.elements, self.epoch, offsets, betas)
  }

  #[must_use]
  pub fn comet(&self) -> &BodyState {
    &self.comet
  }

  #[must_use]
  pub fn earth(&self) -> Vec3 {
    planet_state_at_epoch(&EARTH, self.epoch)
  }

  #[must_use]
  pub fn epoch(&self) -> f64 {
    self.epoch
  }

  #[must_use]
  pub fn clock(&self) -> f64 {
    self.clock
  }

  #[must_use]
  pub fn live_count(&self) -> usize {
    self.store.live_count(self.clock)
  }

  #[must_use]
  pub fn params(&self) -> &Parameters {
    &self.params
  }

  #[must_use]
  pub fn derived(&self) -> &Derived {
    &self.derived
  }

  #[must_use]
  pub fn activity(&self) -> &ActivityState {
    &self.activity
  }

  #[must_use]
  pub fn store(&self) -> &ParticleStore {
    &self.store
  }

  #[must_use]
  pub fn strategy(&self) -> &S {
    &self.strategy
  }
}

/// Options for a headless run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunOptions {
  /// Stop after this many ticks; None runs until interrupted.
  pub ticks: Option<u64>,
  /// Real seconds per tick.
  pub frame_dt: f64,
}

pub fn drive<S: ParticleIntegrationStrategy>(
  context: &mut SimulationContext<S>,
  options: RunOptions,
  stop: &AtomicBool,
) -> u64 {
  let mut ticks = 0;
  let mut since_status = 0.0;
  while options.ticks.map_or(true, |limit| ticks < limit) && !stop.load(Ordering::Relaxed) {
    let report = context.tick(options.frame_dt);
    ticks += 1;
    since_status += options.frame_dt;
    if since_status >= UI_PERIOD {
      since_status = 0.0;
      log::info!(
        "{}  r = {:.3} AU  live = {}  age = {:.3}",
        format_jd(report.epoch),
        report.heliocentric_distance_au,
        report.live,
        context.activity().age_factor()
      );
    }
  }
  log::info!(
    "Stopped after {ticks} ticks at {} with {} live particles",
    format_jd(context.epoch()),
    context.live_count()
  );
  ticks
}

/// Build the configured backend and run it headless until done or `stop`.
pub fn run(params: Parameters, options: RunOptions, stop: Arc<AtomicBool>) -> Result<u64> {
  let capacity = params.capacity();
  let ticks = match params.backend {
    Backend::Cpu => {
      let mut context = SimulationContext::new(params, CpuIntegrator::new(capacity));
      drive(&mut context, options, &stop)
    }
    Backend::Gpu => {
      let sink = GpuParticles::new_blocking(capacity)?;
      let mut context = SimulationContext::new(params, GpuIntegrator::new(sink));
      drive(&mut context, options, &stop)
    }
  };
  Ok(ticks)
}
