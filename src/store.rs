//! Fixed-capacity particle slots with expiry-based recycling.

use crate::emission::EmittedParticle;
use crate::orbit::Vec3;
use cgmath::Zero;

/// One dust grain. Owned by [`ParticleStore`] at a fixed index and
/// overwritten in place when recycled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSlot {
  /// Julian date of emission
  pub birth_epoch: f64,
  pub position0: Vec3,
  pub velocity0: Vec3,
  pub mu_eff: f64,
  pub beta: f64,
  pub lifetime_seconds: f64,
  /// Store clock (seconds) after which the slot may be reused
  pub expiry_time: f64,
  /// Written since the last clear
  pub populated: bool,
}

impl ParticleSlot {
  #[must_use]
  pub fn from_emission(particle: &EmittedParticle, birth_epoch: f64, now: f64) -> Self {
    Self {
      birth_epoch,
      position0: particle.position,
      velocity0: particle.velocity,
      mu_eff: particle.mu_eff,
      beta: particle.beta,
      lifetime_seconds: particle.lifetime_seconds,
      expiry_time: now + particle.lifetime_seconds,
      populated: true,
    }
  }

  #[must_use]
  pub fn is_live(&self, now: f64) -> bool {
    self.populated && now < self.expiry_time
  }

  /// Remaining fraction of the lifetime, in [0, 1].
  #[must_use]
  pub fn life_fraction(&self, now: f64) -> f64 {
    if self.lifetime_seconds <= 0.0 {
      return 0.0;
    }
    ((self.expiry_time - now) / self.lifetime_seconds).clamp(0.0, 1.0)
  }
}

impl Default for ParticleSlot {
  fn default() -> Self {
    Self {
      birth_epoch: 0.0,
      position0: Vec3::zero(),
      velocity0: Vec3::zero(),
      mu_eff: 0.0,
      beta: 0.0,
      lifetime_seconds: 0.0,
      expiry_time: 0.0,
      populated: false,
    }
  }
}

/// Index arena: slot array, circular write cursor and high-water mark.
#[derive(Clone, Debug)]
pub struct ParticleStore {
  slots: Vec<ParticleSlot>,
  cursor: usize,
  max_used: usize,
}

impl ParticleStore {
  #[must_use]
  pub fn new(capacity: usize) -> Self {
    Self {
      slots: vec![ParticleSlot::default(); capacity],
      cursor: 0,
      max_used: 0,
    }
  }

  /// Place `slot` in the first reusable slot at or after the cursor.
  ///
  /// Returns `None` when a full sweep finds nothing expired; the birth is
  /// dropped.
  pub fn allocate(&mut self, slot: ParticleSlot, now: f64) -> Option<usize> {
    let capacity = self.slots.len();
    if capacity == 0 {
      return None;
    }
    let mut index = self.cursor % capacity;
    let mut tries = 0;
    while tries < capacity && self.slots[index].is_live(now) {
      index = (index + 1) % capacity;
      tries += 1;
    }
    if tries == capacity {
      self.cursor = index;
      return None;
    }

    self.slots[index] = ParticleSlot {
      populated: true,
      ..slot
    };
    self.cursor = (index + 1) % capacity;
    self.max_used = self.max_used.max(index + 1);
    Some(index)
  }

  #[must_use]
  pub fn live_count(&self, now: f64) -> usize {
    self.slots[..self.max_used]
      .iter()
      .filter(|s| s.is_live(now))
      .count()
  }

  /// Live slots below the high-water mark, with their indices.
  pub fn live(&self, now: f64) -> impl Iterator<Item = (usize, &ParticleSlot)> + '_ {
    self.slots[..self.max_used]
      .iter()
      .enumerate()
      .filter(move |(_, s)| s.is_live(now))
  }

  pub fn clear(&mut self) {
    self.slots.fill(ParticleSlot::default());
    self.cursor = 0;
    self.max_used = 0;
  }

  #[must_use]
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  #[must_use]
  pub fn cursor(&self) -> usize {
    self.cursor
  }

  /// One past the highest slot index ever written since the last clear.
  #[must_use]
  pub fn max_used(&self) -> usize {
    self.max_used
  }

  #[must_use]
  pub fn slot(&self, index: usize) -> Option<&ParticleSlot> {
    self.slots.get(index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn slot(lifetime: f64, now: f64) -> ParticleSlot {
    ParticleSlot {
      lifetime_seconds: lifetime,
      expiry_time: now + lifetime,
      populated: true,
      ..ParticleSlot::default()
    }
  }

  #[test]
  fn allocations_are_live_until_expiry() {
    let mut store = ParticleStore::new(16);
    for i in 0..10 {
      assert_eq!(store.allocate(slot(100.0, 0.0), 0.0), Some(i));
    }
    assert_eq!(store.live_count(0.0), 10);
    assert_eq!(store.max_used(), 10);
    assert_eq!(store.live_count(99.9), 10);
    assert_eq!(store.live_count(100.0), 0);
  }

  #[test]
  fn clear_resets_everything() {
    let mut store = ParticleStore::new(8);
    for _ in 0..5 {
      store.allocate(slot(10.0, 0.0), 0.0);
    }
    store.clear();
    assert_eq!(store.live_count(0.0), 0);
    assert_eq!(store.cursor(), 0);
    assert_eq!(store.max_used(), 0);
    assert_eq!(store.allocate(slot(10.0, 0.0), 0.0), Some(0));
  }

  #[test]
  fn full_store_drops_births() {
    let mut store = ParticleStore::new(4);
    for _ in 0..4 {
      assert!(store.allocate(slot(10.0, 0.0), 0.0).is_some());
    }
    assert_eq!(store.allocate(slot(10.0, 0.0), 1.0), None);
    assert_eq!(store.live_count(1.0), 4);
  }

  #[test]
  fn expired_slots_are_recycled_from_cursor() {
    let mut store = ParticleStore::new(4);
    store.allocate(slot(5.0, 0.0), 0.0);
    store.allocate(slot(50.0, 0.0), 0.0);
    store.allocate(slot(50.0, 0.0), 0.0);
    store.allocate(slot(50.0, 0.0), 0.0);
    // only slot 0 has expired; the cursor wraps around to it
    assert_eq!(store.allocate(slot(50.0, 10.0), 10.0), Some(0));
    assert_eq!(store.cursor(), 1);
    assert_eq!(store.max_used(), 4);
  }

  #[test]
  fn life_fraction_runs_down() {
    let s = slot(10.0, 0.0);
    assert_eq!(s.life_fraction(0.0), 1.0);
    assert_eq!(s.life_fraction(5.0), 0.5);
    assert_eq!(s.life_fraction(20.0), 0.0);
  }

  #[test]
  fn zero_capacity_rejects() {
    let mut store = ParticleStore::new(0);
    assert_eq!(store.allocate(slot(1.0, 0.0), 0.0), None);
  }
}
