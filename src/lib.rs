pub mod activity;
pub mod beta;
pub mod camera;
pub mod constants;
pub mod emission;
pub mod error;
pub mod gpu;
pub mod orbit;
pub mod params;
pub mod state;
pub mod store;
pub mod strategy;
pub mod synchrone;
pub mod time;

pub use error::{Error, Result};

/// Per-slot seed written into the GPU particle buffers. Scene units.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleSeed {
  /// xyz position, w remaining life (s)
  pub pos_life: [f32; 4],
  /// xyz velocity, w β
  pub vel_beta: [f32; 4],
}

/// Uniform handed to the GPU collaborator every tick. The core fills it but
/// never interprets `view_proj` or the colour fields.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
  pub view_proj: [[f32; 4]; 4],
  pub comet_pos: [f32; 4],
  pub comet_vel: [f32; 4],
  pub dt_seconds: f32,
  pub max_count: u32,
  pub mu_scene: f32,
  pub color_mode: u32,
  pub life_fade_inv: f32,
  pub speed_norm: f32,
  pub distance_norm: f32,
  pub _pad: f32,
}

impl Default for FrameUniform {
  fn default() -> Self {
    Self {
      view_proj: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]],
      comet_pos: [0.0; 4],
      comet_vel: [0.0; 4],
      dt_seconds: 0.0,
      max_count: 0,
      mu_scene: constants::MU_SCENE as f32,
      color_mode: 0,
      life_fade_inv: 0.0,
      speed_norm: 1.0,
      distance_norm: 1.0,
      _pad: 0.0,
    }
  }
}
