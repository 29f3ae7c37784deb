use crate::constants::SCENE_SCALE;
use crate::orbit::Vec3;
use cgmath::{InnerSpace, Point3, Vector3};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.5,
    0.0, 0.0, 0.0, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewAxis {
  X,
  Y,
  Z,
}

/// Scene-space camera whose matrix is passed through to the GPU collaborator.
#[derive(Clone, Debug)]
pub struct Camera {
  pub eye: Point3<f32>,
  pub target: Point3<f32>,
  pub up: Vector3<f32>,
  pub aspect: f32,
  pub fovy: f32,
  pub znear: f32,
  pub zfar: f32,
  /// Keep `target` on the comet each tick.
  pub follow_comet: bool,
}

impl Default for Camera {
  fn default() -> Self {
    Self {
      eye: (0.0, 60.0, 100.0).into(),
      target: (0.0, 0.0, 0.0).into(),
      up: Vector3::unit_y(),
      aspect: 16.0 / 9.0,
      fovy: 45.0,
      znear: 0.1,
      zfar: 1e9,
      follow_comet: false,
    }
  }
}

/// Metres to a scene-space point.
#[must_use]
pub fn scene_point(v: Vec3) -> Point3<f32> {
  Point3::new(
    (v.x * SCENE_SCALE) as f32,
    (v.y * SCENE_SCALE) as f32,
    (v.z * SCENE_SCALE) as f32,
  )
}

impl Camera {
  #[must_use]
  pub fn build_view_projection_matrix(&self) -> cgmath::Matrix4<f32> {
    let view = cgmath::Matrix4::look_at_rh(self.eye, self.target, self.up);
    let proj = cgmath::perspective(cgmath::Deg(self.fovy), self.aspect, self.znear, self.zfar);
    OPENGL_TO_WGPU_MATRIX * proj * view
  }

  #[must_use]
  pub fn view_proj(&self) -> [[f32; 4]; 4] {
    self.build_view_projection_matrix().into()
  }

  /// Move the target to the comet, carrying the eye along with it.
  pub fn track(&mut self, comet_position: Vec3) {
    if !self.follow_comet {
      return;
    }
    let target = scene_point(comet_position);
    let offset = self.eye - self.target;
    self.target = target;
    self.eye = target + offset;
  }

  /// Look at the origin along a principal axis, keeping the current distance.
  pub fn snap_to_axis(&mut self, axis: ViewAxis) {
    if self.follow_comet {
      return;
    }
    let distance = (self.eye - self.target).magnitude();
    self.target = Point3::new(0.0, 0.0, 0.0);
    let (direction, up) = match axis {
      ViewAxis::X => (Vector3::unit_x(), Vector3::unit_z()),
      ViewAxis::Y => (Vector3::unit_y(), Vector3::unit_z()),
      ViewAxis::Z => (Vector3::unit_z(), Vector3::unit_y()),
    };
    self.eye = self.target + direction * distance;
    self.up = up;
  }
}
