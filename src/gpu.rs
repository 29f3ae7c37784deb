//! wgpu compute collaborator for the GPU backend.
//!
//! Holds the particle storage buffers and runs `shaders/compute.wgsl` once
//! per tick. Nothing is read back to the host.

use crate::strategy::GpuSink;
use crate::{Error, FrameUniform, ParticleSeed, Result};
use std::borrow::Cow;
use wgpu::{util::DeviceExt, PipelineCompilationOptions};

const PARTICLES_PER_GROUP: u32 = 64;
/// One vec4<f32> per slot in each buffer.
const SLOT_STRIDE: u64 = 16;

pub struct GpuParticles {
  device: wgpu::Device,
  queue: wgpu::Queue,
  pos_life_buffer: wgpu::Buffer,
  vel_beta_buffer: wgpu::Buffer,
  frame_buffer: wgpu::Buffer,
  bind_group: wgpu::BindGroup,
  compute_pipeline: wgpu::ComputePipeline,
  capacity: usize,
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
  wgpu::BindGroupLayoutEntry {
    binding,
    visibility: wgpu::ShaderStages::COMPUTE,
    ty: wgpu::BindingType::Buffer {
      ty: wgpu::BufferBindingType::Storage { read_only: false },
      has_dynamic_offset: false,
      min_binding_size: wgpu::BufferSize::new(SLOT_STRIDE),
    },
    count: None,
  }
}

impl GpuParticles {
  pub async fn init(capacity: usize) -> Result<Self> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
      #[cfg(not(target_arch = "wasm32"))]
      backends: wgpu::Backends::PRIMARY,
      ..Default::default()
    });

    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
      })
      .await
      .ok_or(Error::NoAdapter)?;
    log::info!("GPU adapter: {:?}", adapter.get_info().name);

    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          label: Some("comet-tail"),
          required_features: wgpu::Features::empty(),
          required_limits: wgpu::Limits::default(),
          memory_hints: Default::default(),
        },
        None,
      )
      .await?;

    let compute_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("particle leapfrog"),
      source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/compute.wgsl"))),
    });

    let capacity = capacity.max(1);
    let buffer_size = capacity as u64 * SLOT_STRIDE;
    let particle_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
    let pos_life_buffer = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("Particle posLife Buffer"),
      size: buffer_size,
      usage: particle_usage,
      mapped_at_creation: false,
    });
    let vel_beta_buffer = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("Particle velBeta Buffer"),
      size: buffer_size,
      usage: particle_usage,
      mapped_at_creation: false,
    });
    let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("Frame Uniform Buffer"),
      contents: bytemuck::cast_slice(&[FrameUniform::default()]),
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      entries: &[
        storage_entry(0),
        storage_entry(1),
        wgpu::BindGroupLayoutEntry {
          binding: 2,
          visibility: wgpu::ShaderStages::COMPUTE,
          ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<FrameUniform>() as _),
          },
          count: None,
        },
      ],
      label: Some("particle_bind_group_layout"),
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
      layout: &bind_group_layout,
      entries: &[
        wgpu::BindGroupEntry {
          binding: 0,
          resource: pos_life_buffer.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
          binding: 1,
          resource: vel_beta_buffer.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
          binding: 2,
          resource: frame_buffer.as_entire_binding(),
        },
      ],
      label: Some("particle_bind_group"),
    });

    let compute_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("compute"),
      bind_group_layouts: &[&bind_group_layout],
      push_constant_ranges: &[],
    });
    let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
      label: Some("Compute pipeline"),
      layout: Some(&compute_pipeline_layout),
      module: &compute_shader,
      entry_point: "main",
      compilation_options: PipelineCompilationOptions::default(),
      cache: None,
    });

    Ok(Self {
      device,
      queue,
      pos_life_buffer,
      vel_beta_buffer,
      frame_buffer,
      bind_group,
      compute_pipeline,
      capacity,
    })
  }

  pub fn new_blocking(capacity: usize) -> Result<Self> {
    pollster::block_on(Self::init(capacity))
  }
}

impl GpuSink for GpuParticles {
  fn capacity(&self) -> usize {
    self.capacity
  }

  fn seed(&mut self, index: usize, seed: &ParticleSeed) {
    if index >= self.capacity {
      log::warn!("Ignoring GPU seed for slot {index} beyond capacity {}", self.capacity);
      return;
    }
    let offset = index as u64 * SLOT_STRIDE;
    self
      .queue
      .write_buffer(&self.pos_life_buffer, offset, bytemuck::cast_slice(&seed.pos_life));
    self
      .queue
      .write_buffer(&self.vel_beta_buffer, offset, bytemuck::cast_slice(&seed.vel_beta));
  }

  fn update(&mut self, uniform: &FrameUniform) {
    self
      .queue
      .write_buffer(&self.frame_buffer, 0, bytemuck::cast_slice(&[*uniform]));

    let count = uniform.max_count.min(self.capacity as u32);
    let work_group_count = count.div_ceil(PARTICLES_PER_GROUP);
    let mut command_encoder = self
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
      let mut cpass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("particle advance"),
        timestamp_writes: None,
      });
      cpass.set_pipeline(&self.compute_pipeline);
      cpass.set_bind_group(0, &self.bind_group, &[]);
      cpass.dispatch_workgroups(work_group_count, 1, 1);
    }
    self.queue.submit(Some(command_encoder.finish()));
  }

  fn clear(&mut self) {
    let mut command_encoder = self
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("clear") });
    command_encoder.clear_buffer(&self.pos_life_buffer, 0, None);
    command_encoder.clear_buffer(&self.vel_beta_buffer, 0, None);
    self.queue.submit(Some(command_encoder.finish()));
  }
}
