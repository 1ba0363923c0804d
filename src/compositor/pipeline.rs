// SPDX-License-Identifier: GPL-3.0-only

//! Anaglyph render pipeline over a window surface
//!
//! Owns the wgpu device, the surface and the two per-eye texture feeds.
//! Each drawn frame pulls the newest camera frames onto the GPU and runs
//! one fullscreen pass of anaglyph.wgsl; while either eye has no frame
//! yet the surface just clears to black.

use std::sync::Arc;

use tracing::{debug, info};
use winit::window::Window;

use super::feed::TextureFeed;
use super::transform::{parallax_uv, EyeTransforms};
use crate::capture::types::{Eye, FrameTap};
use crate::errors::CompositorError;

/// Uniform block mirrored by `ComposeParams` in anaglyph.wgsl
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct ComposeParams {
    left_rotation: u32,
    right_rotation: u32,
    parallax: f32,
    _pad: u32,
}

impl ComposeParams {
    fn from_transforms(transforms: &EyeTransforms) -> Self {
        Self {
            left_rotation: transforms.left_rotation.gpu_code(),
            right_rotation: transforms.right_rotation.gpu_code(),
            parallax: parallax_uv(transforms.parallax),
            _pad: 0,
        }
    }
}

/// Realtime anaglyph compositor
pub struct Compositor {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    feed_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    params: ComposeParams,
    feeds: [TextureFeed; 2],
    feed_epochs: [u64; 2],
    feed_bind_group: Option<wgpu::BindGroup>,
}

impl Compositor {
    /// Bring up the GPU side against the given window
    pub async fn new(
        window: Arc<Window>,
        left_tap: FrameTap,
        right_tap: FrameTap,
    ) -> Result<Self, CompositorError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|e| CompositorError::Surface(format!("Failed to create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .map_err(|_| CompositorError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "Using graphics adapter"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Anaglyph Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| CompositorError::RequestDevice(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        // Camera frames arrive gamma encoded; a non-sRGB surface passes
        // them through unchanged
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or_else(|| caps.formats[0]);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Anaglyph Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("anaglyph.wgsl").into()),
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compose Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // Texture and sampler pair per eye, left then right
        let feed_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Feed Texture Layout"),
            entries: &[
                texture_layout_entry(0),
                sampler_layout_entry(1),
                texture_layout_entry(2),
                sampler_layout_entry(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Anaglyph Pipeline Layout"),
            bind_group_layouts: &[&params_layout, &feed_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Anaglyph Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let params = ComposeParams::from_transforms(&EyeTransforms::default());
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compose Params Buffer"),
            size: std::mem::size_of::<ComposeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compose Params Bind Group"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Feed Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        info!(
            width = surface_config.width,
            height = surface_config.height,
            format = ?surface_config.format,
            "Compositor ready"
        );

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            pipeline,
            sampler,
            feed_layout,
            params_buffer,
            params_bind_group,
            params,
            feeds: [
                TextureFeed::new(Eye::Left, left_tap),
                TextureFeed::new(Eye::Right, right_tap),
            ],
            feed_epochs: [0, 0],
            feed_bind_group: None,
        })
    }

    /// Reconfigure the surface after a window resize (or a lost surface)
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Push new transform parameters; the uniform is rewritten only when
    /// they actually changed
    pub fn set_transforms(&mut self, transforms: &EyeTransforms) {
        let params = ComposeParams::from_transforms(transforms);
        if params == self.params {
            return;
        }
        self.params = params;
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// Point both feeds at the taps of a freshly started session pair
    pub fn rebind_feeds(&mut self, left: FrameTap, right: FrameTap) {
        debug!("Rebinding feed taps");
        self.feeds[Eye::Left.index()].rebind(left);
        self.feeds[Eye::Right.index()].rebind(right);
    }

    /// Drop the feed textures after capture stops
    pub fn release_feeds(&mut self) {
        for feed in &mut self.feeds {
            feed.dispose();
        }
        self.feed_bind_group = None;
    }

    /// True when both eyes have a frame on the GPU
    pub fn feeds_ready(&self) -> bool {
        self.feeds.iter().all(|feed| feed.is_ready())
    }

    /// Upload pending frames and draw one output frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        for feed in &mut self.feeds {
            feed.refresh_if_ready(&self.device, &self.queue);
        }
        self.refresh_feed_bind_group();

        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Anaglyph Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Anaglyph Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Composite only with both eyes ready; otherwise leave the clear
            if self.feeds_ready() {
                if let Some(bind_group) = self.feed_bind_group.as_ref() {
                    pass.set_pipeline(&self.pipeline);
                    pass.set_bind_group(0, &self.params_bind_group, &[]);
                    pass.set_bind_group(1, bind_group, &[]);
                    pass.draw(0..3, 0..1);
                }
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Rebuild the feed bind group after either texture was (re)allocated
    fn refresh_feed_bind_group(&mut self) {
        let epochs = [self.feeds[0].epoch(), self.feeds[1].epoch()];
        if epochs == self.feed_epochs {
            return;
        }

        let bind_group = match (self.feeds[0].view(), self.feeds[1].view()) {
            (Some(left), Some(right)) => {
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Feed Bind Group"),
                    layout: &self.feed_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(left),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(right),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                }))
            }
            _ => None,
        };
        self.feed_bind_group = bind_group;
        self.feed_epochs = epochs;
    }
}

fn texture_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::transform::{sample_coord, Rotation};

    #[test]
    fn test_shader_parses_and_validates() {
        let module = naga::front::wgsl::parse_str(include_str!("anaglyph.wgsl"))
            .expect("shader should parse");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("shader should validate");
    }

    #[test]
    fn test_vertex_uv_keeps_the_video_upright() {
        // Mirror of vs_main: clip position is corner * 2 - 1 and uv is the
        // corner itself, so along the surface uv == (clip + 1) / 2 and uv.y
        // grows towards the window top
        for index in 0u32..3 {
            let corner = (((index << 1) & 2) as f32, (index & 2) as f32);
            let clip = (corner.0 * 2.0 - 1.0, corner.1 * 2.0 - 1.0);
            assert!((corner.0 - (clip.0 + 1.0) / 2.0).abs() < 1e-6);
            assert!((corner.1 - (clip.1 + 1.0) / 2.0).abs() < 1e-6);
        }

        // The flip in the sampling step then sends the window top to
        // texel v = 0, the first row of the top-down camera frame
        let transforms = EyeTransforms::default();
        let (_, v_top) = sample_coord(Eye::Left, (0.5, 1.0), &transforms);
        let (_, v_bottom) = sample_coord(Eye::Right, (0.5, 0.0), &transforms);
        assert!(v_top.abs() < 1e-6, "window top must show the frame's first row");
        assert!(
            (v_bottom - 1.0).abs() < 1e-6,
            "window bottom must show the frame's last row"
        );
    }

    #[test]
    fn test_params_follow_transforms() {
        let mut transforms = EyeTransforms::default();
        transforms.left_rotation = Rotation::Rotate180;
        transforms.set_parallax(50.0);

        let params = ComposeParams::from_transforms(&transforms);
        assert_eq!(params.left_rotation, 2);
        assert_eq!(params.right_rotation, 0);
        assert!((params.parallax - parallax_uv(50.0)).abs() < 1e-6);
    }

    #[test]
    fn test_params_size_matches_uniform_block() {
        assert_eq!(std::mem::size_of::<ComposeParams>(), 16);
    }
}
