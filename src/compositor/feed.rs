// SPDX-License-Identifier: GPL-3.0-only

//! Texture feed bridging capture frames onto the GPU
//!
//! Frames land in a [`FrameTap`] on the capture thread; the render thread
//! polls `refresh_if_ready` once per drawn frame and uploads only when the
//! tap sequence has advanced past the last uploaded one.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::capture::types::{Eye, FrameTap, VideoFrame};

/// Latest-frame GPU texture for one eye
pub struct TextureFeed {
    eye: Eye,
    tap: FrameTap,
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    width: u32,
    height: u32,
    last_sequence: u64,
    /// Bumped whenever the underlying texture is allocated or destroyed,
    /// so bind groups built on the old view can be rebuilt
    epoch: u64,
}

impl TextureFeed {
    pub fn new(eye: Eye, tap: FrameTap) -> Self {
        Self {
            eye,
            tap,
            texture: None,
            view: None,
            width: 0,
            height: 0,
            last_sequence: 0,
            epoch: 0,
        }
    }

    /// Attach the feed to a new session's tap
    ///
    /// The feed reads as not ready until the new session publishes a frame;
    /// anything still in the texture from the old session is never drawn.
    pub fn rebind(&mut self, tap: FrameTap) {
        self.tap = tap;
        self.last_sequence = 0;
    }

    /// Frame waiting in the tap that has not been uploaded yet
    fn pending_frame(&self) -> Option<(Arc<VideoFrame>, u64)> {
        self.tap
            .latest()
            .filter(|(_, sequence)| *sequence > self.last_sequence)
    }

    /// Upload the newest frame if the tap advanced; returns whether it did
    pub fn refresh_if_ready(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let Some((frame, sequence)) = self.pending_frame() else {
            return false;
        };

        self.ensure_texture(device, frame.width, frame.height);
        let texture = self.texture.as_ref().unwrap();

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );

        trace!(eye = %self.eye, sequence, "Uploaded frame");
        self.last_sequence = sequence;
        true
    }

    /// True once a frame from the current session has been uploaded
    pub fn is_ready(&self) -> bool {
        self.last_sequence > 0 && self.view.is_some()
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.view.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Release the GPU texture
    ///
    /// The feed stays usable; the next refresh allocates again.
    pub fn dispose(&mut self) {
        if let Some(texture) = self.texture.take() {
            debug!(eye = %self.eye, "Disposing feed texture");
            texture.destroy();
            self.epoch += 1;
        }
        self.view = None;
        self.width = 0;
        self.height = 0;
        self.last_sequence = 0;
    }

    /// Allocate the texture lazily, replacing it when frame dimensions change
    fn ensure_texture(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.texture.is_some() && self.width == width && self.height == height {
            return;
        }

        debug!(eye = %self.eye, width, height, "Allocating feed texture");
        let label = match self.eye {
            Eye::Left => "Left Feed Texture",
            Eye::Right => "Right Feed Texture",
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        self.texture = Some(texture);
        self.width = width;
        self.height = height;
        self.epoch += 1;
    }
}

impl std::fmt::Debug for TextureFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureFeed")
            .field("eye", &self.eye)
            .field("size", &format_args!("{}x{}", self.width, self.height))
            .field("last_sequence", &self.last_sequence)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 2,
            height: 2,
            stride: 8,
            data: Arc::from(vec![0u8; 16]),
        }
    }

    #[test]
    fn test_nothing_pending_on_empty_tap() {
        let feed = TextureFeed::new(Eye::Left, FrameTap::new());
        assert!(feed.pending_frame().is_none());
        assert!(!feed.is_ready());
    }

    #[test]
    fn test_pending_until_marked_uploaded() {
        let tap = FrameTap::new();
        let mut feed = TextureFeed::new(Eye::Left, tap.clone());

        tap.publish(frame());
        let (_, sequence) = feed.pending_frame().expect("frame should be pending");

        feed.last_sequence = sequence;
        assert!(feed.pending_frame().is_none());

        tap.publish(frame());
        assert!(feed.pending_frame().is_some());
    }

    #[test]
    fn test_rebind_starts_from_scratch() {
        let old_tap = FrameTap::new();
        old_tap.publish(frame());
        let mut feed = TextureFeed::new(Eye::Right, old_tap);
        feed.last_sequence = 1;

        let new_tap = FrameTap::new();
        feed.rebind(new_tap.clone());
        assert!(!feed.is_ready());
        assert!(feed.pending_frame().is_none());

        new_tap.publish(frame());
        assert!(feed.pending_frame().is_some());
    }
}
