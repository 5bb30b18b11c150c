//! Per-frame globals handed to the frame graph

mod camera;
mod draw_commands;

pub use camera::*;
pub use draw_commands::*;

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};

use crate::backend::{ImageDesc, ImageHandle, ScissorRegion, Viewport};

/// Vertex of the immediate-mode vector (line/debug) geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VectorVertex {
    pub position: [f32; 3],
    /// Packed RGBA8
    pub color: u32,
}

/// Swapchain back buffer of the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainImage {
    pub image: ImageHandle,
    pub desc: ImageDesc,
}

/// Everything the caller provides for one frame.
///
/// Draw buckets and vector data are borrowed; the graph never owns them.
#[derive(Debug, Clone)]
pub struct FrameView<'a> {
    pub camera: Camera,
    pub viewport: Viewport,
    pub scissor: ScissorRegion,
    pub delta_time: f32,
    pub screen_size: UVec2,
    /// MSAA sample count of the main render targets.
    pub sample_count: u32,
    pub draw_commands: &'a DrawCommandBuckets,
    pub vector_buffer_data: &'a [VectorVertex],
    pub swapchain: Option<SwapchainImage>,
}

impl<'a> FrameView<'a> {
    /// A full-screen view with no vector data and no swapchain.
    pub fn new(
        camera: Camera,
        width: u32,
        height: u32,
        draw_commands: &'a DrawCommandBuckets,
    ) -> Self {
        Self {
            camera,
            viewport: Viewport::new(width as f32, height as f32),
            scissor: ScissorRegion::from_size(width, height),
            delta_time: 0.0,
            screen_size: UVec2::new(width, height),
            sample_count: 1,
            draw_commands,
            vector_buffer_data: &[],
            swapchain: None,
        }
    }

    pub fn with_delta_time(mut self, delta_time: f32) -> Self {
        self.delta_time = delta_time;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_swapchain(mut self, image: ImageHandle, desc: ImageDesc) -> Self {
        self.swapchain = Some(SwapchainImage { image, desc });
        self
    }

    pub fn with_vector_buffer_data(mut self, data: &'a [VectorVertex]) -> Self {
        self.vector_buffer_data = data;
        self
    }

    /// Width and height of the active viewport, in whole pixels.
    pub fn pipeline_dimensions(&self) -> UVec2 {
        UVec2::new(
            self.viewport.width.max(1.0) as u32,
            self.viewport.height.max(1.0) as u32,
        )
    }

    pub(crate) fn screen_size_f32(&self) -> Vec2 {
        self.screen_size.as_vec2()
    }
}
