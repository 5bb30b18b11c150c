//! Common utilities for frame graph integration tests.
//!
//! Every test runs against the dummy backend, which records commands and
//! simulates buffer contents.

#![allow(dead_code)]

use frame_graph::backend::{
    BindFlags, BufferDesc, BufferHandle, DeviceCapabilities, DummyDevice, ImageDesc, ImageFormat,
    ImageHandle, QueueType, RecordedCommand, RenderDevice,
};
use frame_graph::frame_graph::PhysicalResource;
use frame_graph::{
    Camera, CompiledFrame, DrawCommandBuckets, FrameGraph, FrameGraphConfig, FrameGraphResult,
    FrameStats, FrameView,
};
use glam::Vec3;

pub const WIDTH: u32 = 1280;
pub const HEIGHT: u32 = 720;

/// Install a test logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Descriptors
// ============================================================================

pub fn render_target(width: u32, height: u32) -> ImageDesc {
    ImageDesc::new_2d(
        width,
        height,
        ImageFormat::Rgba16Float,
        BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
    )
}

pub fn uav_image(width: u32, height: u32) -> ImageDesc {
    ImageDesc::new_2d(
        width,
        height,
        ImageFormat::R32Float,
        BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE,
    )
}

pub fn uav_buffer(size: u64) -> BufferDesc {
    BufferDesc::new(size, BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE)
}

pub fn swapchain_desc() -> ImageDesc {
    ImageDesc::new_2d(WIDTH, HEIGHT, ImageFormat::Bgra8Unorm, BindFlags::RENDER_TARGET)
        .with_label("Swapchain")
}

// ============================================================================
// Test Context
// ============================================================================

/// A dummy device, a frame graph and the per-frame inputs the caller owns.
pub struct TestContext {
    pub device: DummyDevice,
    pub graph: FrameGraph,
    pub camera: Camera,
    pub buckets: DrawCommandBuckets,
    pub swapchain: Option<ImageHandle>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(FrameGraphConfig::default())
    }

    pub fn with_config(config: FrameGraphConfig) -> Self {
        Self::with_device(DummyDevice::new(), config)
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities, config: FrameGraphConfig) -> Self {
        Self::with_device(DummyDevice::with_capabilities(capabilities), config)
    }

    pub fn with_device(mut device: DummyDevice, config: FrameGraphConfig) -> Self {
        init_logging();
        let graph = FrameGraph::new(&mut device, config).unwrap();
        Self {
            device,
            graph,
            camera: Camera::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO),
            buckets: DrawCommandBuckets::new(),
            swapchain: None,
        }
    }

    /// Create a back buffer that every later frame presents to.
    pub fn with_swapchain(mut self) -> Self {
        self.swapchain = Some(self.device.create_image(&swapchain_desc()).unwrap());
        self
    }

    pub fn compile(&mut self) -> FrameGraphResult<&CompiledFrame> {
        let view = frame_view(&self.camera, &self.buckets, self.swapchain);
        self.graph.compile(&mut self.device, &view)
    }

    pub fn execute(&mut self) -> FrameGraphResult<FrameStats> {
        let view = frame_view(&self.camera, &self.buckets, self.swapchain);
        self.graph.execute(&mut self.device, &view)
    }

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle {
        self.device.create_buffer(desc).unwrap()
    }

    /// Names of the passes in the last submission, in recording order.
    pub fn executed_passes(&self) -> Vec<String> {
        self.device
            .last_submission()
            .iter()
            .filter_map(|(_, command)| match command {
                RecordedCommand::PushEventMarker(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Queue each pass of the last submission was recorded on.
    pub fn pass_queue(&self, pass: &str) -> Option<QueueType> {
        self.device
            .last_submission()
            .iter()
            .find(|(_, command)| {
                matches!(command, RecordedCommand::PushEventMarker(name) if name == pass)
            })
            .map(|(queue, _)| *queue)
    }
}

/// Full-screen view of the test camera, presenting to `swapchain` if given.
pub fn frame_view<'a>(
    camera: &Camera,
    buckets: &'a DrawCommandBuckets,
    swapchain: Option<ImageHandle>,
) -> FrameView<'a> {
    let view = FrameView::new(camera.clone(), WIDTH, HEIGHT, buckets).with_delta_time(1.0 / 60.0);
    match swapchain {
        Some(image) => view.with_swapchain(image, swapchain_desc()),
        None => view,
    }
}

/// Physical resources a compiled pass writes.
pub fn physical_writes(compiled: &CompiledFrame, pass: &str) -> Vec<PhysicalResource> {
    let Some(pass) = compiled.pass(pass) else {
        return Vec::new();
    };
    pass.writes
        .iter()
        .filter_map(|&handle| compiled.physical(handle))
        .collect()
}

/// `reachable[a][b]`: pass at position `b` transitively depends on the pass at position `a`.
pub fn reachability(compiled: &CompiledFrame) -> Vec<Vec<bool>> {
    let count = compiled.passes.len();
    let position = |pass_index: usize| {
        compiled
            .passes
            .iter()
            .position(|p| p.pass_index == pass_index)
    };

    let mut reachable = vec![vec![false; count]; count];
    for (b, pass) in compiled.passes.iter().enumerate() {
        for dependency in pass.dependencies.iter().filter_map(|&d| position(d)) {
            reachable[dependency][b] = true;
            for a in 0..count {
                if reachable[a][dependency] {
                    reachable[a][b] = true;
                }
            }
        }
    }
    reachable
}
