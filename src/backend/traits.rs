//! Core backend abstraction traits
//!
//! The frame graph never talks to a graphics API directly. Concrete backends
//! (D3D12, Vulkan, D3D11, ...) implement [`RenderDevice`] and [`CommandList`];
//! the graph consumes them through these traits only.

use crate::backend::state::ResourceTransition;
use crate::backend::sync::Fence;
use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create resource: {0}")]
    ResourceCreationFailed(String),
    #[error("Failed to create pipeline state: {0}")]
    PipelineCreationFailed(String),
    #[error("Descriptor not supported by this backend: {0}")]
    UnsupportedDescriptor(String),
    #[error("Failed to map buffer: {0}")]
    MapFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
    #[error("Fence wait failed: {0}")]
    FenceWaitFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a physical GPU image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(u64);

impl ImageHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a physical GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a compiled pipeline state object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineStateHandle(u64);

impl PipelineStateHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Stable 64-bit hash of a string name.
///
/// Used for shader binding names (resolved from reflection) and persistent
/// resource names. FNV-1a, computable in `const` context so call sites can
/// hash their names once:
///
/// ```
/// use frame_graph::backend::NameHash;
///
/// const READ: NameHash = NameHash::new("AutoExposure/ReadBuffer");
/// assert_eq!(READ, NameHash::new("AutoExposure/ReadBuffer"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameHash(u64);

impl NameHash {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::PRIME);
            i += 1;
        }
        Self(hash)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for NameHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}

impl From<&str> for NameHash {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Features and restrictions reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// A secondary compute queue able to run concurrently with graphics.
    pub async_compute: bool,
    /// Whether DEPTH_STENCIL and UNORDERED_ACCESS may be combined on an image.
    pub depth_stencil_uav: bool,
    /// Images with RENDER_TARGET | UNORDERED_ACCESS must live in their own pool.
    pub dedicated_uav_render_target_pool: bool,
    /// Largest width/height accepted for an image.
    pub max_image_dimension: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            async_compute: true,
            depth_stencil_uav: false,
            dedicated_uav_render_target_pool: false,
            max_image_dimension: 16384,
        }
    }
}

/// Command recording interface for one hardware queue
pub trait CommandList {
    /// Queue this list submits to
    fn queue(&self) -> QueueType;

    // Debugging

    fn push_event_marker(&mut self, name: &str);
    fn pop_event_marker(&mut self);

    // State and bindings

    fn bind_pipeline_state(&mut self, pipeline: PipelineStateHandle);
    fn bind_image(&mut self, binding: NameHash, image: ImageHandle);
    fn bind_buffer(&mut self, binding: NameHash, buffer: BufferHandle);
    fn bind_constant_buffer(&mut self, binding: NameHash, buffer: BufferHandle);
    fn setup_framebuffer(&mut self, color: &[ImageHandle], depth_stencil: Option<ImageHandle>);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, scissor: &ScissorRegion);

    // Work

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
    );
    fn multi_draw_indexed_instanced_indirect(
        &mut self,
        arguments: BufferHandle,
        arguments_offset: u64,
        max_draw_count: u32,
        draw_count: Option<BufferHandle>,
    );

    // Resource state

    /// Resource-state and cross-queue transition of an image.
    fn transition_image(&mut self, image: ImageHandle, transition: &ResourceTransition);
    /// Resource-state and cross-queue transition of a buffer.
    fn transition_buffer(&mut self, buffer: BufferHandle, transition: &ResourceTransition);

    // Data movement

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);
    fn map_buffer(&mut self, buffer: BufferHandle) -> BackendResult<&mut [u8]>;
    fn unmap_buffer(&mut self, buffer: BufferHandle);
    fn copy_image(&mut self, source: ImageHandle, destination: ImageHandle);
    fn copy_buffer(&mut self, source: BufferHandle, destination: BufferHandle);
}

/// Resource creation and submission interface
pub trait RenderDevice {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    fn capabilities(&self) -> DeviceCapabilities;

    // Resource creation

    fn create_image(&mut self, desc: &ImageDesc) -> BackendResult<ImageHandle>;
    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle>;
    fn create_pipeline_state(
        &mut self,
        desc: &PipelineStateDesc,
    ) -> BackendResult<PipelineStateHandle>;

    // Resource cleanup

    fn destroy_image(&mut self, image: ImageHandle);
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Recording and submission

    /// Command list currently recording for `queue`
    fn command_list(&mut self, queue: QueueType) -> &mut dyn CommandList;

    /// Submit everything recorded since the last submit, on every queue.
    /// `fence` is signaled once all of it has finished on the GPU.
    fn submit(&mut self, fence: &Fence) -> BackendResult<()>;

    /// Returns `Err(BackendError::DeviceLost)` once the device is removed.
    fn check_device_status(&self) -> BackendResult<()>;
}
