//! Backend-independent resource states and their per-backend translations.
//!
//! The frame graph tracks a single [`ResourceState`] per resource and emits
//! [`ResourceTransition`]s. Each backend owns one translation table,
//! implemented as a [`ResourceStateTable`]:
//!
//! | Backend | Table | Native state |
//! |---------|-------|--------------|
//! | D3D12 | [`D3d12StateTable`] | `D3D12_RESOURCE_STATES` bits |
//! | Vulkan | `VulkanStateTable` (feature `vulkan`) | layout + access + stage |
//! | D3D11 | [`D3d11StateTable`] | none, hazards are tracked by the driver |

use bitflags::bitflags;

use crate::backend::types::QueueType;

/// Kind of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Buffer,
}

/// How a resource is used at a point in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents undefined; the next user overwrites them.
    #[default]
    Undefined,
    Common,
    RenderTarget,
    DepthWrite,
    DepthRead,
    /// Sampled or loaded read-only in a shader.
    ShaderResource,
    UnorderedAccess,
    CopySource,
    CopyDest,
    IndirectArgument,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    Present,
}

impl ResourceState {
    /// Check if this state allows writes.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess | Self::CopyDest
        )
    }

    /// Check if this state is a read-only state that several queues may share.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::DepthRead
                | Self::ShaderResource
                | Self::CopySource
                | Self::IndirectArgument
                | Self::VertexBuffer
                | Self::IndexBuffer
                | Self::ConstantBuffer
        )
    }

    /// Whether a pass on `queue` may use a resource in this state.
    ///
    /// Compute queues cannot touch attachment or presentation states.
    pub fn is_supported_on(self, queue: QueueType) -> bool {
        match queue {
            QueueType::Graphics => true,
            QueueType::AsyncCompute => !matches!(
                self,
                Self::RenderTarget
                    | Self::DepthWrite
                    | Self::DepthRead
                    | Self::VertexBuffer
                    | Self::IndexBuffer
                    | Self::Present
            ),
        }
    }
}

/// A state change of one resource, optionally moving it between queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTransition {
    pub before: ResourceState,
    pub after: ResourceState,
    /// Queue that last accessed the resource.
    pub source_queue: QueueType,
    /// Queue that accesses the resource next.
    pub destination_queue: QueueType,
}

impl ResourceTransition {
    pub fn new(before: ResourceState, after: ResourceState, queue: QueueType) -> Self {
        Self {
            before,
            after,
            source_queue: queue,
            destination_queue: queue,
        }
    }

    pub fn cross_queue(
        before: ResourceState,
        after: ResourceState,
        source_queue: QueueType,
        destination_queue: QueueType,
    ) -> Self {
        Self {
            before,
            after,
            source_queue,
            destination_queue,
        }
    }

    pub fn is_cross_queue(&self) -> bool {
        self.source_queue != self.destination_queue
    }

    /// Previous contents may be discarded (first use of a new tenant).
    pub fn discards_contents(&self) -> bool {
        self.before == ResourceState::Undefined
    }
}

/// Translation of [`ResourceState`] into one backend's native state.
pub trait ResourceStateTable {
    type Native: Copy + std::fmt::Debug + PartialEq;

    /// Whether the API needs explicit transitions at all.
    const EXPLICIT_BARRIERS: bool;

    fn translate(state: ResourceState, kind: ResourceKind, queue: QueueType) -> Self::Native;

    /// Whether `transition` must be issued to the API.
    fn needs_barrier(transition: &ResourceTransition, kind: ResourceKind) -> bool {
        if !Self::EXPLICIT_BARRIERS {
            return false;
        }
        if transition.is_cross_queue() {
            return true;
        }
        // UAV -> UAV still needs an execution/memory dependency
        if transition.before == ResourceState::UnorderedAccess
            && transition.after == ResourceState::UnorderedAccess
        {
            return true;
        }
        Self::translate(transition.before, kind, transition.source_queue)
            != Self::translate(transition.after, kind, transition.destination_queue)
    }
}

bitflags! {
    /// `D3D12_RESOURCE_STATES` bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct D3d12ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
    }
}

impl D3d12ResourceStates {
    pub const PRESENT: Self = Self::COMMON;
}

/// D3D12 resource-state table
#[derive(Debug, Clone, Copy, Default)]
pub struct D3d12StateTable;

impl ResourceStateTable for D3d12StateTable {
    type Native = D3d12ResourceStates;
    const EXPLICIT_BARRIERS: bool = true;

    fn translate(state: ResourceState, _kind: ResourceKind, queue: QueueType) -> Self::Native {
        use D3d12ResourceStates as S;
        match state {
            ResourceState::Undefined | ResourceState::Common => S::COMMON,
            ResourceState::RenderTarget => S::RENDER_TARGET,
            ResourceState::DepthWrite => S::DEPTH_WRITE,
            ResourceState::DepthRead => S::DEPTH_READ,
            // Pixel shader visibility is illegal on compute command lists
            ResourceState::ShaderResource => match queue {
                QueueType::Graphics => S::NON_PIXEL_SHADER_RESOURCE | S::PIXEL_SHADER_RESOURCE,
                QueueType::AsyncCompute => S::NON_PIXEL_SHADER_RESOURCE,
            },
            ResourceState::UnorderedAccess => S::UNORDERED_ACCESS,
            ResourceState::CopySource => S::COPY_SOURCE,
            ResourceState::CopyDest => S::COPY_DEST,
            ResourceState::IndirectArgument => S::INDIRECT_ARGUMENT,
            ResourceState::VertexBuffer | ResourceState::ConstantBuffer => {
                S::VERTEX_AND_CONSTANT_BUFFER
            }
            ResourceState::IndexBuffer => S::INDEX_BUFFER,
            ResourceState::Present => S::PRESENT,
        }
    }
}

/// D3D11 table: the driver tracks hazards, nothing is ever issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct D3d11StateTable;

impl ResourceStateTable for D3d11StateTable {
    type Native = ();
    const EXPLICIT_BARRIERS: bool = false;

    fn translate(_state: ResourceState, _kind: ResourceKind, _queue: QueueType) -> Self::Native {}
}

#[cfg(feature = "vulkan")]
pub use vulkan::{VulkanState, VulkanStateTable};

#[cfg(feature = "vulkan")]
mod vulkan {
    use ash::vk;

    use super::{ResourceKind, ResourceState, ResourceStateTable};
    use crate::backend::types::QueueType;

    /// Layout, access mask and pipeline stage of a Vulkan resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VulkanState {
        /// Always `UNDEFINED` for buffers.
        pub layout: vk::ImageLayout,
        pub access: vk::AccessFlags2,
        pub stage: vk::PipelineStageFlags2,
    }

    /// Vulkan synchronization2 table
    #[derive(Debug, Clone, Copy, Default)]
    pub struct VulkanStateTable;

    impl VulkanStateTable {
        fn shader_stage(queue: QueueType) -> vk::PipelineStageFlags2 {
            match queue {
                QueueType::Graphics => {
                    vk::PipelineStageFlags2::VERTEX_SHADER
                        | vk::PipelineStageFlags2::FRAGMENT_SHADER
                        | vk::PipelineStageFlags2::COMPUTE_SHADER
                }
                QueueType::AsyncCompute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            }
        }
    }

    impl ResourceStateTable for VulkanStateTable {
        type Native = VulkanState;
        const EXPLICIT_BARRIERS: bool = true;

        fn translate(state: ResourceState, kind: ResourceKind, queue: QueueType) -> VulkanState {
            let (layout, access, stage) = match state {
                ResourceState::Undefined => (
                    vk::ImageLayout::UNDEFINED,
                    vk::AccessFlags2::NONE,
                    vk::PipelineStageFlags2::TOP_OF_PIPE,
                ),
                ResourceState::Common => (
                    vk::ImageLayout::GENERAL,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                ),
                ResourceState::RenderTarget => (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags2::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                ),
                ResourceState::DepthWrite => (
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                ),
                ResourceState::DepthRead => (
                    vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags2::SHADER_SAMPLED_READ,
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags2::FRAGMENT_SHADER,
                ),
                ResourceState::ShaderResource => (
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags2::SHADER_SAMPLED_READ | vk::AccessFlags2::SHADER_STORAGE_READ,
                    Self::shader_stage(queue),
                ),
                ResourceState::UnorderedAccess => (
                    vk::ImageLayout::GENERAL,
                    vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
                    Self::shader_stage(queue),
                ),
                ResourceState::CopySource => (
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags2::TRANSFER_READ,
                    vk::PipelineStageFlags2::TRANSFER,
                ),
                ResourceState::CopyDest => (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags2::TRANSFER_WRITE,
                    vk::PipelineStageFlags2::TRANSFER,
                ),
                ResourceState::IndirectArgument => (
                    vk::ImageLayout::UNDEFINED,
                    vk::AccessFlags2::INDIRECT_COMMAND_READ,
                    vk::PipelineStageFlags2::DRAW_INDIRECT,
                ),
                ResourceState::VertexBuffer => (
                    vk::ImageLayout::UNDEFINED,
                    vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
                    vk::PipelineStageFlags2::VERTEX_INPUT,
                ),
                ResourceState::IndexBuffer => (
                    vk::ImageLayout::UNDEFINED,
                    vk::AccessFlags2::INDEX_READ,
                    vk::PipelineStageFlags2::INDEX_INPUT,
                ),
                ResourceState::ConstantBuffer => (
                    vk::ImageLayout::UNDEFINED,
                    vk::AccessFlags2::UNIFORM_READ,
                    Self::shader_stage(queue),
                ),
                ResourceState::Present => (
                    vk::ImageLayout::PRESENT_SRC_KHR,
                    vk::AccessFlags2::NONE,
                    vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                ),
            };

            let layout = match kind {
                ResourceKind::Image => layout,
                ResourceKind::Buffer => vk::ImageLayout::UNDEFINED,
            };

            VulkanState {
                layout,
                access,
                stage,
            }
        }
    }
}
