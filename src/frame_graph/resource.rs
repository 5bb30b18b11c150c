//! Virtual resources of one frame

use bitflags::bitflags;
use glam::UVec2;

use crate::backend::{
    BindFlags, BufferDesc, BufferHandle, DeviceCapabilities, ImageDesc, ImageHandle, NameHash,
    QueueType, RenderDevice, ResourceKind, ResourceState,
};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frame_graph::handle::ResourceHandle;

bitflags! {
    /// How an allocation derives its final descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocationFlags: u32 {
        /// Width and height come from the active viewport.
        const USE_PIPELINE_DIMENSIONS = 1 << 0;
        /// Sample count comes from the main render targets.
        const USE_PIPELINE_SAMPLE_COUNT = 1 << 1;
        /// Force a single sample, whatever the descriptor or pipeline says.
        const NO_MULTISAMPLE = 1 << 2;
        /// `copy_image` only: take the descriptor but not the contents.
        const NO_CONTENT_COPY = 1 << 3;
    }
}

/// Descriptor of a virtual resource
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
}

impl VirtualDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            VirtualDesc::Image(_) => ResourceKind::Image,
            VirtualDesc::Buffer(_) => ResourceKind::Buffer,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            VirtualDesc::Image(desc) => desc.label.as_deref(),
            VirtualDesc::Buffer(desc) => desc.label.as_deref(),
        }
    }

    pub fn bind_flags(&self) -> BindFlags {
        match self {
            VirtualDesc::Image(desc) => desc.bind_flags,
            VirtualDesc::Buffer(desc) => desc.bind_flags,
        }
    }

    pub fn as_image(&self) -> Option<&ImageDesc> {
        match self {
            VirtualDesc::Image(desc) => Some(desc),
            VirtualDesc::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferDesc> {
        match self {
            VirtualDesc::Buffer(desc) => Some(desc),
            VirtualDesc::Image(_) => None,
        }
    }

    fn is_depth_image(&self) -> bool {
        matches!(self, VirtualDesc::Image(desc) if desc.format.is_depth())
    }

    /// State a freshly allocated resource is first written in.
    pub fn allocation_state(&self) -> ResourceState {
        let flags = self.bind_flags();
        match self {
            VirtualDesc::Image(_) if flags.contains(BindFlags::RENDER_TARGET) => {
                ResourceState::RenderTarget
            }
            VirtualDesc::Image(_) if flags.contains(BindFlags::DEPTH_STENCIL) => {
                ResourceState::DepthWrite
            }
            _ if flags.contains(BindFlags::UNORDERED_ACCESS) => ResourceState::UnorderedAccess,
            _ => ResourceState::CopyDest,
        }
    }

    /// State of a shader read that may also write through a UAV.
    pub fn read_state(&self) -> ResourceState {
        if self.bind_flags().contains(BindFlags::UNORDERED_ACCESS) {
            ResourceState::UnorderedAccess
        } else {
            self.read_only_state()
        }
    }

    /// State of a strictly read-only access.
    pub fn read_only_state(&self) -> ResourceState {
        let flags = self.bind_flags();
        match self {
            VirtualDesc::Image(_) if self.is_depth_image() => ResourceState::DepthRead,
            VirtualDesc::Image(_) => ResourceState::ShaderResource,
            VirtualDesc::Buffer(_) => {
                if flags.contains(BindFlags::SHADER_RESOURCE) {
                    ResourceState::ShaderResource
                } else if flags.contains(BindFlags::CONSTANT_BUFFER) {
                    ResourceState::ConstantBuffer
                } else if flags.contains(BindFlags::INDIRECT_ARGUMENTS) {
                    ResourceState::IndirectArgument
                } else if flags.contains(BindFlags::VERTEX_BUFFER) {
                    ResourceState::VertexBuffer
                } else if flags.contains(BindFlags::INDEX_BUFFER) {
                    ResourceState::IndexBuffer
                } else {
                    ResourceState::ShaderResource
                }
            }
        }
    }

    /// Check the descriptor against what the device accepts.
    pub fn validate(&self, name: &str, capabilities: &DeviceCapabilities) -> FrameGraphResult<()> {
        match self {
            VirtualDesc::Image(desc) => {
                let flags = desc.bind_flags;
                if desc.width == 0 || desc.height == 0 || desc.depth_or_array_size == 0 {
                    return Err(FrameGraphError::configuration(name, "zero-sized image"));
                }
                if desc.width > capabilities.max_image_dimension
                    || desc.height > capabilities.max_image_dimension
                {
                    return Err(FrameGraphError::configuration(
                        name,
                        format!(
                            "{}x{} exceeds the device limit of {}",
                            desc.width, desc.height, capabilities.max_image_dimension
                        ),
                    ));
                }
                if desc.mip_count == 0 || desc.sample_count == 0 {
                    return Err(FrameGraphError::configuration(
                        name,
                        "mip and sample counts must be at least 1",
                    ));
                }
                if flags.contains(BindFlags::DEPTH_STENCIL | BindFlags::UNORDERED_ACCESS)
                    && !capabilities.depth_stencil_uav
                {
                    return Err(FrameGraphError::configuration(
                        name,
                        "DEPTH_STENCIL and UNORDERED_ACCESS cannot be combined on this device",
                    ));
                }
                if flags.contains(BindFlags::DEPTH_STENCIL) && !desc.format.is_depth() {
                    return Err(FrameGraphError::configuration(
                        name,
                        format!("DEPTH_STENCIL requires a depth format, got {:?}", desc.format),
                    ));
                }
                if flags.contains(BindFlags::RENDER_TARGET) && desc.format.is_depth() {
                    return Err(FrameGraphError::configuration(
                        name,
                        format!("RENDER_TARGET cannot use depth format {:?}", desc.format),
                    ));
                }
                if desc.sample_count > 1 && flags.contains(BindFlags::UNORDERED_ACCESS) {
                    return Err(FrameGraphError::configuration(
                        name,
                        "multisampled images cannot have UNORDERED_ACCESS",
                    ));
                }
                Ok(())
            }
            VirtualDesc::Buffer(desc) => {
                if desc.size == 0 {
                    return Err(FrameGraphError::configuration(name, "zero-sized buffer"));
                }
                if desc.stride != 0 && desc.size % desc.stride as u64 != 0 {
                    return Err(FrameGraphError::configuration(
                        name,
                        format!(
                            "size {} is not a multiple of stride {}",
                            desc.size, desc.stride
                        ),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// A bound GPU resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalResource {
    Image(ImageHandle),
    Buffer(BufferHandle),
}

impl PhysicalResource {
    pub fn as_image(self) -> Option<ImageHandle> {
        match self {
            PhysicalResource::Image(image) => Some(image),
            PhysicalResource::Buffer(_) => None,
        }
    }

    pub fn as_buffer(self) -> Option<BufferHandle> {
        match self {
            PhysicalResource::Buffer(buffer) => Some(buffer),
            PhysicalResource::Image(_) => None,
        }
    }

    pub(crate) fn create(
        device: &mut dyn RenderDevice,
        desc: &VirtualDesc,
    ) -> FrameGraphResult<Self> {
        let physical = match desc {
            VirtualDesc::Image(desc) => device.create_image(desc).map(PhysicalResource::Image),
            VirtualDesc::Buffer(desc) => device.create_buffer(desc).map(PhysicalResource::Buffer),
        }
        .map_err(FrameGraphError::from_backend)?;
        Ok(physical)
    }

    pub(crate) fn destroy(self, device: &mut dyn RenderDevice) {
        match self {
            PhysicalResource::Image(image) => device.destroy_image(image),
            PhysicalResource::Buffer(buffer) => device.destroy_buffer(buffer),
        }
    }
}

/// Where a virtual resource's memory comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// Allocated by a pass, lives for this frame only.
    Transient,
    /// Supplied by the caller for this frame (the swapchain image).
    Imported,
    /// Retrieved by name from the persistent table.
    Persistent(NameHash),
}

/// Physical binding and state of a resource that exists before the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExternalBinding {
    pub physical: Option<PhysicalResource>,
    pub state: ResourceState,
    pub queue: QueueType,
}

#[derive(Debug, Clone)]
pub(crate) struct CopyOrigin {
    pub source: ResourceHandle,
    /// Descriptor handed back by `copy_image`, before caller tweaks.
    pub template: ImageDesc,
}

#[derive(Debug, Clone)]
pub(crate) struct VirtualResource {
    pub name: String,
    pub desc: VirtualDesc,
    pub flags: AllocationFlags,
    pub origin: ResourceOrigin,
    /// Pass that allocated the resource.
    pub producer: Option<usize>,
    pub copy_of: Option<CopyOrigin>,
    /// Persistent name this resource becomes at RETIRE.
    pub export: Option<NameHash>,
    pub external: Option<ExternalBinding>,
}

impl VirtualResource {
    pub fn transient(name: String, desc: VirtualDesc, flags: AllocationFlags, producer: usize) -> Self {
        Self {
            name,
            desc,
            flags,
            origin: ResourceOrigin::Transient,
            producer: Some(producer),
            copy_of: None,
            export: None,
            external: None,
        }
    }

    pub fn external(
        name: String,
        desc: VirtualDesc,
        origin: ResourceOrigin,
        binding: ExternalBinding,
    ) -> Self {
        Self {
            name,
            desc,
            flags: AllocationFlags::empty(),
            origin,
            producer: None,
            copy_of: None,
            export: None,
            external: Some(binding),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.origin == ResourceOrigin::Transient
    }

    /// Apply viewport-derived dimensions and sample counts.
    pub fn resolve(&mut self, extent: &FrameExtent) {
        let flags = self.flags;
        if let VirtualDesc::Image(desc) = &mut self.desc {
            if flags.contains(AllocationFlags::USE_PIPELINE_DIMENSIONS) {
                desc.width = extent.dimensions.x;
                desc.height = extent.dimensions.y;
            }
            if flags.contains(AllocationFlags::USE_PIPELINE_SAMPLE_COUNT) {
                desc.sample_count = extent.sample_count;
            }
            if flags.contains(AllocationFlags::NO_MULTISAMPLE) {
                desc.sample_count = 1;
            }
        }
    }
}

/// View-derived values that allocation flags resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameExtent {
    pub dimensions: UVec2,
    pub sample_count: u32,
}
