//! Transient resource pool and aliasing.
//!
//! Each in-flight frame slot owns one [`TransientPool`]. During COMPILE the
//! frame's transient resources are assigned to pool entries first-fit in
//! creation order. An entry serves several resources of one frame when
//! their lifetimes do not overlap: the previous tenant's last use must come
//! strictly before the next tenant's first write.
//!
//! Entries match on an [`AllocationKey`]. Images must match exactly; buffers
//! match on a power-of-two size class so near sizes share memory.

use crate::backend::{
    BindFlags, BufferDesc, DeviceCapabilities, ImageDesc, ImageDimension, ImageFormat,
    RenderDevice, UsageClass,
};
use crate::error::FrameGraphResult;
use crate::frame_graph::resource::{PhysicalResource, VirtualDesc};

/// Memory pool a resource must come from.
///
/// Some APIs keep render targets in separate heaps, and older ones need a
/// heap of their own for render targets that are also UAVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolClass {
    Buffers,
    Images,
    Attachments,
    UavAttachments,
}

impl PoolClass {
    pub fn of(desc: &VirtualDesc, capabilities: &DeviceCapabilities) -> Self {
        let flags = desc.bind_flags();
        match desc {
            VirtualDesc::Buffer(_) => PoolClass::Buffers,
            VirtualDesc::Image(_)
                if capabilities.dedicated_uav_render_target_pool
                    && flags.contains(BindFlags::RENDER_TARGET | BindFlags::UNORDERED_ACCESS) =>
            {
                PoolClass::UavAttachments
            }
            VirtualDesc::Image(_)
                if flags.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) =>
            {
                PoolClass::Attachments
            }
            VirtualDesc::Image(_) => PoolClass::Images,
        }
    }
}

/// Compatibility key of a pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AllocationKey {
    Image {
        dimension: ImageDimension,
        width: u32,
        height: u32,
        depth_or_array_size: u32,
        mip_count: u32,
        sample_count: u32,
        format: ImageFormat,
        bind_flags: BindFlags,
        usage: UsageClass,
        class: PoolClass,
    },
    Buffer {
        size_class: u64,
        bind_flags: BindFlags,
        usage: UsageClass,
        class: PoolClass,
    },
}

impl AllocationKey {
    pub fn new(desc: &VirtualDesc, capabilities: &DeviceCapabilities) -> Self {
        let class = PoolClass::of(desc, capabilities);
        match desc {
            VirtualDesc::Image(desc) => AllocationKey::Image {
                dimension: desc.dimension,
                width: desc.width,
                height: desc.height,
                depth_or_array_size: desc.depth_or_array_size,
                mip_count: desc.mip_count,
                sample_count: desc.sample_count,
                format: desc.format,
                bind_flags: desc.bind_flags,
                usage: desc.usage,
                class,
            },
            VirtualDesc::Buffer(desc) => AllocationKey::Buffer {
                size_class: desc.size.max(1).next_power_of_two(),
                bind_flags: desc.bind_flags,
                usage: desc.usage,
                class,
            },
        }
    }
}

/// A transient resource that needs memory this frame.
#[derive(Debug, Clone)]
pub(crate) struct AllocationRequest {
    /// Virtual resource index.
    pub resource: usize,
    pub desc: VirtualDesc,
    /// Execution step of the first and last access.
    pub first_use: usize,
    pub last_use: usize,
    /// May share its entry with other aliasable resources of this frame.
    pub aliasable: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct AllocationSummary {
    /// `(virtual resource index, physical resource)`.
    pub assignments: Vec<(usize, PhysicalResource)>,
    pub created: usize,
    /// Resources placed into an entry that already had a tenant this frame.
    pub aliased: usize,
}

#[derive(Debug)]
struct PoolEntry {
    key: AllocationKey,
    physical: PhysicalResource,
    tenants: u32,
    /// Last execution step of the current tenant.
    busy_until: usize,
    shareable: bool,
    idle_frames: u32,
}

impl PoolEntry {
    fn accepts(&self, request: &AllocationRequest, key: &AllocationKey) -> bool {
        if self.key != *key {
            return false;
        }
        if self.tenants == 0 {
            return true;
        }
        request.aliasable && self.shareable && self.busy_until < request.first_use
    }
}

/// Physical allocations of one frame slot.
#[derive(Debug, Default)]
pub struct TransientPool {
    entries: Vec<PoolEntry>,
}

impl TransientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical resources held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind every request to a pool entry, creating entries on a miss.
    pub(crate) fn allocate(
        &mut self,
        device: &mut dyn RenderDevice,
        requests: &mut [AllocationRequest],
        capabilities: &DeviceCapabilities,
    ) -> FrameGraphResult<AllocationSummary> {
        for entry in &mut self.entries {
            entry.tenants = 0;
            entry.shareable = true;
        }

        requests.sort_by_key(|request| (request.first_use, request.resource));

        let mut summary = AllocationSummary::default();
        for request in requests.iter() {
            let key = AllocationKey::new(&request.desc, capabilities);

            let index = match self.entries.iter().position(|e| e.accepts(request, &key)) {
                Some(index) => index,
                None => {
                    let physical = PhysicalResource::create(device, &creation_desc(&request.desc))?;
                    log::trace!(
                        "Transient pool: created {:?} for {:?}",
                        physical,
                        request.desc.label()
                    );
                    summary.created += 1;
                    self.entries.push(PoolEntry {
                        key,
                        physical,
                        tenants: 0,
                        busy_until: 0,
                        shareable: true,
                        idle_frames: 0,
                    });
                    self.entries.len() - 1
                }
            };

            let entry = &mut self.entries[index];
            if entry.tenants > 0 {
                summary.aliased += 1;
            }
            entry.tenants += 1;
            entry.busy_until = request.last_use;
            entry.shareable &= request.aliasable;
            entry.idle_frames = 0;
            summary.assignments.push((request.resource, entry.physical));
        }

        Ok(summary)
    }

    /// Age entries unused this frame and destroy those idle for too long.
    pub(crate) fn trim(&mut self, device: &mut dyn RenderDevice, max_idle_frames: u32) -> usize {
        for entry in &mut self.entries {
            if entry.tenants == 0 {
                entry.idle_frames += 1;
            }
        }

        let before = self.entries.len();
        self.entries.retain(|entry| {
            if entry.idle_frames > max_idle_frames {
                entry.physical.destroy(device);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// Destroy every physical resource. The slot's GPU work must be complete.
    pub(crate) fn release_all(&mut self, device: &mut dyn RenderDevice) {
        for entry in self.entries.drain(..) {
            entry.physical.destroy(device);
        }
    }
}

/// Descriptor an entry is created with; buffers take their whole size class.
fn creation_desc(desc: &VirtualDesc) -> VirtualDesc {
    match desc {
        VirtualDesc::Image(desc) => VirtualDesc::Image(ImageDesc {
            label: desc.label.as_ref().map(|label| format!("Transient/{label}")),
            ..desc.clone()
        }),
        VirtualDesc::Buffer(desc) => VirtualDesc::Buffer(BufferDesc {
            label: desc.label.as_ref().map(|label| format!("Transient/{label}")),
            size: desc.size.max(1).next_power_of_two(),
            ..desc.clone()
        }),
    }
}
