//! Setup-time declaration API

use std::collections::HashMap;

use crate::backend::{
    BindFlags, BufferDesc, ImageDesc, NameHash, QueueType, ResourceKind, ResourceState,
};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frame_graph::handle::ResourceHandle;
use crate::frame_graph::pass::{PassNode, ResourceAccess};
use crate::frame_graph::persistent::{PersistentResourceTable, SlotRole};
use crate::frame_graph::resource::{
    AllocationFlags, CopyOrigin, ExternalBinding, ResourceOrigin, VirtualDesc, VirtualResource,
};
use crate::frame_graph::{
    LAST_FRAME_IMAGE, MATERIAL_EDITOR_BUFFER, PER_VIEW_BUFFER, SWAPCHAIN_IMAGE,
};

/// Virtual resources declared so far this frame.
#[derive(Debug, Default)]
pub(crate) struct CaptureState {
    pub epoch: u32,
    pub resources: Vec<VirtualResource>,
    /// Persistent and imported names already bound to a handle this frame.
    pub imports: HashMap<NameHash, ResourceHandle>,
}

impl CaptureState {
    pub fn new(epoch: u32) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }

    fn push(&mut self, resource: VirtualResource) -> ResourceHandle {
        let kind = resource.desc.kind();
        self.resources.push(resource);
        ResourceHandle::new(self.resources.len() - 1, self.epoch, kind)
    }

    /// Resource behind a handle of this frame.
    fn get(&self, handle: ResourceHandle) -> Option<&VirtualResource> {
        debug_assert!(
            handle.is_valid() && handle.epoch() == self.epoch,
            "{:?} does not belong to this frame",
            handle
        );
        if handle.epoch() != self.epoch {
            return None;
        }
        let resource = self.resources.get(handle.index())?;
        debug_assert_eq!(resource.desc.kind(), handle.kind(), "{:?} has the wrong kind", handle);
        Some(resource)
    }
}

/// Handed to a pass's setup callback. Every resource the pass touches must
/// be declared through it.
pub struct FrameGraphBuilder<'a> {
    pass: &'a mut PassNode,
    pass_index: usize,
    capture: &'a mut CaptureState,
    persistent: &'a mut PersistentResourceTable,
}

impl<'a> FrameGraphBuilder<'a> {
    pub(crate) fn new(
        pass: &'a mut PassNode,
        pass_index: usize,
        capture: &'a mut CaptureState,
        persistent: &'a mut PersistentResourceTable,
    ) -> Self {
        Self {
            pass,
            pass_index,
            capture,
            persistent,
        }
    }

    fn read_with(&mut self, handle: ResourceHandle, read_only: bool) -> ResourceHandle {
        let Some(resource) = self.capture.get(handle) else {
            return handle;
        };
        let state = if read_only {
            resource.desc.read_only_state()
        } else {
            resource.desc.read_state()
        };
        let mut access = ResourceAccess::read(handle, state);
        access.read_only = read_only;
        self.pass.declare(access);
        handle
    }

    /// Declare a shader read. A UAV-capable image is bound as a UAV.
    pub fn read_image(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_image(), "{:?} is not an image", handle);
        self.read_with(handle, false)
    }

    /// Declare a read and promise the pass never writes the image.
    pub fn read_read_only_image(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_image(), "{:?} is not an image", handle);
        self.read_with(handle, true)
    }

    pub fn read_buffer(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        self.read_with(handle, false)
    }

    pub fn read_read_only_buffer(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        self.read_with(handle, true)
    }

    /// Declare a buffer consumed as indirect draw/dispatch arguments.
    pub fn read_indirect_arguments(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        if self.capture.get(handle).is_some() {
            let mut access = ResourceAccess::read(handle, ResourceState::IndirectArgument);
            access.read_only = true;
            self.pass.declare(access);
        }
        handle
    }

    fn allocate(&mut self, name: String, desc: VirtualDesc, flags: AllocationFlags) -> ResourceHandle {
        let state = desc.allocation_state();
        let handle = self
            .capture
            .push(VirtualResource::transient(name, desc, flags, self.pass_index));

        let mut access = ResourceAccess::write(handle, state);
        access.allocate = true;
        self.pass.declare(access);
        handle
    }

    fn default_name(&self, label: Option<&str>, kind: &str) -> String {
        match label {
            Some(label) => label.to_string(),
            None => format!("{}/{}{}", self.pass.name, kind, self.capture.resources.len()),
        }
    }

    /// Declare a transient image written first by this pass.
    pub fn allocate_image(&mut self, desc: ImageDesc, flags: AllocationFlags) -> ResourceHandle {
        let name = self.default_name(desc.label.as_deref(), "Image");
        self.allocate(name, VirtualDesc::Image(desc), flags)
    }

    /// Declare a transient buffer written first by this pass.
    pub fn allocate_buffer(&mut self, desc: BufferDesc, flags: AllocationFlags) -> ResourceHandle {
        let name = self.default_name(desc.label.as_deref(), "Buffer");
        self.allocate(name, VirtualDesc::Buffer(desc), flags)
    }

    /// Declare a new image that starts as a copy of `source`.
    ///
    /// The returned descriptor may be edited before setup returns; extents
    /// always follow the source. Format, sample and mip count follow the
    /// source unless changed here. When the copy cannot preserve contents
    /// (or `NO_CONTENT_COPY` is set) only the descriptor is copied.
    pub fn copy_image(
        &mut self,
        source: ResourceHandle,
        flags: AllocationFlags,
    ) -> (ResourceHandle, &mut ImageDesc) {
        debug_assert!(source.is_image(), "{:?} is not an image", source);
        let (template, name) = match self.capture.get(source) {
            Some(resource) => (
                resource.desc.as_image().cloned().unwrap_or_default(),
                format!("{}/Copy", resource.name),
            ),
            None => (ImageDesc::default(), format!("{}/Copy", self.pass.name)),
        };

        let mut desc = template.clone();
        desc.label = Some(name.clone());
        let handle = self.allocate(name, VirtualDesc::Image(desc), flags);
        self.pass.copies.push((source, handle));

        let resource = &mut self.capture.resources[handle.index()];
        resource.copy_of = Some(CopyOrigin { source, template });
        match &mut resource.desc {
            VirtualDesc::Image(desc) => (handle, desc),
            VirtualDesc::Buffer(_) => unreachable!("copy_image always creates an image"),
        }
    }

    fn write_in_place(&mut self, handle: ResourceHandle) -> ResourceHandle {
        let Some(resource) = self.capture.get(handle) else {
            return handle;
        };
        let mut access = ResourceAccess::write(handle, resource.desc.allocation_state());
        access.read = true;
        self.pass.declare(access);
        handle
    }

    /// Declare a read-modify-write of an image produced earlier, such as a
    /// persistent UAV updated in place.
    pub fn write_image(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_image(), "{:?} is not an image", handle);
        self.write_in_place(handle)
    }

    pub fn write_buffer(&mut self, handle: ResourceHandle) -> ResourceHandle {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        self.write_in_place(handle)
    }

    /// Bind a persistent name to a handle of this frame, declaring the
    /// access its role implies.
    fn retrieve(&mut self, name: NameHash, kind: ResourceKind) -> FrameGraphResult<ResourceHandle> {
        let Some(lookup) = self.persistent.lookup(name) else {
            log::error!("Persistent resource {:?} was never imported or exported", name);
            return Err(FrameGraphError::ResourceNotFound(format!("{:?}", name)));
        };
        if lookup.resource.desc.kind() != kind {
            return Err(FrameGraphError::configuration(
                format!("{:?}", name),
                format!("retrieved as {:?} but holds {:?}", kind, lookup.resource.desc.kind()),
            ));
        }

        let role = lookup.role;
        let desc = lookup.resource.desc.clone();
        // A single UAV resource may be read or updated; the pass says which
        let access = match role {
            SlotRole::Write => Some((desc.allocation_state(), true)),
            SlotRole::Single if desc.bind_flags().contains(BindFlags::UNORDERED_ACCESS) => None,
            SlotRole::Read | SlotRole::Single => Some((desc.read_only_state(), false)),
        };

        let handle = match self.capture.imports.get(&name) {
            Some(&handle) => handle,
            None => {
                let resource = lookup.resource;
                let binding = ExternalBinding {
                    physical: Some(resource.physical),
                    state: resource.state,
                    queue: resource.queue,
                };
                let label = desc
                    .label()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:?}", name));
                let handle = self.capture.push(VirtualResource::external(
                    label,
                    desc,
                    ResourceOrigin::Persistent(name),
                    binding,
                ));
                self.capture.imports.insert(name, handle);
                handle
            }
        };

        if role == SlotRole::Write {
            self.persistent.mark_write_retrieved(name);
        }

        if let Some((state, write)) = access {
            self.pass.declare(ResourceAccess {
                handle,
                state,
                read: !write,
                write,
                read_only: !write,
                allocate: false,
            });
        }
        Ok(handle)
    }

    /// Import a cross-frame buffer by name.
    ///
    /// The read side of a ping-pong pair is read-only; the write side is
    /// written and makes the pair swap at the end of the frame. A single
    /// buffer without UNORDERED_ACCESS is read-only. A single UAV buffer
    /// declares nothing here: follow up with one of the `read_*` calls or
    /// [`write_buffer`](Self::write_buffer).
    pub fn retrieve_persistent_buffer(&mut self, name: NameHash) -> FrameGraphResult<ResourceHandle> {
        self.retrieve(name, ResourceKind::Buffer)
    }

    /// Image counterpart of [`retrieve_persistent_buffer`](Self::retrieve_persistent_buffer).
    pub fn retrieve_persistent_image(&mut self, name: NameHash) -> FrameGraphResult<ResourceHandle> {
        self.retrieve(name, ResourceKind::Image)
    }

    /// Constant buffer holding this frame's [`PerViewData`](crate::scene::PerViewData).
    pub fn retrieve_per_view_buffer(&mut self) -> ResourceHandle {
        let handle = self.retrieve(PER_VIEW_BUFFER, ResourceKind::Buffer);
        debug_assert!(handle.is_ok(), "per-view buffer is missing");
        handle.unwrap_or(ResourceHandle::INVALID)
    }

    /// Scratch UAV buffer shared with the material editor. Declare the
    /// access with [`read_buffer`](Self::read_buffer) or
    /// [`write_buffer`](Self::write_buffer).
    pub fn retrieve_material_ed_buffer(&mut self) -> ResourceHandle {
        let handle = self.retrieve(MATERIAL_EDITOR_BUFFER, ResourceKind::Buffer);
        debug_assert!(handle.is_ok(), "material editor buffer is missing");
        handle.unwrap_or(ResourceHandle::INVALID)
    }

    /// Colour output of the previous frame, as exported by
    /// [`export_last_frame_image`](Self::export_last_frame_image).
    pub fn retrieve_last_frame_image(&mut self) -> FrameGraphResult<ResourceHandle> {
        self.retrieve(LAST_FRAME_IMAGE, ResourceKind::Image)
    }

    /// Back buffer of this frame, written as a render target.
    ///
    /// The image itself is supplied through the frame view at compile time.
    pub fn retrieve_swapchain_buffer(&mut self) -> ResourceHandle {
        let handle = match self.capture.imports.get(&SWAPCHAIN_IMAGE) {
            Some(&handle) => handle,
            None => {
                let handle = self.capture.push(VirtualResource::external(
                    "FrameGraph/Swapchain".to_string(),
                    VirtualDesc::Image(ImageDesc::default()),
                    ResourceOrigin::Imported,
                    ExternalBinding {
                        physical: None,
                        state: ResourceState::Present,
                        queue: QueueType::Graphics,
                    },
                ));
                self.capture.imports.insert(SWAPCHAIN_IMAGE, handle);
                handle
            }
        };

        self.pass
            .declare(ResourceAccess::write(handle, ResourceState::RenderTarget));
        handle
    }

    /// Make a transient resource produced this frame the persistent
    /// resource `name` from the next frame on.
    pub fn export_persistent_image(&mut self, name: NameHash, handle: ResourceHandle) {
        debug_assert!(handle.is_image(), "{:?} is not an image", handle);
        self.export(name, handle);
    }

    pub fn export_persistent_buffer(&mut self, name: NameHash, handle: ResourceHandle) {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        self.export(name, handle);
    }

    /// Export the frame's final colour for [`retrieve_last_frame_image`](Self::retrieve_last_frame_image).
    pub fn export_last_frame_image(&mut self, handle: ResourceHandle) {
        self.export_persistent_image(LAST_FRAME_IMAGE, handle);
    }

    fn export(&mut self, name: NameHash, handle: ResourceHandle) {
        if self.capture.get(handle).is_none() {
            return;
        }
        let resource = &mut self.capture.resources[handle.index()];
        debug_assert!(
            resource.is_transient(),
            "only transient resources can be exported, '{}' is not",
            resource.name
        );
        if resource.is_transient() {
            log::trace!("'{}' will be exported as {:?}", resource.name, name);
            resource.export = Some(name);
        }
    }

    /// Allow the pass to run on the async compute queue.
    pub fn use_async_compute(&mut self) {
        self.pass.async_compute = true;
    }

    /// Run the pass even when nothing reads its outputs.
    pub fn set_uncullable_pass(&mut self) {
        self.pass.uncullable = true;
    }

    /// Descriptor of a declared image, before view-derived sizes are applied.
    pub fn image_desc(&self, handle: ResourceHandle) -> Option<&ImageDesc> {
        self.capture.get(handle)?.desc.as_image()
    }

    pub fn buffer_desc(&self, handle: ResourceHandle) -> Option<&BufferDesc> {
        self.capture.get(handle)?.desc.as_buffer()
    }
}
