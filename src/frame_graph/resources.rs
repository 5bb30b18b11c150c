//! Execute-time view of a compiled frame

use glam::UVec2;

use crate::backend::{BufferDesc, BufferHandle, ImageDesc, ImageHandle, ScissorRegion, Viewport};
use crate::frame_graph::compiler::{CompiledFrame, ResourceBinding};
use crate::frame_graph::handle::ResourceHandle;
use crate::frame_graph::resource::ResourceOrigin;
use crate::scene::{Camera, DrawCmd, DrawCommandLayer, FrameView, PerViewData, VectorVertex};

/// Read-only resolution table handed to every execute callback.
///
/// Lookups are plain indexing into the compiled frame. A handle that was not
/// produced in this frame, or whose kind does not match, trips a debug
/// assertion and resolves to `None` in release builds.
pub struct FrameGraphResources<'a> {
    compiled: &'a CompiledFrame,
    view: &'a FrameView<'a>,
    per_view: &'a PerViewData,
    frame_index: u64,
}

impl<'a> FrameGraphResources<'a> {
    pub(crate) fn new(
        compiled: &'a CompiledFrame,
        view: &'a FrameView<'a>,
        per_view: &'a PerViewData,
        frame_index: u64,
    ) -> Self {
        Self {
            compiled,
            view,
            per_view,
            frame_index,
        }
    }

    fn binding(&self, handle: ResourceHandle) -> Option<&'a ResourceBinding> {
        let binding = self.compiled.resource(handle);
        debug_assert!(
            binding.is_some(),
            "{:?} was not declared in this frame",
            handle
        );
        binding
    }

    pub fn get_image(&self, handle: ResourceHandle) -> Option<ImageHandle> {
        debug_assert!(handle.is_image(), "{:?} is not an image", handle);
        self.binding(handle)?.physical?.as_image()
    }

    pub fn get_buffer(&self, handle: ResourceHandle) -> Option<BufferHandle> {
        debug_assert!(handle.is_buffer(), "{:?} is not a buffer", handle);
        self.binding(handle)?.physical?.as_buffer()
    }

    /// Like [`get_buffer`](Self::get_buffer), for handles obtained from a
    /// persistent retrieve.
    pub fn get_persistent_buffer(&self, handle: ResourceHandle) -> Option<BufferHandle> {
        debug_assert!(
            self.is_persistent(handle),
            "{:?} was not retrieved from the persistent table",
            handle
        );
        self.get_buffer(handle)
    }

    pub fn get_persistent_image(&self, handle: ResourceHandle) -> Option<ImageHandle> {
        debug_assert!(
            self.is_persistent(handle),
            "{:?} was not retrieved from the persistent table",
            handle
        );
        self.get_image(handle)
    }

    fn is_persistent(&self, handle: ResourceHandle) -> bool {
        self.compiled
            .resource(handle)
            .is_some_and(|b| matches!(b.origin, ResourceOrigin::Persistent(_)))
    }

    /// Final descriptor of an image, with view-derived sizes applied.
    pub fn get_image_desc(&self, handle: ResourceHandle) -> Option<&'a ImageDesc> {
        self.binding(handle)?.desc.as_image()
    }

    pub fn get_buffer_desc(&self, handle: ResourceHandle) -> Option<&'a BufferDesc> {
        self.binding(handle)?.desc.as_buffer()
    }

    pub fn get_main_camera(&self) -> &'a Camera {
        &self.view.camera
    }

    /// Constants uploaded to the per-view buffer this frame.
    pub fn get_per_view_data(&self) -> &'a PerViewData {
        self.per_view
    }

    pub fn get_main_viewport(&self) -> &'a Viewport {
        &self.view.viewport
    }

    pub fn get_main_scissor_region(&self) -> &'a ScissorRegion {
        &self.view.scissor
    }

    pub fn get_delta_time(&self) -> f32 {
        self.view.delta_time
    }

    pub fn get_screen_size(&self) -> UVec2 {
        self.view.screen_size
    }

    /// Number of the frame being executed, starting at 1.
    pub fn get_frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn get_draw_cmd_bucket(&self, layer: DrawCommandLayer, sub_layer: usize) -> &'a [DrawCmd] {
        self.view.draw_commands.bucket(layer, sub_layer)
    }

    pub fn get_vector_buffer_data(&self) -> &'a [VectorVertex] {
        self.view.vector_buffer_data
    }
}
