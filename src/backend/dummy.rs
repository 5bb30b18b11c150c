//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, records every command in submission order and simulates buffer
//! contents written through `update_buffer`/`copy_buffer`, so graph behavior
//! can be verified without GPU hardware.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::state::ResourceTransition;
use crate::backend::sync::Fence;
use crate::backend::traits::*;
use crate::backend::types::*;

/// A command captured by [`DummyCommandList`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    PushEventMarker(String),
    PopEventMarker,
    BindPipelineState(PipelineStateHandle),
    BindImage(NameHash, ImageHandle),
    BindBuffer(NameHash, BufferHandle),
    BindConstantBuffer(NameHash, BufferHandle),
    SetupFramebuffer {
        color: Vec<ImageHandle>,
        depth_stencil: Option<ImageHandle>,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRegion),
    DispatchCompute(u32, u32, u32),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    MultiDrawIndexedInstancedIndirect {
        arguments: BufferHandle,
        max_draw_count: u32,
    },
    TransitionImage(ImageHandle, ResourceTransition),
    TransitionBuffer(BufferHandle, ResourceTransition),
    UpdateBuffer {
        buffer: BufferHandle,
        offset: u64,
        data: Vec<u8>,
    },
    CopyImage {
        source: ImageHandle,
        destination: ImageHandle,
    },
    CopyBuffer {
        source: BufferHandle,
        destination: BufferHandle,
    },
}

type CommandLog = Arc<Mutex<Vec<(QueueType, RecordedCommand)>>>;

/// Command list of the dummy backend.
///
/// Both queues append to one shared log, so the log reflects CPU recording
/// order across queues.
#[derive(Debug)]
pub struct DummyCommandList {
    queue: QueueType,
    log: CommandLog,
    buffer_sizes: Arc<Mutex<HashMap<BufferHandle, u64>>>,
    mapped: HashMap<BufferHandle, Vec<u8>>,
}

impl DummyCommandList {
    fn record(&mut self, command: RecordedCommand) {
        self.log.lock().push((self.queue, command));
    }
}

impl CommandList for DummyCommandList {
    fn queue(&self) -> QueueType {
        self.queue
    }

    fn push_event_marker(&mut self, name: &str) {
        self.record(RecordedCommand::PushEventMarker(name.to_string()));
    }

    fn pop_event_marker(&mut self) {
        self.record(RecordedCommand::PopEventMarker);
    }

    fn bind_pipeline_state(&mut self, pipeline: PipelineStateHandle) {
        self.record(RecordedCommand::BindPipelineState(pipeline));
    }

    fn bind_image(&mut self, binding: NameHash, image: ImageHandle) {
        self.record(RecordedCommand::BindImage(binding, image));
    }

    fn bind_buffer(&mut self, binding: NameHash, buffer: BufferHandle) {
        self.record(RecordedCommand::BindBuffer(binding, buffer));
    }

    fn bind_constant_buffer(&mut self, binding: NameHash, buffer: BufferHandle) {
        self.record(RecordedCommand::BindConstantBuffer(binding, buffer));
    }

    fn setup_framebuffer(&mut self, color: &[ImageHandle], depth_stencil: Option<ImageHandle>) {
        self.record(RecordedCommand::SetupFramebuffer {
            color: color.to_vec(),
            depth_stencil,
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(RecordedCommand::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, scissor: &ScissorRegion) {
        self.record(RecordedCommand::SetScissor(*scissor));
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record(RecordedCommand::DispatchCompute(x, y, z));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32) {
        self.record(RecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _base_vertex: i32,
    ) {
        self.record(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn multi_draw_indexed_instanced_indirect(
        &mut self,
        arguments: BufferHandle,
        _arguments_offset: u64,
        max_draw_count: u32,
        _draw_count: Option<BufferHandle>,
    ) {
        self.record(RecordedCommand::MultiDrawIndexedInstancedIndirect {
            arguments,
            max_draw_count,
        });
    }

    fn transition_image(&mut self, image: ImageHandle, transition: &ResourceTransition) {
        self.record(RecordedCommand::TransitionImage(image, *transition));
    }

    fn transition_buffer(&mut self, buffer: BufferHandle, transition: &ResourceTransition) {
        self.record(RecordedCommand::TransitionBuffer(buffer, *transition));
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.record(RecordedCommand::UpdateBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn map_buffer(&mut self, buffer: BufferHandle) -> BackendResult<&mut [u8]> {
        let size = self
            .buffer_sizes
            .lock()
            .get(&buffer)
            .copied()
            .ok_or_else(|| BackendError::MapFailed(format!("unknown buffer {:?}", buffer)))?;
        let staging = self
            .mapped
            .entry(buffer)
            .or_insert_with(|| vec![0; size as usize]);
        Ok(staging.as_mut_slice())
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        if let Some(data) = self.mapped.remove(&buffer) {
            self.record(RecordedCommand::UpdateBuffer {
                buffer,
                offset: 0,
                data,
            });
        }
    }

    fn copy_image(&mut self, source: ImageHandle, destination: ImageHandle) {
        self.record(RecordedCommand::CopyImage {
            source,
            destination,
        });
    }

    fn copy_buffer(&mut self, source: BufferHandle, destination: BufferHandle) {
        self.record(RecordedCommand::CopyBuffer {
            source,
            destination,
        });
    }
}

/// When fences handed to [`DummyDevice::submit`] are signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceMode {
    /// Signal during `submit`, as if the GPU were infinitely fast.
    #[default]
    Immediate,
    /// Keep fences pending until [`DummyDevice::complete_oldest_submission`]
    /// or [`DummyDevice::complete_all_submissions`] is called.
    Deferred,
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    capabilities: DeviceCapabilities,
    next_handle: u64,
    images: HashMap<ImageHandle, ImageDesc>,
    buffers: HashMap<BufferHandle, BufferDesc>,
    buffer_sizes: Arc<Mutex<HashMap<BufferHandle, u64>>>,
    buffer_contents: HashMap<BufferHandle, Vec<u8>>,
    pipeline_states: HashMap<PipelineStateHandle, PipelineStateDesc>,
    log: CommandLog,
    lists: [DummyCommandList; QueueType::COUNT],
    submissions: Vec<Vec<(QueueType, RecordedCommand)>>,
    fence_mode: FenceMode,
    pending_fences: Vec<Fence>,
    device_lost: bool,
    images_created: usize,
    buffers_created: usize,
}

impl DummyDevice {
    /// Create a new dummy device with default capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
        let buffer_sizes = Arc::new(Mutex::new(HashMap::new()));
        let list = |queue| DummyCommandList {
            queue,
            log: Arc::clone(&log),
            buffer_sizes: Arc::clone(&buffer_sizes),
            mapped: HashMap::new(),
        };
        let lists = [list(QueueType::Graphics), list(QueueType::AsyncCompute)];

        Self {
            capabilities,
            next_handle: 1,
            images: HashMap::new(),
            buffers: HashMap::new(),
            buffer_sizes,
            buffer_contents: HashMap::new(),
            pipeline_states: HashMap::new(),
            log,
            lists,
            submissions: Vec::new(),
            fence_mode: FenceMode::Immediate,
            pending_fences: Vec::new(),
            device_lost: false,
            images_created: 0,
            buffers_created: 0,
        }
    }

    pub fn set_fence_mode(&mut self, mode: FenceMode) {
        self.fence_mode = mode;
    }

    /// Simulate device removal: every later submit and status check fails.
    pub fn lose_device(&mut self) {
        log::trace!("DummyDevice: device lost");
        self.device_lost = true;
    }

    /// Signal the fence of the oldest pending submission.
    pub fn complete_oldest_submission(&mut self) -> bool {
        if self.pending_fences.is_empty() {
            return false;
        }
        self.pending_fences.remove(0).signal();
        true
    }

    /// Signal every pending fence.
    pub fn complete_all_submissions(&mut self) {
        for fence in self.pending_fences.drain(..) {
            fence.signal();
        }
    }

    pub fn pending_submission_count(&self) -> usize {
        self.pending_fences.len()
    }

    /// All submissions so far, each in recording order.
    pub fn submissions(&self) -> &[Vec<(QueueType, RecordedCommand)>] {
        &self.submissions
    }

    pub fn last_submission(&self) -> &[(QueueType, RecordedCommand)] {
        self.submissions.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Simulated contents of a buffer after all submitted work.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffer_contents.get(&buffer).map(Vec::as_slice)
    }

    pub fn image_desc(&self, image: ImageHandle) -> Option<&ImageDesc> {
        self.images.get(&image)
    }

    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(&buffer)
    }

    /// Images currently alive.
    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    /// Buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Images created over the device lifetime.
    pub fn images_created(&self) -> usize {
        self.images_created
    }

    /// Buffers created over the device lifetime.
    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn apply(&mut self, command: &RecordedCommand) {
        match command {
            RecordedCommand::UpdateBuffer {
                buffer,
                offset,
                data,
            } => {
                let Some(contents) = self.buffer_contents.get_mut(buffer) else {
                    return;
                };
                let start = *offset as usize;
                let end = (start + data.len()).min(contents.len());
                if start < end {
                    contents[start..end].copy_from_slice(&data[..end - start]);
                }
            }
            RecordedCommand::CopyBuffer {
                source,
                destination,
            } => {
                let Some(data) = self.buffer_contents.get(source).cloned() else {
                    return;
                };
                if let Some(contents) = self.buffer_contents.get_mut(destination) {
                    let len = data.len().min(contents.len());
                    contents[..len].copy_from_slice(&data[..len]);
                }
            }
            _ => {}
        }
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_image(&mut self, desc: &ImageDesc) -> BackendResult<ImageHandle> {
        if self.device_lost {
            return Err(BackendError::DeviceLost);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "zero-sized image {:?}",
                desc.label
            )));
        }
        let handle = ImageHandle::from_raw(self.allocate_handle());
        log::trace!(
            "DummyDevice: creating image {:?} {:?} ({}x{}x{})",
            handle,
            desc.label,
            desc.width,
            desc.height,
            desc.depth_or_array_size
        );
        self.images.insert(handle, desc.clone());
        self.images_created += 1;
        Ok(handle)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<BufferHandle> {
        if self.device_lost {
            return Err(BackendError::DeviceLost);
        }
        if desc.size == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "zero-sized buffer {:?}",
                desc.label
            )));
        }
        let handle = BufferHandle::from_raw(self.allocate_handle());
        log::trace!(
            "DummyDevice: creating buffer {:?} {:?} (size: {})",
            handle,
            desc.label,
            desc.size
        );
        self.buffers.insert(handle, desc.clone());
        self.buffer_sizes.lock().insert(handle, desc.size);
        self.buffer_contents.insert(handle, vec![0; desc.size as usize]);
        self.buffers_created += 1;
        Ok(handle)
    }

    fn create_pipeline_state(
        &mut self,
        desc: &PipelineStateDesc,
    ) -> BackendResult<PipelineStateHandle> {
        if self.device_lost {
            return Err(BackendError::DeviceLost);
        }
        let handle = PipelineStateHandle::from_raw(self.allocate_handle());
        log::trace!("DummyDevice: creating pipeline state {:?}", desc.label);
        self.pipeline_states.insert(handle, desc.clone());
        Ok(handle)
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        log::trace!("DummyDevice: destroying image {:?}", image);
        self.images.remove(&image);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        log::trace!("DummyDevice: destroying buffer {:?}", buffer);
        self.buffers.remove(&buffer);
        self.buffer_sizes.lock().remove(&buffer);
        self.buffer_contents.remove(&buffer);
    }

    fn command_list(&mut self, queue: QueueType) -> &mut dyn CommandList {
        &mut self.lists[queue.index()]
    }

    fn submit(&mut self, fence: &Fence) -> BackendResult<()> {
        if self.device_lost {
            return Err(BackendError::DeviceLost);
        }

        let commands = std::mem::take(&mut *self.log.lock());
        for (_, command) in &commands {
            self.apply(command);
        }
        log::trace!("DummyDevice: submitted {} commands", commands.len());
        self.submissions.push(commands);

        match self.fence_mode {
            FenceMode::Immediate => fence.signal(),
            FenceMode::Deferred => self.pending_fences.push(fence.clone()),
        }
        Ok(())
    }

    fn check_device_status(&self) -> BackendResult<()> {
        if self.device_lost {
            Err(BackendError::DeviceLost)
        } else {
            Ok(())
        }
    }
}
