//! Frame Graph - per-frame GPU work scheduling for a real-time renderer
//!
//! Rendering stages register passes that declare the resources they read
//! and write. The graph resolves execution order, memory aliasing and
//! cross-queue synchronization for them, without the stages knowing about
//! each other.
//!
//! # Features
//! - Builder API for declaring reads, writes, allocations and copies
//! - Deterministic scheduling with pass culling
//! - Async compute queue placement with automatic cross-queue transitions
//! - Transient memory aliasing from per-frame-slot pools
//! - Persistent cross-frame resources, including ping-pong pairs
//! - Backend-independent resource states with D3D12, D3D11 and Vulkan tables

pub mod backend;
pub mod error;
pub mod frame_graph;
pub mod scene;

use std::time::Duration;

pub use error::{FrameGraphError, FrameGraphResult};
pub use frame_graph::{
    AllocationFlags, CompiledFrame, FrameGraph, FrameGraphBuilder, FrameGraphResources,
    FramePhase, FrameStats, ResourceHandle, LAST_FRAME_IMAGE, MATERIAL_EDITOR_BUFFER,
    PER_VIEW_BUFFER,
};
pub use scene::{Camera, DrawCmd, DrawCommandBuckets, DrawCommandLayer, FrameView};

/// How passes that asked for async compute are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsyncComputePolicy {
    /// Everything runs on the graphics queue.
    Disabled,
    /// Every eligible pass runs on the compute queue.
    Always,
    /// Eligible passes run on the compute queue only when some graphics
    /// work could overlap them.
    #[default]
    Heuristic,
}

/// Configuration of a [`FrameGraph`], fixed at creation
#[derive(Debug, Clone)]
pub struct FrameGraphConfig {
    /// Frames the CPU may run ahead of the GPU
    pub frames_in_flight: usize,
    pub async_compute: AsyncComputePolicy,
    /// Share memory between transient resources with disjoint lifetimes
    pub enable_aliasing: bool,
    /// Skip passes whose outputs nobody consumes
    pub enable_culling: bool,
    /// Interval between warnings while waiting on a stalled GPU
    pub stall_warning_timeout: Duration,
    /// Frames a pooled transient resource may stay unused before it is destroyed
    pub transient_pool_max_idle_frames: u32,
    /// Size in bytes of the material editor buffer
    pub material_editor_buffer_size: u64,
    /// Temporal anti-aliasing toggle for render modules
    pub enable_taa: bool,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            async_compute: AsyncComputePolicy::Heuristic,
            enable_aliasing: true,
            enable_culling: true,
            stall_warning_timeout: Duration::from_secs(2),
            transient_pool_max_idle_frames: 8,
            material_editor_buffer_size: 64 * 1024,
            enable_taa: true,
        }
    }
}
