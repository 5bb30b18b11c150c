//! Backend abstraction layer
//!
//! Provides the device and command-list contract concrete graphics APIs
//! implement, the plain descriptor types they consume, the per-API resource
//! state tables and a recording dummy device.

pub mod dummy;
pub mod pipeline_cache;
pub mod state;
pub mod sync;
pub mod traits;
pub mod types;

pub use dummy::{DummyCommandList, DummyDevice, FenceMode, RecordedCommand};
pub use pipeline_cache::PipelineStateCache;
pub use state::*;
pub use sync::{Fence, FenceStatus};
pub use traits::*;
pub use types::*;
