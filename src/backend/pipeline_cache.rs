//! Pipeline state objects keyed by name.
//!
//! Modules create their pipeline states at load time; execute callbacks only
//! look them up.

use std::collections::HashMap;

use crate::backend::traits::{BackendResult, NameHash, PipelineStateHandle, RenderDevice};
use crate::backend::types::PipelineStateDesc;

#[derive(Debug, Default)]
pub struct PipelineStateCache {
    entries: HashMap<NameHash, (PipelineStateHandle, PipelineStateDesc)>,
}

impl PipelineStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pipeline state registered under `name`, creating it first if
    /// needed. A different descriptor under an existing name recreates it.
    pub fn get_or_create(
        &mut self,
        device: &mut dyn RenderDevice,
        name: NameHash,
        desc: &PipelineStateDesc,
    ) -> BackendResult<PipelineStateHandle> {
        if let Some((handle, cached)) = self.entries.get(&name) {
            if cached == desc {
                return Ok(*handle);
            }
            log::debug!("Recreating pipeline state {:?} ({:?})", name, desc.label);
        }

        let handle = device.create_pipeline_state(desc)?;
        self.entries.insert(name, (handle, desc.clone()));
        Ok(handle)
    }

    #[inline]
    pub fn get(&self, name: NameHash) -> Option<PipelineStateHandle> {
        self.entries.get(&name).map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
