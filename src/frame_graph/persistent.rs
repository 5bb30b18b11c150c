//! Cross-frame resources addressed by name.
//!
//! A slot is either a single resource or a ping-pong pair. A pair is
//! registered under two names, one resolving to the current read side and
//! one to the current write side. The slot owns the swap index: when the
//! write side was retrieved during a frame, the sides swap at RETIRE, so the
//! resource written in frame N is the one read in frame N+1.

use std::collections::HashMap;

use crate::backend::{NameHash, QueueType, ResourceState};
use crate::frame_graph::resource::{PhysicalResource, VirtualDesc};

/// Which side of a slot a name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRole {
    Single,
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub(crate) struct PersistentResource {
    pub physical: PhysicalResource,
    pub desc: VirtualDesc,
    pub state: ResourceState,
    pub queue: QueueType,
    /// Created by the graph (exports, built-in buffers); destroyed by it.
    pub owned: bool,
}

#[derive(Debug)]
enum PersistentSlot {
    Single(PersistentResource),
    PingPong {
        sides: [PersistentResource; 2],
        read_index: usize,
        read_name: NameHash,
        write_name: NameHash,
        write_retrieved: bool,
    },
}

impl PersistentSlot {
    fn side_index(&self, role: SlotRole) -> usize {
        match self {
            PersistentSlot::Single(_) => 0,
            PersistentSlot::PingPong { read_index, .. } => match role {
                SlotRole::Write => 1 - read_index,
                SlotRole::Read | SlotRole::Single => *read_index,
            },
        }
    }

    fn resource(&self, role: SlotRole) -> &PersistentResource {
        match self {
            PersistentSlot::Single(resource) => resource,
            PersistentSlot::PingPong { sides, .. } => &sides[self.side_index(role)],
        }
    }

    fn resource_mut(&mut self, role: SlotRole) -> &mut PersistentResource {
        let index = self.side_index(role);
        match self {
            PersistentSlot::Single(resource) => resource,
            PersistentSlot::PingPong { sides, .. } => &mut sides[index],
        }
    }

    fn into_resources(self) -> Vec<PersistentResource> {
        match self {
            PersistentSlot::Single(resource) => vec![resource],
            PersistentSlot::PingPong { sides, .. } => sides.into(),
        }
    }
}

/// What a name currently resolves to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PersistentLookup<'a> {
    pub resource: &'a PersistentResource,
    pub role: SlotRole,
}

/// Name table of persistent resources.
///
/// Written only at RETIRE and by explicit imports between frames; read by
/// the next frame's CAPTURE.
#[derive(Debug, Default)]
pub struct PersistentResourceTable {
    slots: HashMap<u32, PersistentSlot>,
    names: HashMap<NameHash, (u32, SlotRole)>,
    next_slot: u32,
}

impl PersistentResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: NameHash) -> bool {
        self.names.contains_key(&name)
    }

    /// Number of names registered.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn lookup(&self, name: NameHash) -> Option<PersistentLookup<'_>> {
        let (slot, role) = *self.names.get(&name)?;
        let slot = self.slots.get(&slot)?;
        Some(PersistentLookup {
            resource: slot.resource(role),
            role,
        })
    }

    /// Register a single resource, replacing whatever the name held.
    ///
    /// Returns the resources that are no longer referenced.
    pub(crate) fn insert_single(
        &mut self,
        name: NameHash,
        resource: PersistentResource,
    ) -> Vec<PersistentResource> {
        let released = self.remove(name);
        let slot = self.allocate_slot(PersistentSlot::Single(resource));
        self.names.insert(name, (slot, SlotRole::Single));
        released
    }

    /// Register a ping-pong pair. `sides[0]` is read first.
    pub(crate) fn insert_pair(
        &mut self,
        read_name: NameHash,
        write_name: NameHash,
        sides: [PersistentResource; 2],
    ) -> Vec<PersistentResource> {
        let mut released = self.remove(read_name);
        released.extend(self.remove(write_name));

        let slot = self.allocate_slot(PersistentSlot::PingPong {
            sides,
            read_index: 0,
            read_name,
            write_name,
            write_retrieved: false,
        });
        self.names.insert(read_name, (slot, SlotRole::Read));
        self.names.insert(write_name, (slot, SlotRole::Write));
        released
    }

    /// Remember that the write side of `name`'s slot was handed out this frame.
    pub(crate) fn mark_write_retrieved(&mut self, name: NameHash) {
        let Some(&(slot, role)) = self.names.get(&name) else {
            return;
        };
        if role != SlotRole::Write {
            return;
        }
        if let Some(PersistentSlot::PingPong {
            write_retrieved, ..
        }) = self.slots.get_mut(&slot)
        {
            *write_retrieved = true;
        }
    }

    /// Record the state a resource was left in at the end of the frame.
    pub(crate) fn update_state(&mut self, name: NameHash, state: ResourceState, queue: QueueType) {
        let Some(&(slot, role)) = self.names.get(&name) else {
            return;
        };
        if let Some(slot) = self.slots.get_mut(&slot) {
            let resource = slot.resource_mut(role);
            resource.state = state;
            resource.queue = queue;
        }
    }

    /// Swap every pair whose write side was retrieved this frame.
    pub(crate) fn rotate(&mut self) -> usize {
        let mut rotated = 0;
        for slot in self.slots.values_mut() {
            if let PersistentSlot::PingPong {
                read_index,
                write_retrieved,
                read_name,
                write_name,
                ..
            } = slot
            {
                if std::mem::take(write_retrieved) {
                    *read_index = 1 - *read_index;
                    rotated += 1;
                    log::trace!("Rotated ping-pong {:?} / {:?}", read_name, write_name);
                }
            }
        }
        rotated
    }

    /// Release a name. Removing either name of a pair removes the pair.
    pub(crate) fn remove(&mut self, name: NameHash) -> Vec<PersistentResource> {
        let Some((slot, _)) = self.names.remove(&name) else {
            return Vec::new();
        };
        let Some(slot) = self.slots.remove(&slot) else {
            return Vec::new();
        };
        if let PersistentSlot::PingPong {
            read_name,
            write_name,
            ..
        } = &slot
        {
            self.names.remove(read_name);
            self.names.remove(write_name);
        }
        slot.into_resources()
    }

    /// Empty the table, returning every resource it held.
    pub(crate) fn drain(&mut self) -> Vec<PersistentResource> {
        self.names.clear();
        self.slots
            .drain()
            .flat_map(|(_, slot)| slot.into_resources())
            .collect()
    }

    fn allocate_slot(&mut self, slot: PersistentSlot) -> u32 {
        let id = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(id, slot);
        id
    }
}
