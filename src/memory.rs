use ash::vk;
use fxhash::FxHashMap;
use slotmap::SlotMap;

use crate::{state::TrackedState, StateKey};

slotmap::new_key_type!(
    ///Identity of one tracked `VkDeviceMemory` allocation.
    pub struct MemoryKey;
);
slotmap::new_key_type!(
    ///Identity of one bind event on a device memory. Rebinding the same offset
    /// yields a fresh key; bindings are never merged or removed.
    pub struct BindingKey;
);

///A contiguous `[start, end)` range within a device memory, created by one
/// bind event. `end == start` marks a binding whose size was unknown at bind
/// time (the trace never queried the image's memory requirements).
#[derive(Clone, Copy, Debug)]
pub struct Binding {
    pub memory: MemoryKey,
    pub start: u64,
    pub end: u64,
}

struct DeviceMemoryEntry {
    handle: vk::DeviceMemory,
    ///Bind history per offset, in bind order.
    bindings: FxHashMap<u64, Vec<BindingKey>>,
}

///Tracks every device memory the graph has seen, together with its full bind
/// history. Bindings accumulate for the lifetime of the graph so that every
/// historical binding stays addressable.
pub struct MemoryPool {
    by_handle: FxHashMap<vk::DeviceMemory, MemoryKey>,
    memories: SlotMap<MemoryKey, DeviceMemoryEntry>,
    bindings: SlotMap<BindingKey, Binding>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        MemoryPool::new()
    }
}

impl MemoryPool {
    pub fn new() -> Self {
        MemoryPool {
            by_handle: FxHashMap::default(),
            memories: SlotMap::with_key(),
            bindings: SlotMap::with_key(),
        }
    }

    ///Key of the memory for `handle`, created on first sight.
    pub fn get_or_create(&mut self, handle: vk::DeviceMemory) -> MemoryKey {
        if let Some(key) = self.by_handle.get(&handle) {
            return *key;
        }
        let key = self.memories.insert(DeviceMemoryEntry {
            handle,
            bindings: FxHashMap::default(),
        });
        self.by_handle.insert(handle, key);
        key
    }

    pub fn handle(&self, memory: MemoryKey) -> Option<vk::DeviceMemory> {
        self.memories.get(memory).map(|m| m.handle)
    }

    ///Appends a new binding `[offset, offset + size)` to the memory's bind
    /// history.
    pub fn add_binding(&mut self, memory: MemoryKey, offset: u64, size: u64) -> BindingKey {
        let key = self.bindings.insert(Binding {
            memory,
            start: offset,
            end: offset + size,
        });
        self.memories[memory]
            .bindings
            .entry(offset)
            .or_default()
            .push(key);
        key
    }

    pub fn binding(&self, binding: BindingKey) -> &Binding {
        &self.bindings[binding]
    }

    ///State key of the binding cell itself (the range metadata).
    pub fn binding_key(&self, binding: BindingKey) -> StateKey {
        StateKey::Binding {
            memory: self.bindings[binding].memory,
            binding,
        }
    }

    ///State key of the bytes the binding covers.
    pub fn data_key(&self, binding: BindingKey) -> StateKey {
        StateKey::BindingData {
            memory: self.bindings[binding].memory,
            binding,
        }
    }

    ///Every binding of `memory` whose range intersects `[offset, offset + size)`.
    pub fn overlapping(&self, memory: MemoryKey, offset: u64, size: u64) -> Vec<BindingKey> {
        let mut overlapped = Vec::new();
        if let Some(entry) = self.memories.get(memory) {
            for list in entry.bindings.values() {
                for key in list {
                    let b = &self.bindings[*key];
                    if ranges_overlap(b.start, b.end, offset, offset + size) {
                        overlapped.push(*key);
                    }
                }
            }
        }
        overlapped
    }

    ///Bindings backing `image` according to the reference state. Swapchain
    /// images are presentation-engine owned and yield nothing; images that are
    /// unknown or not yet bound yield nothing as well, with an error log.
    pub fn bindings_for_image(
        &mut self,
        state: &TrackedState,
        image: vk::Image,
    ) -> Vec<BindingKey> {
        let img = match state.image(image) {
            Some(img) => img,
            None => {
                log::error!("Image {:?} does not exist in state", image);
                return Vec::new();
            }
        };
        if img.is_swapchain {
            return Vec::new();
        }
        match img.bound {
            Some(bound) => {
                let memory = self.get_or_create(bound.memory);
                self.overlapping(memory, bound.offset, img.size)
            }
            None => {
                log::error!(
                    "Image {:?}: cannot get the bound memory for an image which has not been bound yet",
                    image
                );
                Vec::new()
            }
        }
    }

    ///Bindings backing `buffer` according to the reference state.
    pub fn bindings_for_buffer(
        &mut self,
        state: &TrackedState,
        buffer: vk::Buffer,
    ) -> Vec<BindingKey> {
        let buf = match state.buffer(buffer) {
            Some(buf) => buf,
            None => {
                log::error!("Buffer {:?} does not exist in state", buffer);
                return Vec::new();
            }
        };
        match buf.bound {
            Some(bound) => {
                let memory = self.get_or_create(bound.memory);
                self.overlapping(memory, bound.offset, buf.size)
            }
            None => {
                log::error!(
                    "Buffer {:?}: cannot get the bound memory for a buffer which has not been bound yet",
                    buffer
                );
                Vec::new()
            }
        }
    }
}

///Half-open interval overlap of a binding `[start_a, end_a)` against a query
/// `[start_b, end_b)`. A zero-size binding is covered by any query that begins
/// at its start or spans across it.
fn ranges_overlap(start_a: u64, end_a: u64, start_b: u64, end_b: u64) -> bool {
    if start_a == end_a {
        return start_b <= start_a && start_a < end_b;
    }
    start_a < end_b && start_b < end_a
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::state::MemoryBindPoint;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut pool = MemoryPool::new();
        let handle = vk::DeviceMemory::from_raw(0x42);
        assert_eq!(pool.get_or_create(handle), pool.get_or_create(handle));
    }

    #[test]
    fn overlap_detects_intersections() {
        let mut pool = MemoryPool::new();
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(1));
        let b1 = pool.add_binding(mem, 0, 100);
        let b2 = pool.add_binding(mem, 50, 100);

        let mut hits = pool.overlapping(mem, 0, 200);
        hits.sort();
        let mut expected = vec![b1, b2];
        expected.sort();
        assert_eq!(hits, expected);

        assert!(pool.overlapping(mem, 200, 10).is_empty());
    }

    #[test]
    fn zero_size_binding_is_covered_by_spanning_ranges() {
        let mut pool = MemoryPool::new();
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(1));
        let degenerate = pool.add_binding(mem, 64, 0);

        //query starting exactly at the binding's start
        assert_eq!(pool.overlapping(mem, 64, 16), vec![degenerate]);
        //query spanning across it
        assert_eq!(pool.overlapping(mem, 0, 128), vec![degenerate]);
        //query ending at it does not cover
        assert!(pool.overlapping(mem, 0, 64).is_empty());
    }

    #[test]
    fn rebinding_keeps_the_history() {
        let mut pool = MemoryPool::new();
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(1));
        let b0 = pool.add_binding(mem, 0, 64);
        let b1 = pool.add_binding(mem, 0, 64);
        assert_ne!(b0, b1);
        assert_eq!(pool.overlapping(mem, 0, 64).len(), 2);
        assert!(pool.binding(b0).end >= pool.binding(b0).start);
    }

    #[test]
    fn swapchain_images_have_no_bindings() {
        let mut pool = MemoryPool::new();
        let mut state = TrackedState::new();
        let image = vk::Image::from_raw(0x77);
        state.insert_swapchain_image(image);
        assert!(pool.bindings_for_image(&state, image).is_empty());
    }

    #[test]
    fn missing_and_unbound_resources_resolve_empty() {
        let mut pool = MemoryPool::new();
        let mut state = TrackedState::new();
        //unknown image
        assert!(pool
            .bindings_for_image(&state, vk::Image::from_raw(1))
            .is_empty());

        //bound buffer resolves, unbound does not
        let bound = vk::Buffer::from_raw(2);
        let unbound = vk::Buffer::from_raw(3);
        state.insert_buffer(bound, 64);
        state.insert_buffer(unbound, 64);
        state.bind_buffer(
            bound,
            MemoryBindPoint {
                memory: vk::DeviceMemory::from_raw(9),
                offset: 0,
            },
        );
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(9));
        let b = pool.add_binding(mem, 0, 64);
        assert_eq!(pool.bindings_for_buffer(&state, bound), vec![b]);
        assert!(pool.bindings_for_buffer(&state, unbound).is_empty());
    }
}
