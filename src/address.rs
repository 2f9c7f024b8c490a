use std::fmt::Display;

use ash::vk::{self, Handle};
use fxhash::FxHashMap;

use crate::{
    command_buffer::CommandBufferKey,
    memory::{BindingKey, MemoryKey},
};

///Dense identity of a state cell within one graph. Address `0` is the null
/// address, the parent of all roots of the key forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateAddress(pub u32);

impl StateAddress {
    pub const NULL: StateAddress = StateAddress(0);

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Display for StateAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

///Type tag of a raw handle key. Two handles with the same raw value but
/// different tags are different state cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Image,
    Buffer,
    Memory,
    ImageView,
    BufferView,
    Pipeline,
    Framebuffer,
    RenderPass,
    DescriptorSet,
    Sampler,
    ShaderModule,
    Queue,
}

///An abstract state cell.
///
/// Raw Vulkan handles are value keys. Device memories and command buffers are
/// composites: they carry [slotmap] keys, so two composite keys are equal exactly
/// if they refer to the same entity. In particular two bind events with equal
/// `(offset, size)` on the same memory are *distinct* cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKey {
    Handle(HandleKind, u64),
    Memory(MemoryKey),
    MemoryHandle(MemoryKey),
    Binding {
        memory: MemoryKey,
        binding: BindingKey,
    },
    BindingData {
        memory: MemoryKey,
        binding: BindingKey,
    },
    CommandBuffer(CommandBufferKey),
    CommandBufferHandle(CommandBufferKey),
    CommandBufferRecords(CommandBufferKey),
}

impl StateKey {
    ///A handle key for `VK_NULL_HANDLE` names no cell at all and is ignored by
    /// all behavior helpers.
    pub fn is_null(&self) -> bool {
        matches!(self, StateKey::Handle(_, 0))
    }

    ///Parent cell in the key forest, `None` for roots.
    pub fn parent(&self) -> Option<StateKey> {
        match self {
            StateKey::Handle(_, _) | StateKey::Memory(_) | StateKey::CommandBuffer(_) => None,
            StateKey::MemoryHandle(m) => Some(StateKey::Memory(*m)),
            StateKey::Binding { memory, .. } => Some(StateKey::Memory(*memory)),
            StateKey::BindingData { memory, binding } => Some(StateKey::Binding {
                memory: *memory,
                binding: *binding,
            }),
            StateKey::CommandBufferHandle(cb) | StateKey::CommandBufferRecords(cb) => {
                Some(StateKey::CommandBuffer(*cb))
            }
        }
    }
}

impl Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKey::Handle(kind, raw) => write!(f, "{:?}({:#x})", kind, raw),
            StateKey::Memory(m) => write!(f, "Memory({:?})", m),
            StateKey::MemoryHandle(m) => write!(f, "MemoryHandle({:?})", m),
            StateKey::Binding { binding, .. } => write!(f, "Binding({:?})", binding),
            StateKey::BindingData { binding, .. } => write!(f, "BindingData({:?})", binding),
            StateKey::CommandBuffer(cb) => write!(f, "CommandBuffer({:?})", cb),
            StateKey::CommandBufferHandle(cb) => write!(f, "CommandBufferHandle({:?})", cb),
            StateKey::CommandBufferRecords(cb) => write!(f, "CommandBufferRecords({:?})", cb),
        }
    }
}

impl From<vk::Image> for StateKey {
    fn from(h: vk::Image) -> Self {
        StateKey::Handle(HandleKind::Image, h.as_raw())
    }
}
impl From<vk::Buffer> for StateKey {
    fn from(h: vk::Buffer) -> Self {
        StateKey::Handle(HandleKind::Buffer, h.as_raw())
    }
}
impl From<vk::DeviceMemory> for StateKey {
    fn from(h: vk::DeviceMemory) -> Self {
        StateKey::Handle(HandleKind::Memory, h.as_raw())
    }
}
impl From<vk::ImageView> for StateKey {
    fn from(h: vk::ImageView) -> Self {
        StateKey::Handle(HandleKind::ImageView, h.as_raw())
    }
}
impl From<vk::BufferView> for StateKey {
    fn from(h: vk::BufferView) -> Self {
        StateKey::Handle(HandleKind::BufferView, h.as_raw())
    }
}
impl From<vk::Pipeline> for StateKey {
    fn from(h: vk::Pipeline) -> Self {
        StateKey::Handle(HandleKind::Pipeline, h.as_raw())
    }
}
impl From<vk::Framebuffer> for StateKey {
    fn from(h: vk::Framebuffer) -> Self {
        StateKey::Handle(HandleKind::Framebuffer, h.as_raw())
    }
}
impl From<vk::RenderPass> for StateKey {
    fn from(h: vk::RenderPass) -> Self {
        StateKey::Handle(HandleKind::RenderPass, h.as_raw())
    }
}
impl From<vk::DescriptorSet> for StateKey {
    fn from(h: vk::DescriptorSet) -> Self {
        StateKey::Handle(HandleKind::DescriptorSet, h.as_raw())
    }
}
impl From<vk::Sampler> for StateKey {
    fn from(h: vk::Sampler) -> Self {
        StateKey::Handle(HandleKind::Sampler, h.as_raw())
    }
}
impl From<vk::ShaderModule> for StateKey {
    fn from(h: vk::ShaderModule) -> Self {
        StateKey::Handle(HandleKind::ShaderModule, h.as_raw())
    }
}
impl From<vk::Queue> for StateKey {
    fn from(h: vk::Queue) -> Self {
        StateKey::Handle(HandleKind::Queue, h.as_raw())
    }
}

struct AddressEntry {
    key: Option<StateKey>,
    parent: StateAddress,
}

///Canonicalizes [StateKey]s into dense [StateAddress]es and records each
/// address's parent. Addresses are assigned monotonically on first sight,
/// parents strictly before their children.
pub struct AddressMap {
    address: FxHashMap<StateKey, StateAddress>,
    entries: Vec<AddressEntry>,
}

impl Default for AddressMap {
    fn default() -> Self {
        AddressMap::new()
    }
}

impl AddressMap {
    pub fn new() -> Self {
        AddressMap {
            address: FxHashMap::default(),
            //slot 0 is the null address, its own parent
            entries: vec![AddressEntry {
                key: None,
                parent: StateAddress::NULL,
            }],
        }
    }

    ///Address of `key`, assigned on first sight. Idempotent: the same key always
    /// yields the same address. The key's parent chain is assigned first.
    pub fn address_of(&mut self, key: StateKey) -> StateAddress {
        if let Some(addr) = self.address.get(&key) {
            return *addr;
        }
        let parent = match key.parent() {
            Some(p) => self.address_of(p),
            None => StateAddress::NULL,
        };
        let addr = StateAddress(self.entries.len() as u32);
        self.address.insert(key, addr);
        self.entries.push(AddressEntry {
            key: Some(key),
            parent,
        });
        addr
    }

    ///Inverse lookup. `None` for the null address and for addresses this map
    /// never assigned.
    pub fn key_of(&self, addr: StateAddress) -> Option<StateKey> {
        self.entries.get(addr.0 as usize).and_then(|e| e.key)
    }

    ///Parent of `addr`. The null address is its own parent.
    pub fn parent_of(&self, addr: StateAddress) -> StateAddress {
        self.entries
            .get(addr.0 as usize)
            .map(|e| e.parent)
            .unwrap_or(StateAddress::NULL)
    }

    ///Number of assigned addresses, the null address included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        //the null entry is always there
        self.entries.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPool;

    #[test]
    fn address_of_is_idempotent() {
        let mut map = AddressMap::new();
        let img = StateKey::from(vk::Image::from_raw(0xdead));
        let a = map.address_of(img);
        let b = map.address_of(img);
        assert_eq!(a, b);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn handles_are_tagged() {
        let mut map = AddressMap::new();
        let img = map.address_of(StateKey::from(vk::Image::from_raw(7)));
        let buf = map.address_of(StateKey::from(vk::Buffer::from_raw(7)));
        assert_ne!(img, buf);
    }

    #[test]
    fn handle_parent_is_null() {
        let mut map = AddressMap::new();
        let addr = map.address_of(StateKey::from(vk::Queue::from_raw(1)));
        assert_eq!(map.parent_of(addr), StateAddress::NULL);
        assert_eq!(map.parent_of(StateAddress::NULL), StateAddress::NULL);
        assert_eq!(map.key_of(StateAddress::NULL), None);
    }

    #[test]
    fn parents_are_assigned_before_children() {
        let mut map = AddressMap::new();
        let mut pool = MemoryPool::new();
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(0x10));
        let binding = pool.add_binding(mem, 0, 64);

        //first sight of the data key must assign binding and memory first
        let data = map.address_of(pool.data_key(binding));
        let bind = map.address_of(pool.binding_key(binding));
        let memory = map.address_of(StateKey::Memory(mem));

        assert!(memory < bind);
        assert!(bind < data);
        assert_eq!(map.parent_of(data), bind);
        assert_eq!(map.parent_of(bind), memory);
        assert_eq!(map.parent_of(memory), StateAddress::NULL);
    }

    #[test]
    fn distinct_bind_events_are_distinct_cells() {
        let mut map = AddressMap::new();
        let mut pool = MemoryPool::new();
        let mem = pool.get_or_create(vk::DeviceMemory::from_raw(0x10));
        let b0 = pool.add_binding(mem, 0, 64);
        let b1 = pool.add_binding(mem, 0, 64);
        assert_ne!(
            map.address_of(pool.binding_key(b0)),
            map.address_of(pool.binding_key(b1))
        );
    }
}
