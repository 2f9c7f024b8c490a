use ash::vk;
use fxhash::FxHashMap;
use slotmap::SlotMap;

use crate::{AccessKind, AddressMap, Behavior, StateAddress};

slotmap::new_key_type!(
    ///Identity of one tracked `VkCommandBuffer`.
    pub struct CommandBufferKey;
);

///One deferred effect of a recorded command.
///
/// Everything state-dependent is resolved while the command is recorded, so an
/// effect carries only canonical addresses (or a raw secondary handle whose
/// record list is looked up at replay time). Replaying an effect is therefore
/// deterministic no matter how often, or how late, the command buffer is
/// submitted.
#[derive(Clone, Debug)]
pub enum DeferredEffect {
    Touch {
        kind: AccessKind,
        address: StateAddress,
    },
    ///Walk the record list of a secondary command buffer, as concatenated by
    /// `vkCmdExecuteCommands`. The list is resolved at replay time, so the
    /// secondary's records at submit are the ones that run.
    Secondary {
        command_buffer: vk::CommandBuffer,
    },
}

impl DeferredEffect {
    pub fn read(address: StateAddress) -> Self {
        DeferredEffect::Touch {
            kind: AccessKind::Read,
            address,
        }
    }

    pub fn modify(address: StateAddress) -> Self {
        DeferredEffect::Touch {
            kind: AccessKind::Modify,
            address,
        }
    }

    pub fn write(address: StateAddress) -> Self {
        DeferredEffect::Touch {
            kind: AccessKind::Write,
            address,
        }
    }
}

struct CommandBufferEntry {
    handle: vk::CommandBuffer,
    ///One record per recorded command, in recording order.
    records: Vec<Vec<DeferredEffect>>,
}

///Tracks every command buffer the graph has seen, together with the deferred
/// effects of its recorded commands.
pub struct CommandBufferPool {
    by_handle: FxHashMap<vk::CommandBuffer, CommandBufferKey>,
    buffers: SlotMap<CommandBufferKey, CommandBufferEntry>,
}

impl Default for CommandBufferPool {
    fn default() -> Self {
        CommandBufferPool::new()
    }
}

impl CommandBufferPool {
    pub fn new() -> Self {
        CommandBufferPool {
            by_handle: FxHashMap::default(),
            buffers: SlotMap::with_key(),
        }
    }

    ///Key of the command buffer for `handle`, created on first sight.
    pub fn get_or_create(&mut self, handle: vk::CommandBuffer) -> CommandBufferKey {
        if let Some(key) = self.by_handle.get(&handle) {
            return *key;
        }
        let key = self.buffers.insert(CommandBufferEntry {
            handle,
            records: Vec::new(),
        });
        self.by_handle.insert(handle, key);
        key
    }

    pub fn handle(&self, key: CommandBufferKey) -> Option<vk::CommandBuffer> {
        self.buffers.get(key).map(|cb| cb.handle)
    }

    ///Key of an already tracked command buffer.
    pub fn key_for(&self, handle: vk::CommandBuffer) -> Option<CommandBufferKey> {
        self.by_handle.get(&handle).copied()
    }

    ///Appends one recorded command's deferred effects.
    pub fn append(&mut self, key: CommandBufferKey, record: Vec<DeferredEffect>) {
        self.buffers[key].records.push(record);
    }

    ///Drops all records. Called when recording begins, so the begin atom's
    /// write of the records cell matches the actual replacement.
    pub fn reset(&mut self, key: CommandBufferKey) {
        self.buffers[key].records.clear();
    }

    pub fn record_count(&self, key: CommandBufferKey) -> usize {
        self.buffers.get(key).map(|cb| cb.records.len()).unwrap_or(0)
    }

    ///Materializes every recorded effect of `key` into `behavior`. Runs once
    /// per submission of the command buffer; a buffer submitted twice replays
    /// twice.
    #[cfg_attr(not(feature = "log_reasoning"), allow(unused_variables))]
    pub fn replay(&self, key: CommandBufferKey, behavior: &mut Behavior, addresses: &AddressMap) {
        let entry = match self.buffers.get(key) {
            Some(e) => e,
            None => return,
        };
        for record in &entry.records {
            for effect in record {
                match effect {
                    DeferredEffect::Touch { kind, address } => {
                        #[cfg(feature = "log_reasoning")]
                        log::trace!(
                            "\treplay {}: stateKey: {}, stateAddress: {}",
                            kind,
                            addresses
                                .key_of(*address)
                                .map(|k| k.to_string())
                                .unwrap_or_else(|| "<null>".to_string()),
                            address
                        );
                        behavior.push(*kind, *address);
                    }
                    DeferredEffect::Secondary { command_buffer } => {
                        match self.by_handle.get(command_buffer) {
                            Some(secondary) => self.replay(*secondary, behavior, addresses),
                            None => log::error!(
                                "Secondary command buffer {:?} was never recorded",
                                command_buffer
                            ),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn reset_replaces_the_records() {
        let mut pool = CommandBufferPool::new();
        let key = pool.get_or_create(vk::CommandBuffer::from_raw(1));
        pool.append(key, vec![DeferredEffect::read(StateAddress(1))]);
        pool.append(key, vec![DeferredEffect::read(StateAddress(2))]);
        assert_eq!(pool.record_count(key), 2);
        pool.reset(key);
        assert_eq!(pool.record_count(key), 0);
    }

    #[test]
    fn replay_is_repeatable() {
        let mut pool = CommandBufferPool::new();
        let addresses = AddressMap::new();
        let key = pool.get_or_create(vk::CommandBuffer::from_raw(1));
        pool.append(
            key,
            vec![
                DeferredEffect::read(StateAddress(1)),
                DeferredEffect::modify(StateAddress(2)),
                DeferredEffect::write(StateAddress(3)),
            ],
        );

        let mut first = Behavior::new();
        pool.replay(key, &mut first, &addresses);
        let mut second = Behavior::new();
        pool.replay(key, &mut second, &addresses);
        assert_eq!(first, second);
        assert_eq!(first.reads, vec![StateAddress(1)]);
        assert_eq!(first.modifies, vec![StateAddress(2)]);
        assert_eq!(first.writes, vec![StateAddress(3)]);
    }

    #[test]
    fn secondary_records_replay_inline() {
        let mut pool = CommandBufferPool::new();
        let addresses = AddressMap::new();
        let secondary_handle = vk::CommandBuffer::from_raw(2);
        let secondary = pool.get_or_create(secondary_handle);
        pool.append(secondary, vec![DeferredEffect::modify(StateAddress(7))]);

        let primary = pool.get_or_create(vk::CommandBuffer::from_raw(1));
        pool.append(
            primary,
            vec![DeferredEffect::Secondary {
                command_buffer: secondary_handle,
            }],
        );

        let mut b = Behavior::new();
        pool.replay(primary, &mut b, &addresses);
        assert_eq!(b.modifies, vec![StateAddress(7)]);

        //records appended to the secondary after ExecuteCommands still replay
        pool.append(secondary, vec![DeferredEffect::read(StateAddress(8))]);
        let mut b = Behavior::new();
        pool.replay(primary, &mut b, &addresses);
        assert_eq!(b.reads, vec![StateAddress(8)]);
    }
}
