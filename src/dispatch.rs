//! The behavior extractor: one `match` over the atom kinds, emitting the
//! read/modify/write set of each atom after the reference state has applied it.
//!
//! A few behaviors are deliberately NOT attached to the atom that carries them
//! out on the GPU. Draw commands consume whatever vertex/index buffers and
//! descriptor sets are bound at that point of the command buffer, but by the
//! time a submit replays the recording only the *last* bound set of each is
//! still visible in the reference state. So the read/modify of those resources
//! is hoisted into the bind commands, where the reference state still knows
//! them. This may keep a buffer alive that was bound but never drawn from; it
//! never drops a live one.

use ash::vk;
use fxhash::FxHashSet;

use crate::{
    atom::{AllocationExtension, Atom, AtomKind, DescriptorWrite},
    command_buffer::{CommandBufferPool, DeferredEffect},
    memory::{BindingKey, MemoryPool},
    state::TrackedState,
    AccessKind, AddressMap, Behavior, StateAddress, StateKey,
};

///Produces the behavior of `atom`. The caller has already applied the atom to
/// `state`, so every state query sees post-effect values.
pub(crate) fn extract(
    addresses: &mut AddressMap,
    memories: &mut MemoryPool,
    command_buffers: &mut CommandBufferPool,
    roots: &mut FxHashSet<StateAddress>,
    state: &TrackedState,
    atom: &Atom,
) -> Behavior {
    let mut extractor = Extractor {
        addresses,
        memories,
        command_buffers,
        roots,
        state,
        behavior: Behavior::new(),
    };
    extractor.dispatch(atom);
    extractor.behavior
}

struct Extractor<'g> {
    addresses: &'g mut AddressMap,
    memories: &'g mut MemoryPool,
    command_buffers: &'g mut CommandBufferPool,
    roots: &'g mut FxHashSet<StateAddress>,
    state: &'g TrackedState,
    behavior: Behavior,
}

impl<'g> Extractor<'g> {
    fn touch(&mut self, kind: AccessKind, key: StateKey) {
        if key.is_null() {
            return;
        }
        let address = self.addresses.address_of(key);
        #[cfg(feature = "log_reasoning")]
        log::trace!("\t{}: stateKey: {}, stateAddress: {}", kind, key, address);
        self.behavior.push(kind, address);
    }

    fn read(&mut self, key: impl Into<StateKey>) {
        self.touch(AccessKind::Read, key.into());
    }

    fn modify(&mut self, key: impl Into<StateKey>) {
        self.touch(AccessKind::Modify, key.into());
    }

    fn write(&mut self, key: impl Into<StateKey>) {
        self.touch(AccessKind::Write, key.into());
    }

    ///Reads the image handle and resolves the bindings backing the image.
    fn read_image_and_bindings(&mut self, image: vk::Image) -> Vec<BindingKey> {
        self.read(image);
        self.memories.bindings_for_image(self.state, image)
    }

    ///Reads the buffer handle and resolves the bindings backing the buffer.
    fn read_buffer_and_bindings(&mut self, buffer: vk::Buffer) -> Vec<BindingKey> {
        self.read(buffer);
        self.memories.bindings_for_buffer(self.state, buffer)
    }

    ///Touches the data cell of every binding in the current behavior.
    fn touch_binding_data(&mut self, kind: AccessKind, bindings: &[BindingKey]) {
        for binding in bindings {
            let key = self.memories.data_key(*binding);
            self.touch(kind, key);
        }
    }

    ///Resolves the data cells of `bindings` to addresses and appends them to a
    /// deferred-effect list.
    fn defer_binding_data(
        &mut self,
        kind: AccessKind,
        bindings: &[BindingKey],
        effects: &mut Vec<DeferredEffect>,
    ) {
        for binding in bindings {
            let key = self.memories.data_key(*binding);
            let address = self.addresses.address_of(key);
            effects.push(DeferredEffect::Touch { kind, address });
        }
    }

    fn deferred_address(&mut self, key: impl Into<StateKey>) -> StateAddress {
        self.addresses.address_of(key.into())
    }

    ///Attaches one recorded command to `handle`: the current behavior reads the
    /// command buffer's handle cell and modifies its records cell (the adjacent
    /// dedup in [Behavior] keeps one entry per atom), and the deferred effects
    /// run at every submit.
    fn record(&mut self, handle: vk::CommandBuffer, effects: Vec<DeferredEffect>) {
        let key = self.command_buffers.get_or_create(handle);
        self.read(StateKey::CommandBufferHandle(key));
        self.modify(StateKey::CommandBufferRecords(key));
        self.command_buffers.append(key, effects);
    }

    ///Records a command that touches memory binding data at submit time:
    /// `read`, then `modify`, then `write` of the respective data cells.
    fn record_touching(
        &mut self,
        handle: vk::CommandBuffer,
        read: &[BindingKey],
        modify: &[BindingKey],
        write: &[BindingKey],
    ) {
        let mut effects = Vec::with_capacity(read.len() + modify.len() + write.len());
        self.defer_binding_data(AccessKind::Read, read, &mut effects);
        self.defer_binding_data(AccessKind::Modify, modify, &mut effects);
        self.defer_binding_data(AccessKind::Write, write, &mut effects);
        self.record(handle, effects);
    }

    ///Walks a `VkWriteDescriptorSet` list. Returns the offending type if a
    /// write uses a descriptor type this layer does not understand.
    fn descriptor_writes(&mut self, writes: &[DescriptorWrite]) -> Result<(), vk::DescriptorType> {
        for write in writes {
            if write.descriptor_count() == 0 {
                continue;
            }
            self.modify(write.dst_set);
            match write.descriptor_type {
                vk::DescriptorType::SAMPLER
                | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                | vk::DescriptorType::SAMPLED_IMAGE
                | vk::DescriptorType::STORAGE_IMAGE
                | vk::DescriptorType::INPUT_ATTACHMENT => {
                    for info in &write.images {
                        self.read(info.sampler);
                        self.read(info.image_view);
                    }
                }
                vk::DescriptorType::UNIFORM_BUFFER
                | vk::DescriptorType::STORAGE_BUFFER
                | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => {
                    for info in &write.buffers {
                        self.read(info.buffer);
                    }
                }
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER
                | vk::DescriptorType::STORAGE_TEXEL_BUFFER => {
                    for view in &write.texel_buffer_views {
                        self.read(*view);
                    }
                }
                other => return Err(other),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, atom: &Atom) {
        match &atom.kind {
            AtomKind::CreateImage { image } => self.write(*image),

            AtomKind::CreateBuffer { buffer, .. } => self.write(*buffer),

            AtomKind::AllocateMemory { memory, chain } => {
                let mem = self.memories.get_or_create(*memory);
                self.write(StateKey::Memory(mem));
                for ext in chain {
                    match ext {
                        AllocationExtension::DedicatedNv { image, buffer } => {
                            if *image != vk::Image::null() {
                                self.read(*image);
                            }
                            if *buffer != vk::Buffer::null() {
                                self.read(*buffer);
                            }
                        }
                        AllocationExtension::Other(_) => {}
                    }
                }
            }

            AtomKind::BindImageMemory {
                image,
                memory,
                offset,
            } => {
                self.modify(*image);
                let mem = self.memories.get_or_create(*memory);
                self.read(StateKey::MemoryHandle(mem));
                if let Some(img) = self.state.image(*image) {
                    //The size is 0 when the trace never queried the image's
                    //memory requirements. The zero-size binding still takes
                    //part in overlap resolution, as covered by any range that
                    //starts at or spans its offset.
                    let offset = img.bound.map_or(*offset, |b| b.offset);
                    let binding = self.memories.add_binding(mem, offset, img.size);
                    let key = self.memories.binding_key(binding);
                    self.write(key);
                }
            }

            AtomKind::BindBufferMemory {
                buffer,
                memory,
                offset,
            } => {
                self.modify(*buffer);
                let mem = self.memories.get_or_create(*memory);
                self.read(StateKey::MemoryHandle(mem));
                if let Some(buf) = self.state.buffer(*buffer) {
                    let offset = buf.bound.map_or(*offset, |b| b.offset);
                    let binding = self.memories.add_binding(mem, offset, buf.size);
                    let key = self.memories.binding_key(binding);
                    self.write(key);
                }
            }

            AtomKind::RecreateImageData { image } => {
                self.modify(*image);
                let bindings = self.memories.bindings_for_image(self.state, *image);
                self.touch_binding_data(AccessKind::Write, &bindings);
            }

            AtomKind::RecreateBufferData { buffer } => {
                self.modify(*buffer);
                let bindings = self.memories.bindings_for_buffer(self.state, *buffer);
                self.touch_binding_data(AccessKind::Write, &bindings);
            }

            //Destroys and frees are kept alive so the creation atom of the
            //handle stays live as well, even if the handle is never used
            //anywhere else.
            AtomKind::DestroyImage { image } => {
                self.modify(*image);
                self.behavior.keep_alive = true;
            }

            AtomKind::DestroyBuffer { buffer } => {
                self.modify(*buffer);
                self.behavior.keep_alive = true;
            }

            AtomKind::FreeMemory { memory } => {
                self.read(*memory);
                self.behavior.keep_alive = true;
            }

            AtomKind::MapMemory { memory } | AtomKind::UnmapMemory { memory } => {
                let mem = self.memories.get_or_create(*memory);
                self.modify(StateKey::Memory(mem));
            }

            AtomKind::FlushMappedMemoryRanges { ranges } => {
                for range in ranges {
                    let mem = self.memories.get_or_create(range.memory);
                    for binding in self.memories.overlapping(mem, range.offset, range.size) {
                        let b = *self.memories.binding(binding);
                        let data = self.memories.data_key(binding);
                        if range.offset <= b.start && range.offset + range.size >= b.end {
                            if b.start == b.end {
                                //size unknown at bind time, so the flush cannot
                                //be proven to overwrite the whole resource
                                self.modify(data);
                            } else {
                                self.write(data);
                            }
                        } else {
                            self.modify(data);
                        }
                    }
                }
            }

            AtomKind::InvalidateMappedMemoryRanges { ranges } => {
                for range in ranges {
                    let mem = self.memories.get_or_create(range.memory);
                    let bindings = self.memories.overlapping(mem, range.offset, range.size);
                    self.touch_binding_data(AccessKind::Read, &bindings);
                }
            }

            AtomKind::CreateImageView { view, image } => {
                self.read(*image);
                self.write(*view);
            }

            AtomKind::CreateBufferView { view, buffer } => {
                self.read(*buffer);
                self.write(*view);
            }

            AtomKind::UpdateDescriptorSets { writes, copies } => {
                if let Err(ty) = self.descriptor_writes(writes) {
                    log::error!("Unhandled descriptor type: {:?}", ty);
                    self.behavior = Behavior::aborted();
                    return;
                }
                if atom.is_recreated() {
                    //recreated descriptor updates carry writes only
                    if !copies.is_empty() {
                        log::error!("Descriptor copies cannot be recreated");
                        self.behavior = Behavior::aborted();
                    }
                    return;
                }
                for copy in copies {
                    self.read(copy.src_set);
                    self.modify(copy.dst_set);
                }
            }

            AtomKind::CreateFramebuffer {
                framebuffer,
                render_pass,
                attachments,
            } => {
                self.write(*framebuffer);
                self.read(*render_pass);
                for view in attachments {
                    self.read(*view);
                }
            }

            AtomKind::CreateRenderPass { render_pass, .. } => self.write(*render_pass),

            AtomKind::CreateGraphicsPipelines { pipelines } => {
                for info in pipelines {
                    for module in &info.stages {
                        self.read(*module);
                    }
                    self.read(info.render_pass);
                    self.write(info.pipeline);
                }
            }

            AtomKind::CreateComputePipelines { pipelines } => {
                for info in pipelines {
                    self.read(info.module);
                    self.write(info.pipeline);
                }
            }

            AtomKind::CreateShaderModule { module } => self.write(*module),

            AtomKind::BeginCommandBuffer { command_buffer } => {
                let key = self.command_buffers.get_or_create(*command_buffer);
                self.command_buffers.reset(key);
                if atom.is_recreated() {
                    self.write(StateKey::CommandBuffer(key));
                } else {
                    self.read(StateKey::CommandBufferHandle(key));
                    self.write(StateKey::CommandBufferRecords(key));
                }
            }

            AtomKind::EndCommandBuffer { command_buffer } => {
                let key = self.command_buffers.get_or_create(*command_buffer);
                self.modify(StateKey::CommandBuffer(key));
            }

            //Without tracking the copy regions the destination cannot be
            //assumed fully overwritten, so it is modified, never written.
            AtomKind::CmdCopyImage {
                command_buffer,
                src_image,
                dst_image,
            }
            | AtomKind::CmdBlitImage {
                command_buffer,
                src_image,
                dst_image,
            }
            | AtomKind::CmdResolveImage {
                command_buffer,
                src_image,
                dst_image,
            } => {
                let src = self.read_image_and_bindings(*src_image);
                let dst = self.read_image_and_bindings(*dst_image);
                self.record_touching(*command_buffer, &src, &dst, &[]);
            }

            AtomKind::CmdCopyImageToBuffer {
                command_buffer,
                src_image,
                dst_buffer,
            } => {
                let src = self.read_image_and_bindings(*src_image);
                let dst = self.read_buffer_and_bindings(*dst_buffer);
                self.record_touching(*command_buffer, &src, &dst, &[]);
            }

            AtomKind::CmdCopyBufferToImage {
                command_buffer,
                src_buffer,
                dst_image,
            } => {
                let src = self.read_buffer_and_bindings(*src_buffer);
                let dst = self.read_image_and_bindings(*dst_image);
                self.record_touching(*command_buffer, &src, &dst, &[]);
            }

            AtomKind::CmdCopyBuffer {
                command_buffer,
                src_buffer,
                dst_buffer,
            } => {
                let src = self.read_buffer_and_bindings(*src_buffer);
                let dst = self.read_buffer_and_bindings(*dst_buffer);
                self.record_touching(*command_buffer, &src, &dst, &[]);
            }

            AtomKind::CmdFillBuffer {
                command_buffer,
                dst_buffer,
            }
            | AtomKind::CmdUpdateBuffer {
                command_buffer,
                dst_buffer,
            }
            | AtomKind::CmdCopyQueryPoolResults {
                command_buffer,
                dst_buffer,
            } => {
                let dst = self.read_buffer_and_bindings(*dst_buffer);
                self.record_touching(*command_buffer, &[], &dst, &[]);
            }

            AtomKind::CmdBindVertexBuffers {
                command_buffer,
                buffers,
            } => {
                for buffer in buffers {
                    let bindings = self.read_buffer_and_bindings(*buffer);
                    //the bind changes the buffer's last-bound-queue, so the
                    //replay is a modify of the handle, not a read
                    let handle = self.deferred_address(*buffer);
                    let mut effects = vec![DeferredEffect::modify(handle)];
                    self.defer_binding_data(AccessKind::Read, &bindings, &mut effects);
                    self.record(*command_buffer, effects);
                }
            }

            AtomKind::CmdBindIndexBuffer {
                command_buffer,
                buffer,
            } => {
                let bindings = self.read_buffer_and_bindings(*buffer);
                let handle = self.deferred_address(*buffer);
                let mut effects = vec![DeferredEffect::modify(handle)];
                self.defer_binding_data(AccessKind::Read, &bindings, &mut effects);
                self.record(*command_buffer, effects);
            }

            //Pure recorded commands: the read of the handle cell and modify of
            //the records cell is enough to keep them live when a submit is.
            AtomKind::CmdDraw { command_buffer }
            | AtomKind::CmdDrawIndexed { command_buffer }
            | AtomKind::CmdDispatch { command_buffer }
            | AtomKind::CmdEndRenderPass { command_buffer }
            | AtomKind::CmdNextSubpass { command_buffer }
            | AtomKind::CmdPushConstants { command_buffer }
            | AtomKind::CmdSetLineWidth { command_buffer }
            | AtomKind::CmdSetScissor { command_buffer }
            | AtomKind::CmdSetViewport { command_buffer }
            | AtomKind::CmdSetDepthBias { command_buffer }
            | AtomKind::CmdSetBlendConstants { command_buffer }
            | AtomKind::CmdBeginQuery { command_buffer }
            | AtomKind::CmdEndQuery { command_buffer }
            | AtomKind::CmdResetQueryPool { command_buffer }
            | AtomKind::CmdClearAttachments { command_buffer }
            | AtomKind::CmdPipelineBarrier { command_buffer } => {
                self.record(*command_buffer, Vec::new());
            }

            AtomKind::CmdClearColorImage { command_buffer, .. }
            | AtomKind::CmdClearDepthStencilImage { command_buffer, .. } => {
                self.record(*command_buffer, Vec::new());
            }

            AtomKind::CmdDrawIndirect {
                command_buffer,
                buffer,
            }
            | AtomKind::CmdDrawIndexedIndirect {
                command_buffer,
                buffer,
            }
            | AtomKind::CmdDispatchIndirect {
                command_buffer,
                buffer,
            } => {
                //indirect parameters are read as observed at record time
                let bindings = self.read_buffer_and_bindings(*buffer);
                self.record_touching(*command_buffer, &bindings, &[], &[]);
            }

            AtomKind::CmdBindDescriptorSets {
                command_buffer,
                descriptor_sets,
            } => {
                for set in descriptor_sets {
                    self.read(*set);
                    let tracked = match self.state.descriptor_set(*set) {
                        Some(tracked) => tracked,
                        None => continue,
                    };
                    for contents in tracked.bindings.values() {
                        for buffer in &contents.buffers {
                            let bindings = self.memories.bindings_for_buffer(self.state, *buffer);
                            let handle = self.deferred_address(*buffer);
                            let mut effects = vec![DeferredEffect::modify(handle)];
                            self.defer_binding_data(AccessKind::Modify, &bindings, &mut effects);
                            self.record(*command_buffer, effects);
                        }
                        for view in &contents.image_views {
                            let handle = self.deferred_address(*view);
                            let mut effects = vec![DeferredEffect::read(handle)];
                            if let Some(image) = self.state.image_of_view(*view) {
                                let bindings =
                                    self.memories.bindings_for_image(self.state, image);
                                self.defer_binding_data(AccessKind::Read, &bindings, &mut effects);
                            }
                            self.record(*command_buffer, effects);
                        }
                        for view in &contents.buffer_views {
                            let handle = self.deferred_address(*view);
                            let mut effects = vec![DeferredEffect::read(handle)];
                            if let Some(buffer) = self.state.buffer_of_view(*view) {
                                let bindings =
                                    self.memories.bindings_for_buffer(self.state, buffer);
                                self.defer_binding_data(AccessKind::Read, &bindings, &mut effects);
                            }
                            self.record(*command_buffer, effects);
                        }
                    }
                }
            }

            AtomKind::CmdBindPipeline {
                command_buffer,
                pipeline,
            } => {
                let handle = self.deferred_address(*pipeline);
                self.record(*command_buffer, vec![DeferredEffect::read(handle)]);
                self.read(*pipeline);
            }

            AtomKind::CmdBeginRenderPass {
                command_buffer,
                framebuffer,
                render_pass,
            } => {
                self.read(*framebuffer);
                self.read(*render_pass);
                let (fb, rp) = match (
                    self.state.framebuffer(*framebuffer),
                    self.state.render_pass(*render_pass),
                ) {
                    (Some(fb), Some(rp)) => (fb, rp),
                    _ => return,
                };
                for (view, ops) in fb.attachments.iter().zip(rp.attachments.iter()) {
                    let image = match self.state.image_of_view(*view) {
                        Some(image) => image,
                        None => {
                            log::error!("ImageView {:?} does not exist in state", view);
                            continue;
                        }
                    };
                    //The attachment is resolved through overlap, so in theory
                    //extra memory may be covered. In practice an attachment
                    //image is bound to one memory range as a whole.
                    let bindings = self.memories.bindings_for_image(self.state, image);
                    let loads = ops.load_op == vk::AttachmentLoadOp::LOAD;
                    let stores = ops.store_op != vk::AttachmentStoreOp::DONT_CARE;
                    match (loads, stores) {
                        //cleared on load and stored: the attachment data is
                        //overwritten by the pass
                        (false, true) => {
                            self.record_touching(*command_buffer, &[], &[], &bindings)
                        }
                        (true, true) => self.record_touching(*command_buffer, &[], &bindings, &[]),
                        (true, false) => self.record_touching(*command_buffer, &bindings, &[], &[]),
                        //neither loaded nor stored: scratch attachment, no
                        //memory effect at all
                        (false, false) => {}
                    }
                }
            }

            AtomKind::CmdExecuteCommands {
                command_buffer,
                command_buffers,
            } => {
                for secondary in command_buffers {
                    let key = self.command_buffers.get_or_create(*secondary);
                    self.read(StateKey::CommandBuffer(key));
                    self.record(
                        *command_buffer,
                        vec![DeferredEffect::Secondary {
                            command_buffer: *secondary,
                        }],
                    );
                }
            }

            AtomKind::QueueSubmit { queue, submits } => {
                //submits anchor the recorded work, they are never dropped
                self.behavior.keep_alive = true;
                self.modify(*queue);
                for submit in submits {
                    for command_buffer in &submit.command_buffers {
                        let key = self.command_buffers.get_or_create(*command_buffer);
                        self.read(StateKey::CommandBuffer(key));
                        self.command_buffers
                            .replay(key, &mut self.behavior, self.addresses);
                    }
                }
            }

            AtomKind::QueuePresent { queue } => {
                self.read(*queue);
                let address = self.addresses.address_of((*queue).into());
                self.roots.insert(address);
                self.behavior.keep_alive = true;
            }

            AtomKind::GetImageMemoryRequirements { .. } | AtomKind::Other { .. } => {
                self.behavior.keep_alive = true;
                #[cfg(feature = "log_reasoning")]
                log::trace!("\tnot handled by DCE, kept alive");
            }
        }
    }
}
