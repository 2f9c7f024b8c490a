//! The reference Vulkan state a build maintains while walking the atom stream.
//!
//! The behavior extractor never inspects raw capture bytes; it resolves atom
//! parameters against this state *after* the atom has been applied to it. The
//! state is deliberately minimal: it tracks exactly the object properties the
//! extractor queries, nothing more.

use ash::vk;
use fxhash::FxHashMap;

use crate::{
    atom::{Atom, AtomKind, DescriptorWrite},
    MutationError,
};

///Where a resource is bound into a device memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBindPoint {
    pub memory: vk::DeviceMemory,
    pub offset: u64,
}

///Tracked properties of one image.
#[derive(Clone, Debug)]
pub struct TrackedImage {
    ///Swapchain images are owned by the presentation engine and never resolve
    /// to memory bindings.
    pub is_swapchain: bool,
    pub bound: Option<MemoryBindPoint>,
    ///Size reported by the memory-requirements query, 0 while unknown.
    pub size: u64,
}

///Tracked properties of one buffer.
#[derive(Clone, Debug)]
pub struct TrackedBuffer {
    pub size: u64,
    pub bound: Option<MemoryBindPoint>,
}

#[derive(Clone, Debug)]
pub struct TrackedFramebuffer {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
}

///Load/store behavior of one render-pass attachment.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentOps {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

#[derive(Clone, Debug)]
pub struct TrackedRenderPass {
    pub attachments: Vec<AttachmentOps>,
}

///Resources currently referenced by one descriptor-set binding slot.
#[derive(Clone, Debug, Default)]
pub struct DescriptorContents {
    pub buffers: Vec<vk::Buffer>,
    pub image_views: Vec<vk::ImageView>,
    pub buffer_views: Vec<vk::BufferView>,
}

#[derive(Clone, Debug, Default)]
pub struct TrackedDescriptorSet {
    pub bindings: FxHashMap<u32, DescriptorContents>,
}

///Reference state snapshot, sequentially mutated by a [StateMutator] while the
/// graph build walks the atom stream.
#[derive(Clone, Debug, Default)]
pub struct TrackedState {
    images: FxHashMap<vk::Image, TrackedImage>,
    buffers: FxHashMap<vk::Buffer, TrackedBuffer>,
    image_views: FxHashMap<vk::ImageView, vk::Image>,
    buffer_views: FxHashMap<vk::BufferView, vk::Buffer>,
    framebuffers: FxHashMap<vk::Framebuffer, TrackedFramebuffer>,
    render_passes: FxHashMap<vk::RenderPass, TrackedRenderPass>,
    descriptor_sets: FxHashMap<vk::DescriptorSet, TrackedDescriptorSet>,
}

impl TrackedState {
    pub fn new() -> Self {
        TrackedState::default()
    }

    pub fn image(&self, image: vk::Image) -> Option<&TrackedImage> {
        self.images.get(&image)
    }

    pub fn buffer(&self, buffer: vk::Buffer) -> Option<&TrackedBuffer> {
        self.buffers.get(&buffer)
    }

    pub fn image_of_view(&self, view: vk::ImageView) -> Option<vk::Image> {
        self.image_views.get(&view).copied()
    }

    pub fn buffer_of_view(&self, view: vk::BufferView) -> Option<vk::Buffer> {
        self.buffer_views.get(&view).copied()
    }

    pub fn framebuffer(&self, framebuffer: vk::Framebuffer) -> Option<&TrackedFramebuffer> {
        self.framebuffers.get(&framebuffer)
    }

    pub fn render_pass(&self, render_pass: vk::RenderPass) -> Option<&TrackedRenderPass> {
        self.render_passes.get(&render_pass)
    }

    pub fn descriptor_set(&self, set: vk::DescriptorSet) -> Option<&TrackedDescriptorSet> {
        self.descriptor_sets.get(&set)
    }

    pub fn insert_image(&mut self, image: vk::Image) {
        self.images.insert(
            image,
            TrackedImage {
                is_swapchain: false,
                bound: None,
                size: 0,
            },
        );
    }

    ///Registers an image obtained from a swapchain. Swapchain images never come
    /// from a `vkCreateImage` atom, so captures seed them into the fresh state.
    pub fn insert_swapchain_image(&mut self, image: vk::Image) {
        self.images.insert(
            image,
            TrackedImage {
                is_swapchain: true,
                bound: None,
                size: 0,
            },
        );
    }

    pub fn insert_buffer(&mut self, buffer: vk::Buffer, size: u64) {
        self.buffers.insert(buffer, TrackedBuffer { size, bound: None });
    }

    pub fn bind_image(&mut self, image: vk::Image, bind: MemoryBindPoint) {
        if let Some(img) = self.images.get_mut(&image) {
            img.bound = Some(bind);
        }
    }

    pub fn bind_buffer(&mut self, buffer: vk::Buffer, bind: MemoryBindPoint) {
        if let Some(buf) = self.buffers.get_mut(&buffer) {
            buf.bound = Some(bind);
        }
    }

    pub fn set_image_size(&mut self, image: vk::Image, size: u64) {
        if let Some(img) = self.images.get_mut(&image) {
            img.size = size;
        }
    }
}

///Applies one atom to the reference state. The full state mutator of a capture
/// replayer lives outside this crate; implementations here only need to keep
/// [TrackedState] consistent enough for behavior extraction.
pub trait StateMutator {
    ///Mutates `state` in place. An error marks the atom's behavior as aborted;
    /// the build continues with the next atom.
    fn mutate(&mut self, state: &mut TrackedState, atom: &Atom) -> Result<(), MutationError>;
}

///Reference [StateMutator]: tracks object lifetimes, memory bind points and
/// descriptor contents, and ignores everything else. It is lenient on purpose:
/// handles missing from the state surface later as extraction-time diagnostics,
/// the way the capture replayer behaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackingMutator;

impl TrackingMutator {
    pub fn new() -> Self {
        TrackingMutator
    }

    fn apply_descriptor_write(state: &mut TrackedState, write: &DescriptorWrite) {
        if write.descriptor_count() == 0 {
            return;
        }
        let set = state.descriptor_sets.entry(write.dst_set).or_default();
        let slot = set.bindings.entry(write.dst_binding).or_default();
        *slot = DescriptorContents {
            buffers: write.buffers.iter().map(|b| b.buffer).collect(),
            image_views: write.images.iter().map(|i| i.image_view).collect(),
            buffer_views: write.texel_buffer_views.clone(),
        };
    }
}

impl StateMutator for TrackingMutator {
    fn mutate(&mut self, state: &mut TrackedState, atom: &Atom) -> Result<(), MutationError> {
        match &atom.kind {
            AtomKind::CreateImage { image } => state.insert_image(*image),
            AtomKind::CreateBuffer { buffer, size } => state.insert_buffer(*buffer, *size),
            AtomKind::GetImageMemoryRequirements { image, size } => {
                state.set_image_size(*image, *size)
            }
            AtomKind::BindImageMemory {
                image,
                memory,
                offset,
            } => state.bind_image(
                *image,
                MemoryBindPoint {
                    memory: *memory,
                    offset: *offset,
                },
            ),
            AtomKind::BindBufferMemory {
                buffer,
                memory,
                offset,
            } => state.bind_buffer(
                *buffer,
                MemoryBindPoint {
                    memory: *memory,
                    offset: *offset,
                },
            ),
            AtomKind::CreateImageView { view, image } => {
                state.image_views.insert(*view, *image);
            }
            AtomKind::CreateBufferView { view, buffer } => {
                state.buffer_views.insert(*view, *buffer);
            }
            AtomKind::CreateFramebuffer {
                framebuffer,
                render_pass,
                attachments,
            } => {
                state.framebuffers.insert(
                    *framebuffer,
                    TrackedFramebuffer {
                        render_pass: *render_pass,
                        attachments: attachments.clone(),
                    },
                );
            }
            AtomKind::CreateRenderPass {
                render_pass,
                attachments,
            } => {
                state.render_passes.insert(
                    *render_pass,
                    TrackedRenderPass {
                        attachments: attachments.clone(),
                    },
                );
            }
            AtomKind::UpdateDescriptorSets { writes, copies } => {
                for write in writes {
                    Self::apply_descriptor_write(state, write);
                }
                for copy in copies {
                    let contents = state
                        .descriptor_sets
                        .get(&copy.src_set)
                        .and_then(|s| s.bindings.get(&copy.src_binding))
                        .cloned()
                        .unwrap_or_default();
                    state
                        .descriptor_sets
                        .entry(copy.dst_set)
                        .or_default()
                        .bindings
                        .insert(copy.dst_binding, contents);
                }
            }
            AtomKind::DestroyImage { image } => {
                state.images.remove(image);
            }
            AtomKind::DestroyBuffer { buffer } => {
                state.buffers.remove(buffer);
            }
            //map/unmap, command recording and submission leave the tracked
            //object state untouched
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{BufferDescriptor, DescriptorCopy};
    use ash::vk::Handle;

    fn mutate(state: &mut TrackedState, kind: AtomKind) {
        TrackingMutator::new()
            .mutate(state, &Atom::from(kind))
            .unwrap();
    }

    #[test]
    fn binding_updates_the_bind_point() {
        let mut state = TrackedState::new();
        let buffer = vk::Buffer::from_raw(1);
        let memory = vk::DeviceMemory::from_raw(2);
        mutate(&mut state, AtomKind::CreateBuffer { buffer, size: 128 });
        mutate(
            &mut state,
            AtomKind::BindBufferMemory {
                buffer,
                memory,
                offset: 32,
            },
        );
        let tracked = state.buffer(buffer).unwrap();
        assert_eq!(tracked.size, 128);
        assert_eq!(tracked.bound, Some(MemoryBindPoint { memory, offset: 32 }));
    }

    #[test]
    fn requirements_set_the_image_size() {
        let mut state = TrackedState::new();
        let image = vk::Image::from_raw(1);
        mutate(&mut state, AtomKind::CreateImage { image });
        assert_eq!(state.image(image).unwrap().size, 0);
        mutate(
            &mut state,
            AtomKind::GetImageMemoryRequirements { image, size: 4096 },
        );
        assert_eq!(state.image(image).unwrap().size, 4096);
    }

    #[test]
    fn descriptor_writes_and_copies_apply() {
        let mut state = TrackedState::new();
        let src = vk::DescriptorSet::from_raw(1);
        let dst = vk::DescriptorSet::from_raw(2);
        let buffer = vk::Buffer::from_raw(3);
        mutate(
            &mut state,
            AtomKind::UpdateDescriptorSets {
                writes: vec![DescriptorWrite {
                    dst_set: src,
                    dst_binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    images: Vec::new(),
                    buffers: vec![BufferDescriptor { buffer }],
                    texel_buffer_views: Vec::new(),
                }],
                copies: Vec::new(),
            },
        );
        mutate(
            &mut state,
            AtomKind::UpdateDescriptorSets {
                writes: Vec::new(),
                copies: vec![DescriptorCopy {
                    src_set: src,
                    src_binding: 0,
                    dst_set: dst,
                    dst_binding: 1,
                }],
            },
        );
        let copied = &state.descriptor_set(dst).unwrap().bindings[&1];
        assert_eq!(copied.buffers, vec![buffer]);
    }

    #[test]
    fn destroy_removes_the_object() {
        let mut state = TrackedState::new();
        let image = vk::Image::from_raw(1);
        mutate(&mut state, AtomKind::CreateImage { image });
        mutate(&mut state, AtomKind::DestroyImage { image });
        assert!(state.image(image).is_none());
    }
}
