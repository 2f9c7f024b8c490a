//! Decoded atom model.
//!
//! One atom is one captured Vulkan API call with its parameters already decoded
//! into plain values; reading capture bytes back is the decoder's job and stays
//! outside this crate. Mid-execution captures prefix the stream with `Recreate*`
//! calls that rebuild the state reached before capture start; those carry the
//! same payloads as their `vkCmd`/`vk` twins and are distinguished by
//! [AtomOrigin] only.

use ash::vk;

///Whether the call was captured live or synthesized by the capture layer to
/// rebuild pre-capture state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomOrigin {
    Captured,
    Recreated,
}

///One captured API call.
#[derive(Clone, Debug)]
pub struct Atom {
    pub origin: AtomOrigin,
    pub kind: AtomKind,
}

impl Atom {
    pub fn captured(kind: AtomKind) -> Self {
        Atom {
            origin: AtomOrigin::Captured,
            kind,
        }
    }

    pub fn recreated(kind: AtomKind) -> Self {
        Atom {
            origin: AtomOrigin::Recreated,
            kind,
        }
    }

    pub fn is_recreated(&self) -> bool {
        self.origin == AtomOrigin::Recreated
    }
}

impl From<AtomKind> for Atom {
    fn from(kind: AtomKind) -> Self {
        Atom::captured(kind)
    }
}

///A decoded `pNext` chain entry of a `VkMemoryAllocateInfo`.
#[derive(Clone, Debug)]
pub enum AllocationExtension {
    ///`VK_NV_dedicated_allocation`: the memory is dedicated to one image or
    /// buffer. At most one of the two handles is expected to be set.
    DedicatedNv {
        image: vk::Image,
        buffer: vk::Buffer,
    },
    ///Any chain entry this layer does not interpret.
    Other(vk::StructureType),
}

///A `(memory, offset, size)` range of a flush/invalidate call.
#[derive(Clone, Copy, Debug)]
pub struct MappedRange {
    pub memory: vk::DeviceMemory,
    pub offset: u64,
    pub size: u64,
}

///One element of `VkWriteDescriptorSet::pImageInfo`.
#[derive(Clone, Copy, Debug)]
pub struct ImageDescriptor {
    pub sampler: vk::Sampler,
    pub image_view: vk::ImageView,
}

///One element of `VkWriteDescriptorSet::pBufferInfo`.
#[derive(Clone, Copy, Debug)]
pub struct BufferDescriptor {
    pub buffer: vk::Buffer,
}

///One decoded `VkWriteDescriptorSet`.
#[derive(Clone, Debug)]
pub struct DescriptorWrite {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub images: Vec<ImageDescriptor>,
    pub buffers: Vec<BufferDescriptor>,
    pub texel_buffer_views: Vec<vk::BufferView>,
}

impl DescriptorWrite {
    pub fn descriptor_count(&self) -> usize {
        self.images.len() + self.buffers.len() + self.texel_buffer_views.len()
    }
}

///One decoded `VkCopyDescriptorSet`.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorCopy {
    pub src_set: vk::DescriptorSet,
    pub src_binding: u32,
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
}

///One `VkGraphicsPipelineCreateInfo` with the handles the graph cares about.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineInfo {
    pub pipeline: vk::Pipeline,
    pub stages: Vec<vk::ShaderModule>,
    pub render_pass: vk::RenderPass,
}

///One `VkComputePipelineCreateInfo` with the handles the graph cares about.
#[derive(Clone, Copy, Debug)]
pub struct ComputePipelineInfo {
    pub pipeline: vk::Pipeline,
    pub module: vk::ShaderModule,
}

///One `VkSubmitInfo` of a queue submission.
#[derive(Clone, Debug)]
pub struct SubmitInfo {
    pub command_buffers: Vec<vk::CommandBuffer>,
}

///The command families the extractor distinguishes. Everything else is
/// [Other](AtomKind::Other) and conservatively kept alive.
#[derive(Clone, Debug)]
pub enum AtomKind {
    CreateImage {
        image: vk::Image,
    },
    CreateBuffer {
        buffer: vk::Buffer,
        size: u64,
    },
    ///`vkGetImageMemoryRequirements`; how an image's size becomes known before
    /// its memory bind. Without it the bind creates a zero-size binding.
    GetImageMemoryRequirements {
        image: vk::Image,
        size: u64,
    },
    AllocateMemory {
        memory: vk::DeviceMemory,
        chain: Vec<AllocationExtension>,
    },
    BindImageMemory {
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    },
    BindBufferMemory {
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    },
    ///Upload of the image's pre-capture contents, recreate-only.
    RecreateImageData {
        image: vk::Image,
    },
    ///Upload of the buffer's pre-capture contents, recreate-only.
    RecreateBufferData {
        buffer: vk::Buffer,
    },
    DestroyImage {
        image: vk::Image,
    },
    DestroyBuffer {
        buffer: vk::Buffer,
    },
    FreeMemory {
        memory: vk::DeviceMemory,
    },
    MapMemory {
        memory: vk::DeviceMemory,
    },
    UnmapMemory {
        memory: vk::DeviceMemory,
    },
    FlushMappedMemoryRanges {
        ranges: Vec<MappedRange>,
    },
    InvalidateMappedMemoryRanges {
        ranges: Vec<MappedRange>,
    },
    CreateImageView {
        view: vk::ImageView,
        image: vk::Image,
    },
    CreateBufferView {
        view: vk::BufferView,
        buffer: vk::Buffer,
    },
    UpdateDescriptorSets {
        writes: Vec<DescriptorWrite>,
        copies: Vec<DescriptorCopy>,
    },
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: Vec<vk::ImageView>,
    },
    CreateRenderPass {
        render_pass: vk::RenderPass,
        attachments: Vec<crate::state::AttachmentOps>,
    },
    CreateGraphicsPipelines {
        pipelines: Vec<GraphicsPipelineInfo>,
    },
    CreateComputePipelines {
        pipelines: Vec<ComputePipelineInfo>,
    },
    CreateShaderModule {
        module: vk::ShaderModule,
    },
    BeginCommandBuffer {
        command_buffer: vk::CommandBuffer,
    },
    EndCommandBuffer {
        command_buffer: vk::CommandBuffer,
    },
    CmdCopyImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdCopyImageToBuffer {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_buffer: vk::Buffer,
    },
    CmdCopyBufferToImage {
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
    },
    CmdCopyBuffer {
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
    },
    CmdBlitImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdResolveImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdFillBuffer {
        command_buffer: vk::CommandBuffer,
        dst_buffer: vk::Buffer,
    },
    CmdUpdateBuffer {
        command_buffer: vk::CommandBuffer,
        dst_buffer: vk::Buffer,
    },
    CmdCopyQueryPoolResults {
        command_buffer: vk::CommandBuffer,
        dst_buffer: vk::Buffer,
    },
    CmdBindVertexBuffers {
        command_buffer: vk::CommandBuffer,
        buffers: Vec<vk::Buffer>,
    },
    CmdBindIndexBuffer {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
    },
    CmdDraw {
        command_buffer: vk::CommandBuffer,
    },
    CmdDrawIndexed {
        command_buffer: vk::CommandBuffer,
    },
    CmdDrawIndirect {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
    },
    CmdDrawIndexedIndirect {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
    },
    CmdDispatch {
        command_buffer: vk::CommandBuffer,
    },
    CmdDispatchIndirect {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
    },
    CmdBeginRenderPass {
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
    },
    CmdEndRenderPass {
        command_buffer: vk::CommandBuffer,
    },
    CmdNextSubpass {
        command_buffer: vk::CommandBuffer,
    },
    CmdPushConstants {
        command_buffer: vk::CommandBuffer,
    },
    CmdSetLineWidth {
        command_buffer: vk::CommandBuffer,
    },
    CmdSetScissor {
        command_buffer: vk::CommandBuffer,
    },
    CmdSetViewport {
        command_buffer: vk::CommandBuffer,
    },
    CmdSetDepthBias {
        command_buffer: vk::CommandBuffer,
    },
    CmdSetBlendConstants {
        command_buffer: vk::CommandBuffer,
    },
    CmdBindDescriptorSets {
        command_buffer: vk::CommandBuffer,
        descriptor_sets: Vec<vk::DescriptorSet>,
    },
    CmdBindPipeline {
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    },
    CmdBeginQuery {
        command_buffer: vk::CommandBuffer,
    },
    CmdEndQuery {
        command_buffer: vk::CommandBuffer,
    },
    CmdResetQueryPool {
        command_buffer: vk::CommandBuffer,
    },
    CmdClearAttachments {
        command_buffer: vk::CommandBuffer,
    },
    CmdClearColorImage {
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
    },
    CmdClearDepthStencilImage {
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
    },
    CmdPipelineBarrier {
        command_buffer: vk::CommandBuffer,
    },
    CmdExecuteCommands {
        command_buffer: vk::CommandBuffer,
        command_buffers: Vec<vk::CommandBuffer>,
    },
    QueueSubmit {
        queue: vk::Queue,
        submits: Vec<SubmitInfo>,
    },
    QueuePresent {
        queue: vk::Queue,
    },
    ///Any call this layer does not model.
    Other {
        name: String,
    },
}
