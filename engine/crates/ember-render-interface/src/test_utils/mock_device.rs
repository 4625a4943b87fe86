use std::collections::{HashMap, HashSet, VecDeque};

use ash::vk::{self, Handle};
use ember_gfx::{
    commands::submit_info::GfxSubmitInfo,
    descriptors::bindless_table::GfxBindlessWrite,
    error::{GfxError, GfxResult},
    foundation::allocator::MemoryKey,
    gpu_device::{GpuDevice, GpuObject},
    resources::{
        buffer::{AllocatedBuffer, GfxBufferDesc},
        image::{AllocatedImage, GfxImageDesc},
        image_view::GfxImageViewDesc,
        sampler::GfxSamplerDesc,
    },
    swapchain::render_swapchain::{
        AcquireOutcome, GfxSwapchainDesc, GfxSwapchainImages, PREFERRED_SURFACE_FORMAT, PresentOutcome,
    },
};
use slotmap::SlotMap;

/// mock device 记录的调用
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    CopyBuffer {
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    WriteBuffer {
        buffer: vk::Buffer,
        len: usize,
    },
    Submit {
        command_buffer: vk::CommandBuffer,
        fence: Option<vk::Fence>,
    },
    QueueWaitIdle,
    DeviceWaitIdle,
    CreateSwapchain(vk::Extent2D),
    Acquire(vk::Semaphore),
    Present(u32),
    WriteBindless(usize),
    Destroy(GpuObject),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    /// reset 之后没有提交，等待它会死锁
    Unsignaled,
    /// 已经提交，wait 时视为 GPU 执行完成
    Submitted,
}

/// 不需要 GPU 的 `GpuDevice`
///
/// - fence：提交之后的 fence 在 wait 时立即完成；reset 之后没有提交的 fence 在 wait 时超时，模拟死锁
/// - acquire / present 的结果可以预先设置，默认总是成功
/// - 记录所有创建但尚未销毁的对象
pub struct MockDevice {
    next_handle: u64,
    events: Vec<MockEvent>,

    fences: HashMap<vk::Fence, FenceState>,
    live_objects: HashSet<u64>,
    /// 需要销毁的对象，按创建顺序
    created_objects: Vec<u64>,
    memory: SlotMap<MemoryKey, ()>,

    swapchain_image_count: HashMap<vk::SwapchainKHR, u32>,
    next_image_index: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,

    /// 为 true 时提交的 fence 永远不会完成，模拟 GPU hang
    pub gpu_hang: bool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            events: Vec::new(),
            fences: HashMap::new(),
            live_objects: HashSet::new(),
            created_objects: Vec::new(),
            memory: SlotMap::with_key(),
            swapchain_image_count: HashMap::new(),
            next_image_index: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            gpu_hang: false,
        }
    }

    fn mint<T: Handle>(&mut self) -> T {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live_objects.insert(raw);
        self.created_objects.push(raw);
        T::from_raw(raw)
    }

    /// 由其他对象持有、不需要单独销毁的句柄
    fn mint_owned<T: Handle + Copy>(&mut self) -> T {
        let handle: T = self.mint();
        self.live_objects.remove(&handle.as_raw());
        self.created_objects.pop();
        handle
    }

    fn finish_all_work(&mut self) {
        if self.gpu_hang {
            return;
        }
        for state in self.fences.values_mut() {
            if *state == FenceState::Submitted {
                *state = FenceState::Signaled;
            }
        }
    }

    fn forget<T: Handle>(&mut self, handle: T) {
        let raw = handle.as_raw();
        if !self.live_objects.remove(&raw) {
            panic!("destroying unknown or already destroyed object {raw:#x}");
        }
    }
}

// 测试用的控制和查询接口
impl MockDevice {
    pub fn events(&self) -> &[MockEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn live_object_count(&self) -> usize {
        self.live_objects.len()
    }

    pub fn is_live<T: Handle>(&self, handle: T) -> bool {
        self.live_objects.contains(&handle.as_raw())
    }

    pub fn live_allocation_count(&self) -> usize {
        self.memory.len()
    }

    pub fn script_acquire(&mut self, outcome: AcquireOutcome) {
        self.acquire_script.push_back(outcome);
    }

    pub fn script_present(&mut self, outcome: PresentOutcome) {
        self.present_script.push_back(outcome);
    }

    /// 每次 `write_bindless` 写入的数量
    pub fn bindless_write_batches(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MockEvent::WriteBindless(count) => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn waited_fences(&self) -> Vec<vk::Fence> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MockEvent::WaitFence(fence) => Some(*fence),
                _ => None,
            })
            .collect()
    }

    /// 仍然存活的对象，按创建顺序
    pub fn live_objects_in_creation_order(&self) -> Vec<u64> {
        self.created_objects.iter().copied().filter(|raw| self.live_objects.contains(raw)).collect()
    }

    pub fn destroyed_handles(&self) -> Vec<u64> {
        self.destroyed_objects().iter().map(raw_handle).collect()
    }

    pub fn destroyed_objects(&self) -> Vec<GpuObject> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Destroy(object) => Some(*object),
                _ => None,
            })
            .collect()
    }
}

impl GpuDevice for MockDevice {
    fn create_fence(&mut self, signaled: bool, _debug_name: &str) -> GfxResult<vk::Fence> {
        let fence = self.mint();
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.insert(fence, state);
        Ok(fence)
    }

    fn create_semaphore(&mut self, _debug_name: &str) -> GfxResult<vk::Semaphore> {
        Ok(self.mint())
    }

    fn wait_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        self.events.push(MockEvent::WaitFence(fence));
        let hang = self.gpu_hang;
        let state = self.fences.get_mut(&fence).expect("waiting on unknown fence");
        match *state {
            FenceState::Signaled => Ok(()),
            FenceState::Submitted if !hang => {
                *state = FenceState::Signaled;
                Ok(())
            }
            _ => Err(GfxError::timeout("vkWaitForFences", "fence", timeout_ns)),
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> GfxResult<()> {
        self.events.push(MockEvent::ResetFence(fence));
        let state = self.fences.get_mut(&fence).expect("resetting unknown fence");
        assert_ne!(*state, FenceState::Submitted, "resetting a fence that is still in flight");
        *state = FenceState::Unsignaled;
        Ok(())
    }

    fn create_command_pool(&mut self, _debug_name: &str) -> GfxResult<vk::CommandPool> {
        Ok(self.mint())
    }

    fn allocate_command_buffer(&mut self, _pool: vk::CommandPool, _debug_name: &str) -> GfxResult<vk::CommandBuffer> {
        // command buffer 随 pool 一起释放，不单独记录
        Ok(self.mint_owned())
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        self.events.push(MockEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        self.events.push(MockEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_copy_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.events.push(MockEvent::CopyBuffer {
            command_buffer,
            src,
            dst,
            size: regions.iter().map(|region| region.size).sum(),
        });
    }

    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()> {
        self.events.push(MockEvent::Submit {
            command_buffer: submit_info.command_buffer,
            fence: submit_info.fence,
        });
        if let Some(fence) = submit_info.fence {
            let state = self.fences.get_mut(&fence).expect("submitting with unknown fence");
            assert_eq!(*state, FenceState::Unsignaled, "submitting with a fence that is not reset");
            *state = FenceState::Submitted;
        }
        Ok(())
    }

    fn queue_wait_idle(&mut self) -> GfxResult<()> {
        self.events.push(MockEvent::QueueWaitIdle);
        self.finish_all_work();
        Ok(())
    }

    fn device_wait_idle(&mut self) -> GfxResult<()> {
        self.events.push(MockEvent::DeviceWaitIdle);
        self.finish_all_work();
        Ok(())
    }

    fn create_swapchain(&mut self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages> {
        self.events.push(MockEvent::CreateSwapchain(desc.window_extent));
        let swapchain: vk::SwapchainKHR = self.mint();
        let images = (0..desc.image_count)
            // image 属于 swapchain
            .map(|_| self.mint_owned::<vk::Image>())
            .collect::<Vec<_>>();
        let views = images.iter().map(|_| self.mint()).collect();
        self.swapchain_image_count.insert(swapchain, desc.image_count);
        self.next_image_index = 0;

        Ok(GfxSwapchainImages {
            swapchain,
            images,
            views,
            format: PREFERRED_SURFACE_FORMAT.format,
            extent: desc.window_extent,
        })
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        self.events.push(MockEvent::Acquire(semaphore));
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let count = self.swapchain_image_count.get(&swapchain).copied().expect("acquire from unknown swapchain");
        let image_index = self.next_image_index % count;
        self.next_image_index += 1;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn present(
        &mut self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        self.events.push(MockEvent::Present(image_index));
        Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Optimal))
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<AllocatedBuffer> {
        Ok(AllocatedBuffer {
            buffer: self.mint(),
            memory: self.memory.insert(()),
            size: desc.size,
            usage: desc.usage,
        })
    }

    fn write_buffer(&mut self, buffer: &AllocatedBuffer, data: &[u8]) -> GfxResult<()> {
        self.events.push(MockEvent::WriteBuffer {
            buffer: buffer.buffer,
            len: data.len(),
        });
        if !self.memory.contains_key(buffer.memory) {
            return Err(GfxError::Destroyed {
                what: "buffer",
                handle: buffer.buffer.as_raw(),
            });
        }
        assert!(data.len() as vk::DeviceSize <= buffer.size, "writing past the end of the buffer");
        Ok(())
    }

    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<AllocatedImage> {
        Ok(AllocatedImage {
            image: self.mint(),
            memory: self.memory.insert(()),
            extent: desc.extent,
            format: desc.format,
            usage: desc.usage,
        })
    }

    fn create_image_view(
        &mut self,
        _image: vk::Image,
        _desc: &GfxImageViewDesc,
        _debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        Ok(self.mint())
    }

    fn create_sampler(&mut self, _desc: &GfxSamplerDesc, _debug_name: &str) -> GfxResult<vk::Sampler> {
        Ok(self.mint())
    }

    fn write_bindless(&mut self, writes: &[GfxBindlessWrite]) -> GfxResult<()> {
        self.events.push(MockEvent::WriteBindless(writes.len()));
        Ok(())
    }

    fn destroy_object(&mut self, object: GpuObject) {
        self.events.push(MockEvent::Destroy(object));
        match object {
            GpuObject::Buffer(buffer) => {
                self.forget(buffer.buffer);
                assert!(self.memory.remove(buffer.memory).is_some(), "freeing unknown memory");
            }
            GpuObject::Image(image) => {
                self.forget(image.image);
                assert!(self.memory.remove(image.memory).is_some(), "freeing unknown memory");
            }
            GpuObject::ImageView(view) => self.forget(view),
            GpuObject::Sampler(sampler) => self.forget(sampler),
            GpuObject::Fence(fence) => {
                self.forget(fence);
                self.fences.remove(&fence);
            }
            GpuObject::Semaphore(semaphore) => self.forget(semaphore),
            GpuObject::CommandPool(pool) => self.forget(pool),
            GpuObject::Swapchain(swapchain) => {
                self.forget(swapchain);
                self.swapchain_image_count.remove(&swapchain);
            }
            GpuObject::Pipeline(pipeline) => self.forget(pipeline),
            GpuObject::ShaderModule(module) => self.forget(module),
        }
    }
}

/// 对象的原始句柄，buffer 和 image 取 vk 句柄
pub fn raw_handle(object: &GpuObject) -> u64 {
    match object {
        GpuObject::Buffer(buffer) => buffer.buffer.as_raw(),
        GpuObject::Image(image) => image.image.as_raw(),
        GpuObject::ImageView(view) => view.as_raw(),
        GpuObject::Sampler(sampler) => sampler.as_raw(),
        GpuObject::Fence(fence) => fence.as_raw(),
        GpuObject::Semaphore(semaphore) => semaphore.as_raw(),
        GpuObject::CommandPool(pool) => pool.as_raw(),
        GpuObject::Swapchain(swapchain) => swapchain.as_raw(),
        GpuObject::Pipeline(pipeline) => pipeline.as_raw(),
        GpuObject::ShaderModule(module) => module.as_raw(),
    }
}
