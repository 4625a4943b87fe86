use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, submit_info::GfxSubmitInfo},
    descriptors::bindless_table::{DescriptorKind, GfxBindlessTable, GfxBindlessWrite},
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{
        allocator::GfxAllocator, debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
    },
    gpu_device::{GpuDevice, GpuObject},
    resources::{
        buffer::{AllocatedBuffer, GfxBufferDesc},
        image::{AllocatedImage, GfxImageDesc},
        image_view::GfxImageViewDesc,
        sampler::GfxSamplerDesc,
    },
    swapchain::{
        render_swapchain::{
            AcquireOutcome, GfxSwapchainDesc, GfxSwapchainImages, GfxSwapchainSettings, PresentOutcome,
        },
        surface::GfxSurface,
    },
};

pub struct GfxCreateInfo {
    pub app_name: String,
    /// 开启 validation layer 以及 debug utils
    pub validation: bool,
    pub raw_display_handle: raw_window_handle::RawDisplayHandle,
    pub raw_window_handle: raw_window_handle::RawWindowHandle,
    /// 每种 descriptor 期望的数量，会被 clamp 到设备的上限
    pub descriptor_capacities: [u32; DescriptorKind::COUNT],
}

/// Vulkan 图形上下文
///
/// 管理实例、surface、设备、队列、内存分配器以及全局的 bindless table。
/// 不是单例：由 renderer 持有，以 `&mut` 的方式传给需要访问 GPU 的模块。
///
/// # 初始化流程
/// ```ignore
/// let mut gfx = Gfx::new(create_info)?;
/// // 使用...
/// gfx.destroy();
/// ```
pub struct Gfx {
    vk_entry: ash::Entry,
    instance: GfxInstance,
    debug_msger: Option<GfxDebugMsger>,
    surface: GfxSurface,
    physical_device: GfxPhysicalDevice,
    gfx_device: GfxDevice,
    gfx_queue: vk::Queue,
    allocator: GfxAllocator,
    bindless_table: GfxBindlessTable,
}

// new & init
impl Gfx {
    pub fn new(create_info: GfxCreateInfo) -> GfxResult<Self> {
        let _span = tracy_client::span!("Gfx::new");

        let vk_entry = unsafe { ash::Entry::load() }?;

        let surface_exts = ash_window::enumerate_required_extensions(create_info.raw_display_handle)
            .vk_check("enumerate_required_extensions")?;
        let instance = GfxInstance::new(&vk_entry, &create_info.app_name, surface_exts, create_info.validation)?;
        let debug_msger = if create_info.validation {
            Some(GfxDebugMsger::new(&vk_entry, &instance.ash_instance)?)
        } else {
            None
        };

        let surface = GfxSurface::new(
            &vk_entry,
            &instance.ash_instance,
            create_info.raw_display_handle,
            create_info.raw_window_handle,
        )?;
        let physical_device =
            GfxPhysicalDevice::new_descrete_physical_device(&instance.ash_instance, &surface.pf, surface.handle)?;

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family_index())
            .queue_priorities(&queue_priorities);
        let gfx_device = GfxDevice::new(
            &instance.ash_instance,
            &physical_device,
            std::slice::from_ref(&queue_create_info),
            create_info.validation,
        )?;
        let gfx_queue = unsafe { gfx_device.get_device_queue(physical_device.gfx_queue_family_index(), 0) };
        gfx_device.set_object_debug_name(gfx_queue, "gfx-queue");

        let allocator = GfxAllocator::new(&instance.ash_instance, physical_device.vk_handle, &gfx_device)?;

        let capacities = Self::clamp_descriptor_capacities(
            &physical_device,
            gfx_device.acceleration_structure_enabled(),
            create_info.descriptor_capacities,
        );
        let bindless_table = GfxBindlessTable::new(&gfx_device, capacities)?;

        Ok(Self {
            vk_entry,
            instance,
            debug_msger,
            surface,
            physical_device,
            gfx_device,
            gfx_queue,
            allocator,
            bindless_table,
        })
    }

    fn clamp_descriptor_capacities(
        physical_device: &GfxPhysicalDevice,
        acceleration_structure_enabled: bool,
        requested: [u32; DescriptorKind::COUNT],
    ) -> [u32; DescriptorKind::COUNT] {
        let mut capacities = requested;
        for kind in DescriptorKind::ALL {
            let limit = if kind == DescriptorKind::AccelerationStructure && !acceleration_structure_enabled {
                0
            } else {
                physical_device.update_after_bind_limit(kind.descriptor_type())
            };
            let capacity = &mut capacities[kind.index()];
            if *capacity > limit {
                log::warn!("{} descriptor capacity {} exceeds device limit, clamped to {}", kind, *capacity, limit);
                *capacity = limit;
            }
        }
        capacities
    }
}

// destroy
impl Gfx {
    /// 调用前所有由 `Gfx` 创建的对象都需要已经销毁
    pub fn destroy(self) {
        let Self {
            vk_entry: _vk_entry,
            instance,
            debug_msger,
            surface,
            physical_device: _physical_device,
            gfx_device,
            gfx_queue: _gfx_queue,
            allocator,
            bindless_table,
        } = self;

        bindless_table.destroy(&gfx_device);
        allocator.destroy();
        gfx_device.destroy();
        surface.destroy();
        if let Some(debug_msger) = debug_msger {
            debug_msger.destroy();
        }
        instance.destroy();
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_device
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn bindless_table(&self) -> &GfxBindlessTable {
        &self.bindless_table
    }

    /// clamp 之后实际可用的 descriptor 数量
    #[inline]
    pub fn descriptor_capacities(&self) -> [u32; DescriptorKind::COUNT] {
        self.bindless_table.capacities()
    }
}

impl GpuDevice for Gfx {
    fn create_fence(&mut self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.gfx_device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .vk_check("vkCreateFence")?;
        self.gfx_device.set_object_debug_name(fence, debug_name);
        Ok(fence)
    }

    fn create_semaphore(&mut self, debug_name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe { self.gfx_device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_check("vkCreateSemaphore")?;
        self.gfx_device.set_object_debug_name(semaphore, debug_name);
        Ok(semaphore)
    }

    fn wait_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        let _span = tracy_client::span!("Gfx::wait_fence");
        match unsafe { self.gfx_device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns) } {
            Err(vk::Result::TIMEOUT) => Err(GfxError::timeout("vkWaitForFences", "fence", timeout_ns)),
            result => result.vk_check("vkWaitForFences"),
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.gfx_device.reset_fences(std::slice::from_ref(&fence)) }.vk_check("vkResetFences")
    }

    fn create_command_pool(&mut self, debug_name: &str) -> GfxResult<vk::CommandPool> {
        let pool = unsafe {
            self.gfx_device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(self.physical_device.gfx_queue_family_index())
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .vk_check("vkCreateCommandPool")?;
        self.gfx_device.set_object_debug_name(pool, debug_name);
        Ok(pool)
    }

    fn allocate_command_buffer(&mut self, pool: vk::CommandPool, debug_name: &str) -> GfxResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer =
            unsafe { self.gfx_device.allocate_command_buffers(&info) }.vk_check("vkAllocateCommandBuffers")?[0];
        self.gfx_device.set_object_debug_name(command_buffer, debug_name);
        Ok(command_buffer)
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        unsafe {
            self.gfx_device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .vk_check("vkResetCommandBuffer")?;
            self.gfx_device
                .begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .vk_check("vkBeginCommandBuffer")
        }
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.gfx_device.end_command_buffer(command_buffer) }.vk_check("vkEndCommandBuffer")
    }

    fn cmd_copy_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        GfxCommandBuffer::new(&self.gfx_device, command_buffer).cmd_copy_buffer(src, dst, regions);
    }

    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()> {
        let _span = tracy_client::span!("Gfx::submit");
        let fence = submit_info.fence.unwrap_or_default();
        submit_info.with_vk_submit_info(|info| unsafe {
            self.gfx_device.queue_submit2(self.gfx_queue, std::slice::from_ref(info), fence)
        })
        .vk_check("vkQueueSubmit2")
    }

    fn queue_wait_idle(&mut self) -> GfxResult<()> {
        unsafe { self.gfx_device.queue_wait_idle(self.gfx_queue) }.vk_check("vkQueueWaitIdle")
    }

    fn device_wait_idle(&mut self) -> GfxResult<()> {
        self.gfx_device.wait_idle()
    }

    fn create_swapchain(&mut self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages> {
        let _span = tracy_client::span!("Gfx::create_swapchain");
        let pdevice = self.physical_device.vk_handle;
        let surface_capabilities = self.surface.get_capabilities(pdevice)?;

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = GfxSwapchainSettings::calculate_swapchain_extent(&surface_capabilities, desc.window_extent);
        let image_count = GfxSwapchainSettings::calculate_image_count(&surface_capabilities, desc.image_count);
        let surface_format = GfxSwapchainSettings::choose_surface_format(&self.surface.get_formats(pdevice)?)?;
        let present_mode =
            GfxSwapchainSettings::choose_present_mode(&self.surface.get_present_modes(pdevice)?, desc.present_mode);
        log::info!(
            "create swapchain: window extent {}x{}, swapchain extent {}x{}, {} images, {:?}, {:?}",
            desc.window_extent.width,
            desc.window_extent.height,
            extent.width,
            extent.height,
            image_count,
            surface_format.format,
            present_mode
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于从 draw image blit
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let swapchain = unsafe { self.gfx_device.swapchain.create_swapchain(&create_info, None) }
            .vk_check("vkCreateSwapchainKHR")?;
        self.gfx_device.set_object_debug_name(swapchain, "main");

        let images = unsafe { self.gfx_device.swapchain.get_swapchain_images(swapchain) }
            .vk_check("vkGetSwapchainImagesKHR")?;
        let view_desc = GfxImageViewDesc::new_color_2d(surface_format.format);
        let views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| self.create_image_view(*image, &view_desc, &format!("swapchain-{}", idx)))
            .collect::<GfxResult<Vec<_>>>()?;

        Ok(GfxSwapchainImages {
            swapchain,
            images,
            views,
            format: surface_format.format,
            extent,
        })
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let _span = tracy_client::span!("Gfx::acquire_next_image");
        let result = unsafe {
            self.gfx_device.swapchain.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(GfxError::timeout("vkAcquireNextImageKHR", "swapchain image", timeout_ns))
            }
            Err(e) => Err(e).vk_check("vkAcquireNextImageKHR"),
        }
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let _span = tracy_client::span!("Gfx::present");
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait_semaphore))
            .image_indices(std::slice::from_ref(&image_index))
            .swapchains(std::slice::from_ref(&swapchain));

        match unsafe { self.gfx_device.swapchain.queue_present(self.gfx_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => {
                log::warn!("swapchain present image index {} is not optimal", image_index);
                Ok(PresentOutcome::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(e).vk_check("vkQueuePresentKHR"),
        }
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<AllocatedBuffer> {
        let buffer = self.allocator.create_buffer(desc)?;
        self.gfx_device.set_debug_name(&buffer, &desc.name);
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: &AllocatedBuffer, data: &[u8]) -> GfxResult<()> {
        self.allocator.write_buffer(buffer, data)
    }

    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<AllocatedImage> {
        let image = self.allocator.create_image(desc)?;
        self.gfx_device.set_debug_name(&image, &desc.name);
        Ok(image)
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        desc: &GfxImageViewDesc,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        let view = unsafe { self.gfx_device.create_image_view(&desc.create_info(image), None) }
            .vk_check("vkCreateImageView")?;
        self.gfx_device.set_object_debug_name(view, debug_name);
        Ok(view)
    }

    fn create_sampler(&mut self, desc: &GfxSamplerDesc, debug_name: &str) -> GfxResult<vk::Sampler> {
        let sampler =
            unsafe { self.gfx_device.create_sampler(&desc.create_info(), None) }.vk_check("vkCreateSampler")?;
        self.gfx_device.set_object_debug_name(sampler, debug_name);
        Ok(sampler)
    }

    fn write_bindless(&mut self, writes: &[GfxBindlessWrite]) -> GfxResult<()> {
        let _span = tracy_client::span!("Gfx::write_bindless");
        self.bindless_table.write(&self.gfx_device, writes);
        Ok(())
    }

    fn destroy_object(&mut self, object: GpuObject) {
        let device = &self.gfx_device;
        unsafe {
            match object {
                GpuObject::Buffer(buffer) => self.allocator.destroy_buffer(buffer),
                GpuObject::Image(image) => self.allocator.destroy_image(image),
                GpuObject::ImageView(view) => device.destroy_image_view(view, None),
                GpuObject::Sampler(sampler) => device.destroy_sampler(sampler, None),
                GpuObject::Fence(fence) => device.destroy_fence(fence, None),
                GpuObject::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
                // pool 中的 command buffer 会一起释放
                GpuObject::CommandPool(pool) => device.destroy_command_pool(pool, None),
                GpuObject::Swapchain(swapchain) => device.swapchain.destroy_swapchain(swapchain, None),
                GpuObject::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                GpuObject::ShaderModule(module) => device.destroy_shader_module(module, None),
            }
        }
    }
}
