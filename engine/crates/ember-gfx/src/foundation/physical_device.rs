use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::debug_messenger::DebugType,
};

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// update after bind 相关的 descriptor 数量上限
    pub(crate) descriptor_indexing_props: vk::PhysicalDeviceDescriptorIndexingProperties<'static>,

    /// 同时支持 graphics，compute，transfer 以及 present 的 queue family
    pub(crate) gfx_queue_family_index: u32,

    /// 是否支持 `VK_KHR_acceleration_structure`
    pub(crate) acceleration_structure_supported: bool,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    ///
    /// 只考虑有 gfx queue family 且该 family 可以向 surface present 的显卡
    pub fn new_descrete_physical_device(
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.vk_check("vkEnumeratePhysicalDevices")?;

        let candidates = pdevices
            .into_iter()
            .filter_map(|pdevice| Self::new(pdevice, instance, surface_pf, surface))
            .collect_vec();

        candidates
            .into_iter()
            // 优先使用独立显卡
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .ok_or_else(|| GfxError::NoSuitableDevice("no gpu with a graphics queue that can present".to_string()))
    }

    fn new(
        pdevice: vk::PhysicalDevice,
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<Self> {
        unsafe {
            let mut descriptor_indexing_props = vk::PhysicalDeviceDescriptorIndexingProperties::default();
            let mut pdevice_props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut descriptor_indexing_props);
            instance.get_physical_device_properties2(pdevice, &mut pdevice_props2);
            let basic_props = pdevice_props2.properties;
            descriptor_indexing_props.p_next = std::ptr::null_mut();

            let physical_device_name = CStr::from_ptr(basic_props.device_name.as_ptr());
            log::info!("found gpu: {:?}", physical_device_name);

            let device_extensions = instance.enumerate_device_extension_properties(pdevice).ok()?;
            let has_ext = |name: &CStr| {
                device_extensions.iter().any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name))
            };
            if !has_ext(ash::khr::swapchain::NAME) {
                log::info!("skip gpu {:?}: no swapchain support", physical_device_name);
                return None;
            }
            let acceleration_structure_supported = has_ext(ash::khr::acceleration_structure::NAME)
                && has_ext(ash::khr::deferred_host_operations::NAME);

            // 全能的 Queue：graphics, compute, transfer，并且可以 present
            let queue_family_props = instance.get_physical_device_queue_family_properties(pdevice);
            let gfx_queue_family_index = queue_family_props
                .iter()
                .enumerate()
                .find(|(family_idx, props)| {
                    props
                        .queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
                        && surface_pf
                            .get_physical_device_surface_support(pdevice, *family_idx as u32, surface)
                            .unwrap_or(false)
                })
                .map(|(family_idx, _)| family_idx as u32)?;

            Some(Self {
                vk_handle: pdevice,
                basic_props,
                descriptor_indexing_props,
                gfx_queue_family_index,
                acceleration_structure_supported,
            })
        }
    }
}

// getters
impl GfxPhysicalDevice {
    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn gfx_queue_family_index(&self) -> u32 {
        self.gfx_queue_family_index
    }

    #[inline]
    pub fn acceleration_structure_supported(&self) -> bool {
        self.acceleration_structure_supported
    }

    /// update after bind 模式下，每种 descriptor 在整个 set 中的数量上限
    pub fn update_after_bind_limit(&self, descriptor_type: vk::DescriptorType) -> u32 {
        let props = &self.descriptor_indexing_props;
        match descriptor_type {
            vk::DescriptorType::UNIFORM_BUFFER => props.max_descriptor_set_update_after_bind_uniform_buffers,
            vk::DescriptorType::STORAGE_BUFFER => props.max_descriptor_set_update_after_bind_storage_buffers,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => props
                .max_descriptor_set_update_after_bind_sampled_images
                .min(props.max_descriptor_set_update_after_bind_samplers),
            vk::DescriptorType::STORAGE_IMAGE => props.max_descriptor_set_update_after_bind_storage_images,
            // acceleration structure 的上限不在 descriptor indexing props 中，按 storage buffer 估计
            _ => props.max_descriptor_set_update_after_bind_storage_buffers,
        }
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
