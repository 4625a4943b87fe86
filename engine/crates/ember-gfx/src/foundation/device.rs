use std::{
    ffi::{CStr, CString},
    ops::Deref,
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, physical_device::GfxPhysicalDevice},
};

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及各种扩展的函数指针。
///
/// # 扩展支持
/// - Swapchain (KHR)
/// - Acceleration Structure (KHR)，仅在 gpu 支持时开启
/// - Debug Utils (EXT)，仅在开启 validation 时可用
///
/// synchronization2 以及 dynamic rendering 都已经是 core-1.3.0
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: ash::khr::swapchain::Device,
    /// 调试工具扩展 API
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Device>,

    acceleration_structure_enabled: bool,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: &GfxPhysicalDevice,
        queue_create_info: &[vk::DeviceQueueCreateInfo],
        debug_utils: bool,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        let acceleration_structure_enabled = pdevice.acceleration_structure_supported();

        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts(acceleration_structure_enabled);
        log::info!("device exts: {:?}", device_exts);
        let device_exts = device_exts.iter().map(|e| e.as_ptr()).collect_vec();

        // device 所需的所有 features
        let mut all_features = vk::PhysicalDeviceFeatures2::default();
        let mut physical_device_ext_features = Self::physical_device_extra_features(acceleration_structure_enabled);
        unsafe {
            physical_device_ext_features.iter_mut().for_each(|f| {
                let ptr = <*mut dyn vk::ExtendsPhysicalDeviceFeatures2>::cast::<vk::BaseOutStructure>(f.as_mut());
                (*ptr).p_next = all_features.p_next as _;
                all_features.p_next = ptr as _;
            });
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_info)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe { instance.create_device(pdevice.vk_handle, &device_create_info, None) }
            .vk_check("vkCreateDevice")?;

        let swapchain = ash::khr::swapchain::Device::new(instance, &device);
        let debug_utils = debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Ok(Self {
            device,
            swapchain,
            debug_utils,
            acceleration_structure_enabled,
        })
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(self) {
        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// 创建过程的辅助函数
impl GfxDevice {
    /// 必要的 physical device extension features
    fn physical_device_extra_features(acceleration_structure: bool) -> Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> {
        let mut features: Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> = vec![
            Box::new(
                vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true).synchronization2(true),
            ),
            Box::new(
                vk::PhysicalDeviceVulkan12Features::default()
                    .buffer_device_address(true)
                    // bindless
                    .descriptor_indexing(true)
                    .descriptor_binding_partially_bound(true) // 即使一些 descriptor 是 invalid
                    .runtime_descriptor_array(true)
                    .descriptor_binding_uniform_buffer_update_after_bind(true)
                    .descriptor_binding_storage_buffer_update_after_bind(true)
                    .descriptor_binding_sampled_image_update_after_bind(true)
                    .descriptor_binding_storage_image_update_after_bind(true),
            ),
        ];
        if acceleration_structure {
            features.push(Box::new(
                vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                    .acceleration_structure(true)
                    .descriptor_binding_acceleration_structure_update_after_bind(true),
            ));
        }
        features
    }

    /// 必要的 device extensions
    fn basic_device_exts(acceleration_structure: bool) -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME];

        if acceleration_structure {
            exts.append(&mut vec![
                ash::khr::acceleration_structure::NAME,
                // acceleration structure 依赖的 ext
                ash::khr::deferred_host_operations::NAME,
            ]);
        }

        exts
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }

    #[inline]
    pub fn acceleration_structure_enabled(&self) -> bool {
        self.acceleration_structure_enabled
    }
}

// tools
impl GfxDevice {
    /// 未开启 debug utils 时什么都不做
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            log::warn!("debug name contains interior nul: {:?}", name.as_ref());
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        let debug_name = format!("{}::{}", T::debug_type_name(), name.as_ref());
        self.set_object_debug_name(handle.vk_handle(), debug_name);
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_check("vkDeviceWaitIdle")
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
