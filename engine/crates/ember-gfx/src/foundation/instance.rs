use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::debug_messenger::GfxDebugMsger,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct GfxInstance {
    /// 仅仅是函数指针，以及一个裸的 handle
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// # param
    /// * extra_instance_exts - 例如 surface 所需的 extensions
    /// * validation - 是否开启 `VK_LAYER_KHRONOS_validation` 以及 debug utils
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        extra_instance_exts: &[*const c_char],
        validation: bool,
    ) -> GfxResult<Self> {
        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3)
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"ember")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let extra_exts = extra_instance_exts.iter().map(|ext| unsafe { CStr::from_ptr(*ext) }).collect_vec();
        let enabled_extensions = Self::get_extensions(vk_entry, &extra_exts, validation)?;
        let mut enabled_extensions_str = String::new();
        for ext in &enabled_extensions {
            enabled_extensions_str.push_str(&format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) }));
        }
        log::info!("instance extensions: {}", enabled_extensions_str);

        let enabled_layers = Self::get_layers(vk_entry, validation)?;
        log::info!("instance layers: {:?}", enabled_layers.iter().map(|l| unsafe { CStr::from_ptr(*l) }).collect_vec());

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers);

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        if validation {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let ash_instance = unsafe { vk_entry.create_instance(&instance_ci, None) }.vk_check("vkCreateInstance")?;

        Ok(Self { ash_instance })
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }
}

// 构造过程
impl GfxInstance {
    /// instance 所需的，且受支持的 extension
    fn get_extensions(
        vk_entry: &ash::Entry,
        extra_instance_exts: &[&CStr],
        validation: bool,
    ) -> GfxResult<Vec<*const c_char>> {
        let all_ext_props =
            unsafe { vk_entry.enumerate_instance_extension_properties(None) }.vk_check("vkEnumerateInstanceExtensionProperties")?;

        let mut required: Vec<&CStr> = extra_instance_exts.to_vec();
        if validation {
            // debug messenger 以及为 vulkan object 设置 debug name
            required.push(ash::ext::debug_utils::NAME);
        }

        let mut enabled_extensions: HashSet<&CStr> = HashSet::new();
        for ext in required {
            let supported = all_ext_props
                .iter()
                .any(|supported_ext| supported_ext.extension_name_as_c_str().is_ok_and(|name| name == ext));
            if !supported {
                return Err(GfxError::MissingInstanceSupport {
                    kind: "extension",
                    name: ext.to_string_lossy().into_owned(),
                });
            }
            enabled_extensions.insert(ext);
        }

        Ok(enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// instance 所需的所有 layers
    fn get_layers(vk_entry: &ash::Entry, validation: bool) -> GfxResult<Vec<*const c_char>> {
        if !validation {
            return Ok(Vec::new());
        }

        let all_layer_props =
            unsafe { vk_entry.enumerate_instance_layer_properties() }.vk_check("vkEnumerateInstanceLayerProperties")?;
        let supported = all_layer_props
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if !supported {
            return Err(GfxError::MissingInstanceSupport {
                kind: "layer",
                name: VALIDATION_LAYER.to_string_lossy().into_owned(),
            });
        }

        Ok(vec![VALIDATION_LAYER.as_ptr()])
    }
}
