use std::path::Path;

use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::device::GfxDevice,
};

/// 从 spv 文件创建 shader module
///
/// 读取失败或者 spv 不合法都会返回错误，由调用方决定是否致命
pub fn create_shader_module(device: &GfxDevice, path: &Path) -> GfxResult<vk::ShaderModule> {
    let shader_load_error = |source| GfxError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(shader_load_error)?;
    let shader_code = ash::util::read_spv(&mut file).map_err(shader_load_error)?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&shader_code);
    let shader_module =
        unsafe { device.create_shader_module(&shader_module_info, None) }.vk_check("vkCreateShaderModule")?;
    device.set_object_debug_name(shader_module, path.to_string_lossy());

    Ok(shader_module)
}

/// 使用全局 pipeline layout 创建 compute pipeline，入口函数为 `main`
pub fn create_compute_pipeline(
    device: &GfxDevice,
    pipeline_layout: vk::PipelineLayout,
    shader_module: vk::ShaderModule,
    debug_name: &str,
) -> GfxResult<vk::Pipeline> {
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(c"main");
    let pipeline_ci = vk::ComputePipelineCreateInfo::default().layout(pipeline_layout).stage(stage_info);

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
    }
    .map_err(|(_, e)| e)
    .vk_check("vkCreateComputePipelines")?;
    let pipeline = pipelines[0];
    device.set_object_debug_name(pipeline, debug_name);

    Ok(pipeline)
}
