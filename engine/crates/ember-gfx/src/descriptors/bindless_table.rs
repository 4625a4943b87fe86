use std::fmt::Display;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::device::GfxDevice,
};

/// push constant 的最大字节数，所有 pipeline 共用同一个 pipeline layout
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// bindless table 中的 binding 种类，数值就是 binding index
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorKind {
    UniformBuffer = 0,
    StorageBuffer = 1,
    CombinedSampler = 2,
    StorageImage = 3,
    AccelerationStructure = 4,
}
impl DescriptorKind {
    pub const COUNT: usize = 5;
    pub const ALL: [DescriptorKind; Self::COUNT] = [
        DescriptorKind::UniformBuffer,
        DescriptorKind::StorageBuffer,
        DescriptorKind::CombinedSampler,
        DescriptorKind::StorageImage,
        DescriptorKind::AccelerationStructure,
    ];

    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::CombinedSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }
}
impl Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DescriptorKind::UniformBuffer => "uniform-buffer",
            DescriptorKind::StorageBuffer => "storage-buffer",
            DescriptorKind::CombinedSampler => "combined-sampler",
            DescriptorKind::StorageImage => "storage-image",
            DescriptorKind::AccelerationStructure => "acceleration-structure",
        };
        write!(f, "{}", name)
    }
}

/// 写入 bindless table 的资源描述
///
/// ash 的 descriptor info 没有实现 `PartialEq`，需要比较时逐个字段比较
#[derive(Copy, Clone, Debug)]
pub enum BindingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
    AccelerationStructure(vk::AccelerationStructureKHR),
}

/// 一次待写入的 descriptor：kind 对应 binding，index 对应 array element
#[derive(Copy, Clone, Debug)]
pub struct GfxBindlessWrite {
    pub kind: DescriptorKind,
    pub index: u32,
    pub info: BindingInfo,
}

/// 全局唯一的 bindless descriptor set
///
/// 5 个 binding，每个都是 `PARTIALLY_BOUND | UPDATE_AFTER_BIND` 的数组，所有 shader stage 可见。
/// 同时持有所有 pipeline 共用的 pipeline layout（set 0 + 128 字节 push constant）。
pub struct GfxBindlessTable {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,

    capacities: [u32; DescriptorKind::COUNT],
}

// new & init
impl GfxBindlessTable {
    /// capacity 为 0 的 kind 不会出现在 layout 中
    pub fn new(device: &GfxDevice, capacities: [u32; DescriptorKind::COUNT]) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxBindlessTable::new");

        let enabled_kinds = DescriptorKind::ALL.into_iter().filter(|kind| capacities[kind.index()] > 0).collect_vec();

        let bindings = enabled_kinds
            .iter()
            .map(|kind| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(kind.binding())
                    .descriptor_type(kind.descriptor_type())
                    .descriptor_count(capacities[kind.index()])
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect_vec();
        let binding_flags = vec![
            vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;
            bindings.len()
        ];
        let mut binding_flags_ci =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut binding_flags_ci);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_ci, None) }
            .vk_check("vkCreateDescriptorSetLayout")?;
        device.set_object_debug_name(layout, "bindless-layout");

        let pool_sizes = enabled_kinds
            .iter()
            .map(|kind| vk::DescriptorPoolSize {
                ty: kind.descriptor_type(),
                descriptor_count: capacities[kind.index()],
            })
            .collect_vec();
        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_ci, None) }.vk_check("vkCreateDescriptorPool")?;
        device.set_object_debug_name(pool, "bindless-pool");

        let set_alloc_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(std::slice::from_ref(&layout));
        let set = unsafe { device.allocate_descriptor_sets(&set_alloc_info) }.vk_check("vkAllocateDescriptorSets")?[0];
        device.set_object_debug_name(set, "bindless-set");

        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        };
        let pipeline_layout_ci = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(std::slice::from_ref(&layout))
            .push_constant_ranges(std::slice::from_ref(&push_constant_range));
        let pipeline_layout =
            unsafe { device.create_pipeline_layout(&pipeline_layout_ci, None) }.vk_check("vkCreatePipelineLayout")?;
        device.set_object_debug_name(pipeline_layout, "bindless-pipeline-layout");

        log::info!("bindless table created, capacities: {:?}", capacities);
        Ok(Self {
            layout,
            pool,
            set,
            pipeline_layout,
            capacities,
        })
    }
}

// destroy
impl GfxBindlessTable {
    pub fn destroy(self, device: &GfxDevice) {
        log::info!("destroying bindless table");
        unsafe {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            // set 随 pool 一起释放
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

// getters
impl GfxBindlessTable {
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub fn capacities(&self) -> [u32; DescriptorKind::COUNT] {
        self.capacities
    }
}

// update
impl GfxBindlessTable {
    /// 一次 `vkUpdateDescriptorSets` 写入所有的 descriptor
    ///
    /// UPDATE_AFTER_BIND：即使 set 已经被之前的 command buffer 绑定，也可以写入没有被使用的 slot
    pub fn write(&self, device: &GfxDevice, writes: &[GfxBindlessWrite]) {
        if writes.is_empty() {
            return;
        }

        // vk::WriteDescriptorSet 引用这些数组，需要保证它们在 update 期间有效
        let infos = writes
            .iter()
            .map(|write| match write.info {
                BindingInfo::Buffer(info) => WriteInfo::Buffer([info]),
                BindingInfo::Image(info) => WriteInfo::Image([info]),
                BindingInfo::AccelerationStructure(handle) => WriteInfo::AccelerationStructure([handle]),
            })
            .collect_vec();
        let mut as_writes = infos
            .iter()
            .map(|info| match info {
                WriteInfo::AccelerationStructure(handles) => {
                    Some(vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(handles))
                }
                _ => None,
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .zip(infos.iter())
            .zip(as_writes.iter_mut())
            .map(|((write, info), as_write)| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(write.kind.binding())
                    .dst_array_element(write.index)
                    .descriptor_type(write.kind.descriptor_type());
                match (info, as_write) {
                    (WriteInfo::Buffer(buffer_info), _) => vk_write.buffer_info(buffer_info),
                    (WriteInfo::Image(image_info), _) => vk_write.image_info(image_info),
                    (WriteInfo::AccelerationStructure(_), Some(as_write)) => {
                        vk_write.descriptor_count(1).push_next(as_write)
                    }
                    (WriteInfo::AccelerationStructure(_), None) => unreachable!(),
                }
            })
            .collect_vec();

        unsafe {
            device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

enum WriteInfo {
    Buffer([vk::DescriptorBufferInfo; 1]),
    Image([vk::DescriptorImageInfo; 1]),
    AccelerationStructure([vk::AccelerationStructureKHR; 1]),
}
