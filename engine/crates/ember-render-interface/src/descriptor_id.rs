use std::{fmt::Debug, hash::Hash, marker::PhantomData};

use ash::vk;
use ember_gfx::descriptors::bindless_table::{BindingInfo, DescriptorKind};

/// 一种 bindless binding 的类型信息：对应的 binding，以及注册时需要提供的资源描述
pub trait BindingKind: Copy + Debug + 'static {
    const KIND: DescriptorKind;
    type Info;

    fn binding_info(info: Self::Info) -> BindingInfo;
}

/// 各个 binding 的标记类型
pub mod kind {
    use super::*;

    #[derive(Copy, Clone, Debug)]
    pub struct UniformBuffer;
    #[derive(Copy, Clone, Debug)]
    pub struct StorageBuffer;
    #[derive(Copy, Clone, Debug)]
    pub struct CombinedSampler;
    #[derive(Copy, Clone, Debug)]
    pub struct StorageImage;
    #[derive(Copy, Clone, Debug)]
    pub struct AccelerationStructure;

    impl BindingKind for UniformBuffer {
        const KIND: DescriptorKind = DescriptorKind::UniformBuffer;
        type Info = vk::DescriptorBufferInfo;

        fn binding_info(info: Self::Info) -> BindingInfo {
            BindingInfo::Buffer(info)
        }
    }

    impl BindingKind for StorageBuffer {
        const KIND: DescriptorKind = DescriptorKind::StorageBuffer;
        type Info = vk::DescriptorBufferInfo;

        fn binding_info(info: Self::Info) -> BindingInfo {
            BindingInfo::Buffer(info)
        }
    }

    impl BindingKind for CombinedSampler {
        const KIND: DescriptorKind = DescriptorKind::CombinedSampler;
        type Info = SampledImageInfo;

        fn binding_info(info: Self::Info) -> BindingInfo {
            BindingInfo::Image(vk::DescriptorImageInfo {
                sampler: info.sampler,
                image_view: info.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
        }
    }

    /// storage image 在 shader 中读写时处于 GENERAL layout
    impl BindingKind for StorageImage {
        const KIND: DescriptorKind = DescriptorKind::StorageImage;
        type Info = vk::ImageView;

        fn binding_info(view: Self::Info) -> BindingInfo {
            BindingInfo::Image(vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::GENERAL,
            })
        }
    }

    impl BindingKind for AccelerationStructure {
        const KIND: DescriptorKind = DescriptorKind::AccelerationStructure;
        type Info = vk::AccelerationStructureKHR;

        fn binding_info(info: Self::Info) -> BindingInfo {
            BindingInfo::AccelerationStructure(info)
        }
    }
}

/// combined image sampler 需要的 view 和 sampler
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SampledImageInfo {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// bindless table 中某个 binding 的数组下标，shader 通过 push constant 等方式拿到这个下标
///
/// 不同 binding 的 id 是相互独立的命名空间，类型参数保证不会混用
pub struct DescriptorId<K: BindingKind> {
    index: u32,
    _kind: PhantomData<K>,
}

pub type UniformBufferId = DescriptorId<kind::UniformBuffer>;
pub type StorageBufferId = DescriptorId<kind::StorageBuffer>;
pub type CombinedSamplerId = DescriptorId<kind::CombinedSampler>;
pub type StorageImageId = DescriptorId<kind::StorageImage>;
pub type AccelerationStructureId = DescriptorId<kind::AccelerationStructure>;

// new & init
impl<K: BindingKind> DescriptorId<K> {
    pub const INVALID: Self = Self::new(u32::MAX);

    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self {
            index,
            _kind: PhantomData,
        }
    }
}

// getters
impl<K: BindingKind> DescriptorId<K> {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn kind(&self) -> DescriptorKind {
        K::KIND
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl<K: BindingKind> Clone for DescriptorId<K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K: BindingKind> Copy for DescriptorId<K> {}
impl<K: BindingKind> PartialEq for DescriptorId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<K: BindingKind> Eq for DescriptorId<K> {}
impl<K: BindingKind> Hash for DescriptorId<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<K: BindingKind> Debug for DescriptorId<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}#{}", K::KIND, self.index)
        } else {
            write!(f, "{}#invalid", K::KIND)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_invalid_id() {
        assert!(!StorageImageId::INVALID.is_valid());
        assert_eq!(StorageImageId::INVALID.index(), u32::MAX);
        assert_eq!(format!("{:?}", StorageImageId::INVALID), "storage-image#invalid");
        assert_eq!(format!("{:?}", StorageBufferId::new(3)), "storage-buffer#3");
    }

    #[test]
    fn test_storage_image_binding_info_uses_general_layout() {
        let view = vk::ImageView::from_raw(9);
        match kind::StorageImage::binding_info(view) {
            BindingInfo::Image(info) => {
                assert_eq!(info.image_view, view);
                assert_eq!(info.image_layout, vk::ImageLayout::GENERAL);
            }
            other => panic!("unexpected binding info {other:?}"),
        }
    }

    #[test]
    fn test_sampler_binding_info() {
        let info = SampledImageInfo {
            view: vk::ImageView::from_raw(1),
            sampler: vk::Sampler::from_raw(2),
        };
        match kind::CombinedSampler::binding_info(info) {
            BindingInfo::Image(image_info) => {
                assert_eq!(image_info.sampler, info.sampler);
                assert_eq!(image_info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            }
            other => panic!("unexpected binding info {other:?}"),
        }
    }
}
