use ember_gfx::{
    descriptors::bindless_table::{BindingInfo, DescriptorKind, GfxBindlessWrite},
    gpu_device::GpuDevice,
};

use crate::{
    descriptor_id::{BindingKind, DescriptorId},
    error::{FatalError, FatalResult},
};

/// 还没有写入 bindless table 的 descriptor
pub type PendingWrite = GfxBindlessWrite;

/// 已经 release，但 GPU 可能还在使用的 id
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct PendingRelease {
    index: u32,
    /// 最后一个可能引用这个 id 的帧
    retire_frame: u64,
}

/// 单个 binding 的 id 分配状态
#[derive(Debug)]
struct IdTable {
    kind: DescriptorKind,
    capacity: u32,
    /// 从未分配过的最小 id
    next_id: u32,
    /// 可以直接复用的 id，后进先出
    free_ids: Vec<u32>,
    /// 下标为 id，长度等于 next_id
    live: Vec<bool>,
    /// 按 release 的顺序排列
    pending_releases: Vec<PendingRelease>,
}

impl IdTable {
    fn new(kind: DescriptorKind, capacity: u32) -> Self {
        Self {
            kind,
            capacity,
            next_id: 0,
            free_ids: Vec::new(),
            live: Vec::new(),
            pending_releases: Vec::new(),
        }
    }

    /// 优先复用 free list，否则分配新的 id
    fn allocate(&mut self) -> FatalResult<u32> {
        let index = match self.free_ids.pop() {
            Some(index) => index,
            None => {
                if self.next_id >= self.capacity {
                    return Err(FatalError::DescriptorCapacityExceeded {
                        kind: self.kind,
                        capacity: self.capacity,
                    });
                }
                let index = self.next_id;
                self.next_id += 1;
                self.live.push(false);
                index
            }
        };
        self.live[index as usize] = true;
        Ok(index)
    }

    fn release(&mut self, index: u32, retire_frame: Option<u64>) -> FatalResult<()> {
        match self.live.get_mut(index as usize) {
            Some(live) if *live => *live = false,
            _ => {
                return Err(FatalError::DescriptorNotLive {
                    kind: self.kind,
                    index,
                });
            }
        }

        match retire_frame {
            Some(retire_frame) => self.pending_releases.push(PendingRelease { index, retire_frame }),
            // 没有任何帧提交过，GPU 不可能引用这个 id
            None => self.free_ids.push(index),
        }
        Ok(())
    }

    fn reclaim(&mut self, completed_frame: u64) -> usize {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_releases)
            .into_iter()
            .partition(|release| release.retire_frame <= completed_frame);
        self.pending_releases = waiting;
        self.free_ids.extend(ready.iter().map(|release| release.index));
        ready.len()
    }

    fn live_count(&self) -> usize {
        self.live.iter().filter(|live| **live).count()
    }
}

/// 全局 bindless table 的 id 分配器
///
/// 每种 binding 都有独立的 id 空间。id 只增不减，不会重新编号；release 的 id 需要等到
/// 引用它的帧在 GPU 上执行完成（`reclaim`）之后才能再次分配。
///
/// 注册产生的写入先放在 pending 队列中，每帧录制命令之前通过 `flush_pending` 一次性写入。
///
/// 只能在渲染线程中使用。
pub struct BindlessRegistry {
    tables: [IdTable; DescriptorKind::COUNT],
    pending_writes: Vec<PendingWrite>,
}

// new & init
impl BindlessRegistry {
    /// capacities 按照 `DescriptorKind` 的顺序排列，应当和 bindless table 创建时的数量一致
    pub fn new(capacities: [u32; DescriptorKind::COUNT]) -> Self {
        Self {
            tables: DescriptorKind::ALL.map(|kind| IdTable::new(kind, capacities[kind.index()])),
            pending_writes: Vec::new(),
        }
    }
}

// getters
impl BindlessRegistry {
    #[inline]
    pub fn capacity(&self, kind: DescriptorKind) -> u32 {
        self.tables[kind.index()].capacity
    }

    pub fn live_count(&self, kind: DescriptorKind) -> usize {
        self.tables[kind.index()].live_count()
    }

    #[inline]
    pub fn pending_release_count(&self, kind: DescriptorKind) -> usize {
        self.tables[kind.index()].pending_releases.len()
    }

    #[inline]
    pub fn pending_write_count(&self) -> usize {
        self.pending_writes.len()
    }

    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        !self.pending_writes.is_empty()
    }

    pub fn is_live<K: BindingKind>(&self, id: DescriptorId<K>) -> bool {
        self.tables[K::KIND.index()].live.get(id.index() as usize).copied().unwrap_or(false)
    }
}

// update
impl BindlessRegistry {
    /// 为资源分配一个 id，并加入 pending 写入队列
    ///
    /// 超过容量是配置错误，返回 `FatalError::DescriptorCapacityExceeded`
    pub fn register<K: BindingKind>(&mut self, info: K::Info) -> FatalResult<DescriptorId<K>> {
        let index = self.register_binding(K::KIND, K::binding_info(info))?;
        Ok(DescriptorId::new(index))
    }

    fn register_binding(&mut self, kind: DescriptorKind, info: BindingInfo) -> FatalResult<u32> {
        let index = self.tables[kind.index()].allocate()?;
        self.pending_writes.push(PendingWrite { kind, index, info });
        log::trace!("register {} descriptor {}", kind, index);
        Ok(index)
    }

    /// 释放 id
    ///
    /// `retire_frame` 是最后一个可能引用这个 id 的帧，该帧完成之后 `reclaim` 才会回收 id。
    /// `None` 表示还没有提交过任何帧，id 立即可以复用。
    pub fn release<K: BindingKind>(&mut self, id: DescriptorId<K>, retire_frame: Option<u64>) -> FatalResult<()> {
        self.tables[K::KIND.index()].release(id.index(), retire_frame)?;
        log::trace!("release {:?}, retire frame {:?}", id, retire_frame);
        Ok(())
    }

    /// `completed_frame` 以及之前的帧都已经在 GPU 上执行完成，回收这些帧 release 的 id
    ///
    /// 回收的 id 按 release 的顺序进入 free list，因此最后 release 的 id 最先被复用
    ///
    /// # return
    /// 回收的 id 数量
    pub fn reclaim(&mut self, completed_frame: u64) -> usize {
        let count: usize = self.tables.iter_mut().map(|table| table.reclaim(completed_frame)).sum();
        if count > 0 {
            log::debug!("reclaimed {} descriptor ids (completed frame {})", count, completed_frame);
        }
        count
    }

    /// 将 pending 的写入一次性提交到 bindless table，并清空队列
    ///
    /// 必须在录制引用这些 id 的命令之前调用
    ///
    /// # return
    /// 写入的 descriptor 数量
    pub fn flush_pending<D: GpuDevice>(&mut self, device: &mut D) -> FatalResult<usize> {
        if self.pending_writes.is_empty() {
            return Ok(0);
        }

        let writes = std::mem::take(&mut self.pending_writes);
        device.write_bindless(&writes)?;
        log::debug!("flushed {} bindless writes", writes.len());
        Ok(writes.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ash::vk::{self, Handle};

    use super::*;
    use crate::{
        descriptor_id::{StorageBufferId, StorageImageId, kind},
        test_utils::mock_device::MockDevice,
    };

    fn registry() -> BindlessRegistry {
        BindlessRegistry::new([16, 16, 16, 16, 0])
    }

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_lifo_reuse_before_grow() {
        let mut registry = registry();
        let ids: Vec<StorageImageId> =
            (0..5).map(|i| registry.register::<kind::StorageImage>(view(i + 1)).unwrap()).collect();
        assert_eq!(ids.iter().map(|id| id.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

        registry.release(ids[1], None).unwrap();
        registry.release(ids[3], None).unwrap();

        let a = registry.register::<kind::StorageImage>(view(10)).unwrap();
        let b = registry.register::<kind::StorageImage>(view(11)).unwrap();
        assert_eq!(a.index(), 3);
        assert_eq!(b.index(), 1);

        let c = registry.register::<kind::StorageImage>(view(12)).unwrap();
        assert_eq!(c.index(), 5);
    }

    #[test]
    fn test_released_id_waits_for_retire_frame() {
        let mut registry = registry();
        let id = registry.register::<kind::StorageImage>(view(1)).unwrap();
        registry.release(id, Some(7)).unwrap();
        assert_eq!(registry.pending_release_count(DescriptorKind::StorageImage), 1);

        // 第 7 帧还没有完成，只能分配新 id
        assert_eq!(registry.reclaim(6), 0);
        let fresh = registry.register::<kind::StorageImage>(view(2)).unwrap();
        assert_eq!(fresh.index(), 1);

        assert_eq!(registry.reclaim(7), 1);
        let reused = registry.register::<kind::StorageImage>(view(3)).unwrap();
        assert_eq!(reused.index(), 0);
    }

    #[test]
    fn test_reclaim_keeps_release_order() {
        let mut registry = registry();
        let a = registry.register::<kind::StorageImage>(view(1)).unwrap();
        let b = registry.register::<kind::StorageImage>(view(2)).unwrap();
        registry.release(a, Some(3)).unwrap();
        registry.release(b, Some(3)).unwrap();
        registry.reclaim(3);

        // b 最后 release，最先复用
        assert_eq!(registry.register::<kind::StorageImage>(view(3)).unwrap().index(), b.index());
        assert_eq!(registry.register::<kind::StorageImage>(view(4)).unwrap().index(), a.index());
    }

    #[test]
    fn test_kinds_have_separate_namespaces() {
        let mut registry = registry();
        let image = registry.register::<kind::StorageImage>(view(1)).unwrap();
        let buffer: StorageBufferId =
            registry.register::<kind::StorageBuffer>(vk::DescriptorBufferInfo::default()).unwrap();
        assert_eq!(image.index(), 0);
        assert_eq!(buffer.index(), 0);
        assert_eq!(registry.live_count(DescriptorKind::StorageImage), 1);
        assert_eq!(registry.live_count(DescriptorKind::StorageBuffer), 1);
    }

    #[test]
    fn test_release_not_live_is_error() {
        let mut registry = registry();
        let id = registry.register::<kind::StorageImage>(view(1)).unwrap();
        registry.release(id, None).unwrap();

        assert!(matches!(
            registry.release(id, None),
            Err(FatalError::DescriptorNotLive {
                kind: DescriptorKind::StorageImage,
                index: 0
            })
        ));
        assert!(registry.release(StorageImageId::INVALID, None).is_err());
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut registry = BindlessRegistry::new([0, 0, 0, 2, 0]);
        registry.register::<kind::StorageImage>(view(1)).unwrap();
        registry.register::<kind::StorageImage>(view(2)).unwrap();

        let err = registry.register::<kind::StorageImage>(view(3)).unwrap_err();
        assert!(matches!(
            err,
            FatalError::DescriptorCapacityExceeded {
                kind: DescriptorKind::StorageImage,
                capacity: 2
            }
        ));
    }

    #[test]
    fn test_zero_capacity_rejects_first_register() {
        let mut registry = registry();
        let err = registry
            .register::<kind::AccelerationStructure>(vk::AccelerationStructureKHR::from_raw(1))
            .unwrap_err();
        assert!(matches!(err, FatalError::DescriptorCapacityExceeded { capacity: 0, .. }));
        assert!(!registry.has_pending_writes());
    }

    #[test]
    fn test_flush_pending_writes_once() {
        let mut device = MockDevice::new();
        let mut registry = registry();

        for i in 0..3 {
            registry.register::<kind::StorageImage>(view(i + 1)).unwrap();
        }
        registry.register::<kind::UniformBuffer>(vk::DescriptorBufferInfo::default()).unwrap();
        assert_eq!(registry.pending_write_count(), 4);

        assert_eq!(registry.flush_pending(&mut device).unwrap(), 4);
        assert!(!registry.has_pending_writes());
        assert_eq!(device.bindless_write_batches(), vec![4]);

        // 空队列不会产生写入
        assert_eq!(registry.flush_pending(&mut device).unwrap(), 0);
        assert_eq!(device.bindless_write_batches(), vec![4]);

        registry.register::<kind::StorageImage>(view(9)).unwrap();
        assert_eq!(registry.flush_pending(&mut device).unwrap(), 1);
        assert_eq!(device.bindless_write_batches(), vec![4, 1]);
    }

    /// 随机的 register/release 序列中，同一时刻不存在两个持有相同 id 的资源
    #[test]
    fn test_no_duplicate_live_ids() {
        let mut registry = BindlessRegistry::new([0, 0, 0, 64, 0]);
        let mut live: Vec<StorageImageId> = Vec::new();
        let mut completed = 0_u64;

        // 线性同余，保证结果可复现
        let mut seed = 0x2545_f491_u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for frame in 0..2000_u64 {
            match next() % 3 {
                0 | 1 if live.len() < 48 => {
                    let id = registry.register::<kind::StorageImage>(view(frame + 1)).unwrap();
                    live.push(id);
                }
                _ if !live.is_empty() => {
                    let victim = live.swap_remove(next() as usize % live.len());
                    registry.release(victim, Some(frame)).unwrap();
                }
                _ => {}
            }
            if frame % 5 == 0 {
                completed = frame.saturating_sub(2).max(completed);
                registry.reclaim(completed);
            }

            let unique: HashSet<u32> = live.iter().map(|id| id.index()).collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(registry.live_count(DescriptorKind::StorageImage), live.len());
        }
    }
}
