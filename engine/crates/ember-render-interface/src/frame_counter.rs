use std::{fmt::Display, ops::Deref};

/// frame context 的槽位，显示为 A、B、C...
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameLabel(usize);
impl FrameLabel {
    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        Self(idx)
    }
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl Display for FrameLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 26 {
            write!(f, "{}", (b'A' + self.0 as u8) as char)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    /// 同时在 GPU 上执行的帧数
    overlap: usize,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, overlap: usize) -> Self {
        debug_assert!(overlap > 0);
        Self {
            frame_id: init_frame_id,
            overlap,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }
    #[inline]
    pub fn frame_labels(&self) -> impl Iterator<Item = FrameLabel> {
        (0..self.overlap).map(FrameLabel::from_usize)
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize((self.frame_id % self.overlap as u64) as usize)
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}
