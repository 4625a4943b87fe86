use ember_gfx::gpu_device::{GpuDevice, GpuObject};

/// 执行 deinit stack 中的销毁动作
pub trait DeinitDispatcher<A> {
    fn execute(&mut self, action: A);
}

impl<A, F: FnMut(A)> DeinitDispatcher<A> for F {
    #[inline]
    fn execute(&mut self, action: A) {
        self(action)
    }
}

/// 把 `GpuObject` 交给 device 销毁
pub struct DeviceDispatcher<'a, D: GpuDevice>(pub &'a mut D);
impl<D: GpuDevice> DeinitDispatcher<GpuObject> for DeviceDispatcher<'_, D> {
    #[inline]
    fn execute(&mut self, object: GpuObject) {
        self.0.destroy_object(object);
    }
}

/// 后进先出的销毁队列
///
/// 资源创建之后立刻把对应的销毁动作 push 进来，drain 时按照创建的逆序销毁。
///
/// drain 开始时会先取出当前的全部动作，drain 过程中新 push 的动作属于下一次 drain。
pub struct DeinitStack<A> {
    actions: Vec<A>,
    name: String,
}

// new & init
impl<A> DeinitStack<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            name: name.into(),
        }
    }
}

// getters
impl<A> DeinitStack<A> {
    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// update
impl<A> DeinitStack<A> {
    #[inline]
    pub fn push(&mut self, action: A) {
        self.actions.push(action);
    }

    /// 按照 push 的逆序执行并清空
    ///
    /// # return
    /// 执行的动作数量
    pub fn drain(&mut self, dispatcher: &mut impl DeinitDispatcher<A>) -> usize {
        self.drain_with(|action, _| dispatcher.execute(action))
    }

    /// 和 `drain` 相同，但执行动作时可以访问 stack 本身
    ///
    /// 在 `f` 中 push 的动作不会在本次执行，留到下一次 drain
    pub fn drain_with(&mut self, mut f: impl FnMut(A, &mut Self)) -> usize {
        let batch = std::mem::take(&mut self.actions);
        let count = batch.len();
        if count > 0 {
            log::debug!("draining deinit stack {}: {} actions", self.name, count);
        }
        for action in batch.into_iter().rev() {
            f(action, self);
        }
        count
    }
}

impl<A> DeinitStack<A> {
    /// 提前执行满足 `pred` 的动作，按照 push 的逆序执行，其余动作保持原来的顺序
    ///
    /// 用于在运行过程中替换长期存在的对象，例如重建 swapchain
    pub fn drain_where(
        &mut self,
        mut pred: impl FnMut(&A) -> bool,
        dispatcher: &mut impl DeinitDispatcher<A>,
    ) -> usize {
        let (matched, kept): (Vec<A>, Vec<A>) = std::mem::take(&mut self.actions).into_iter().partition(|a| pred(a));
        self.actions = kept;

        let count = matched.len();
        if count > 0 {
            log::debug!("draining {} actions early from deinit stack {}", count, self.name);
        }
        for action in matched.into_iter().rev() {
            dispatcher.execute(action);
        }
        count
    }
}

impl<A> Drop for DeinitStack<A> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::error!("deinit stack {} dropped with {} pending actions", self.name, self.actions.len());
        }
    }
}
