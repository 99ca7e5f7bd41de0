//! 执行编译结果
//!
//! 按执行顺序为每个 Pass 分配（devirtualize）资源、调用执行回调、销毁资源。
//! 物理资源的分配和销毁交给 `RgBackend`，FrameGraph 不关心后端的具体实现。

use std::any::Any;

use super::error::{RgAllocError, RgError, RgResult};
use super::pass::{RgPass, RgPassBuilder, RgPassContext, RgPassNode};
use super::resource_desc::RgResourceDesc;
use super::resource_handle::{RgPassId, RgPhysicalHandle, RgResourceId};
use super::resource_registry::RgResourceRegistry;

/// 类型擦除的 Pass 执行器 trait
pub(crate) trait RgPassExecutor {
    /// 执行 Pass
    fn execute(&self, ctx: &mut RgPassContext<'_>);
}

/// 包装用户 Pass 实现的执行器
pub(crate) struct RgPassExecutorWrapper<P: RgPass> {
    pub pass: P,
}

impl<P: RgPass> RgPassExecutor for RgPassExecutorWrapper<P> {
    fn execute(&self, ctx: &mut RgPassContext<'_>) {
        self.pass.execute(ctx);
    }
}

/// 闭包形式的 Pass：setup 产生的数据交给执行回调
pub(crate) struct RgCallbackPass<D, F>
where
    F: Fn(&D, &mut RgPassContext<'_>),
{
    pub data: D,
    pub exec: F,
}

impl<D, F> RgPassExecutor for RgCallbackPass<D, F>
where
    F: Fn(&D, &mut RgPassContext<'_>),
{
    fn execute(&self, ctx: &mut RgPassContext<'_>) {
        (self.exec)(&self.data, ctx);
    }
}

/// 运行 `RgPass::setup` 并包装成执行器
pub(crate) fn setup_pass<'a, P: RgPass + 'a>(
    mut pass: P,
    builder: &mut RgPassBuilder<'_>,
) -> (Box<dyn RgPassExecutor + 'a>, RgResult<()>) {
    let result = pass.setup(builder);
    (Box::new(RgPassExecutorWrapper { pass }), result)
}

/// 分配请求
#[derive(Clone, Copy, Debug)]
pub struct RgAllocRequest<'r> {
    pub resource: RgResourceId,
    /// 调试名称
    pub name: &'r str,
    pub desc: &'r RgResourceDesc,
    /// 子资源的父资源物理句柄，父资源总是先分配
    pub parent: Option<RgPhysicalHandle>,
}

/// GPU 后端
///
/// FrameGraph 只通过这几个入口与后端交互。`execute` 中的 Pass 可以通过
/// `RgPassContext::backend` 拿回具体的后端类型。
pub trait RgBackend: Any {
    /// 为 devirtualize 指令分配物理资源
    fn allocate(&mut self, request: &RgAllocRequest<'_>) -> Result<RgPhysicalHandle, RgAllocError>;

    /// 销毁物理资源，不允许失败
    fn destroy(&mut self, handle: RgPhysicalHandle);

    /// Pass 执行前调用，此时 devirtualize 已经完成
    fn begin_pass(&mut self, _pass: RgPassId, _name: &str) {}

    /// Pass 执行后调用，此时 destroy 尚未进行
    fn end_pass(&mut self, _pass: RgPassId, _name: &str) {}
}

/// 资源的物理状态
///
/// `Unallocated -> Allocated -> Destroyed`，每次转换只发生一次；
/// 外部资源始终处于 `External`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgPhysicalState {
    Unallocated,
    Allocated(RgPhysicalHandle),
    Destroyed,
    External(RgPhysicalHandle),
}

impl RgPhysicalState {
    fn describe(self) -> &'static str {
        match self {
            RgPhysicalState::Unallocated => "unallocated",
            RgPhysicalState::Allocated(_) => "allocated",
            RgPhysicalState::Destroyed => "destroyed",
            RgPhysicalState::External(_) => "externally owned",
        }
    }
}

/// 一次执行过程中所有资源的物理状态
pub struct RgPhysicalTable {
    states: Vec<RgPhysicalState>,
    /// 分配顺序，出错时按相反顺序释放
    allocated: Vec<RgResourceId>,
}

// new & init
impl RgPhysicalTable {
    pub(crate) fn new(resources: &RgResourceRegistry) -> Self {
        let states = resources
            .iter_resources()
            .map(|res| match resources.external_handle(res.id) {
                Some(imported) => RgPhysicalState::External(imported.external),
                None => RgPhysicalState::Unallocated,
            })
            .collect();

        Self {
            states,
            allocated: Vec::new(),
        }
    }
}

// getter
impl RgPhysicalTable {
    #[inline]
    pub fn state(&self, id: RgResourceId) -> Option<RgPhysicalState> {
        self.states.get(id.index()).copied()
    }

    /// 当前可用的物理句柄
    pub fn handle(&self, id: RgResourceId) -> Option<RgPhysicalHandle> {
        match self.state(id)? {
            RgPhysicalState::Allocated(handle) | RgPhysicalState::External(handle) => Some(handle),
            RgPhysicalState::Unallocated | RgPhysicalState::Destroyed => None,
        }
    }
}

// transition
impl RgPhysicalTable {
    fn devirtualize(
        &mut self,
        id: RgResourceId,
        resources: &RgResourceRegistry,
        backend: &mut dyn RgBackend,
    ) -> RgResult<()> {
        let resource = resources.resource(id)?;
        let state = self.state(id).ok_or(RgError::UnknownResource(id.raw()))?;
        if state != RgPhysicalState::Unallocated {
            return Err(RgError::PhysicalState {
                resource: resource.name.clone(),
                action: "allocated",
                state: state.describe(),
            });
        }

        let parent = resource.parent.and_then(|parent| self.handle(parent));
        let request = RgAllocRequest {
            resource: id,
            name: &resource.name,
            desc: &resource.desc,
            parent,
        };
        let handle = backend.allocate(&request).map_err(|source| RgError::Allocation {
            resource: resource.name.clone(),
            source,
        })?;

        log::debug!("devirtualize \"{}\" -> {:?}", resource.name, handle);
        self.states[id.index()] = RgPhysicalState::Allocated(handle);
        self.allocated.push(id);
        Ok(())
    }

    fn destroy(&mut self, id: RgResourceId, resources: &RgResourceRegistry, backend: &mut dyn RgBackend) -> RgResult<()> {
        let resource = resources.resource(id)?;
        let state = self.state(id).ok_or(RgError::UnknownResource(id.raw()))?;
        let RgPhysicalState::Allocated(handle) = state else {
            return Err(RgError::PhysicalState {
                resource: resource.name.clone(),
                action: "destroyed",
                state: state.describe(),
            });
        };

        log::debug!("destroy \"{}\" ({:?})", resource.name, handle);
        backend.destroy(handle);
        self.states[id.index()] = RgPhysicalState::Destroyed;
        self.allocated.retain(|&allocated| allocated != id);
        Ok(())
    }

    /// 销毁所有仍然存活的资源，后分配的先销毁
    fn release_all(&mut self, backend: &mut dyn RgBackend) {
        while let Some(id) = self.allocated.pop() {
            if let Some(RgPhysicalState::Allocated(handle)) = self.state(id) {
                backend.destroy(handle);
                self.states[id.index()] = RgPhysicalState::Destroyed;
            }
        }
    }
}

/// 按执行顺序运行所有存活的 Pass
///
/// 任一步出错时，已经分配的资源全部销毁后再返回错误。
pub(crate) fn execute_plan<B: RgBackend>(
    resources: &RgResourceRegistry,
    passes: &[RgPassNode],
    executors: &[Option<Box<dyn RgPassExecutor + '_>>],
    execution_order: &[RgPassId],
    backend: &mut B,
) -> RgResult<()> {
    let mut table = RgPhysicalTable::new(resources);

    for &pass_id in execution_order {
        let pass = &passes[pass_id.index()];
        if let Err(err) = run_pass(&mut table, resources, pass, executors, backend) {
            log::error!("pass \"{}\" failed: {}", pass.name, err);
            table.release_all(backend);
            return Err(err);
        }
    }

    debug_assert!(table.allocated.is_empty(), "every devirtualized resource has a destroy instruction");
    Ok(())
}

fn run_pass<B: RgBackend>(
    table: &mut RgPhysicalTable,
    resources: &RgResourceRegistry,
    pass: &RgPassNode,
    executors: &[Option<Box<dyn RgPassExecutor + '_>>],
    backend: &mut B,
) -> RgResult<()> {
    profile_scope!("FrameGraph::run_pass");

    for &id in &pass.devirtualize {
        table.devirtualize(id, resources, backend)?;
    }

    backend.begin_pass(pass.id, &pass.name);
    if let Some(Some(executor)) = executors.get(pass.id.index()) {
        let mut ctx = RgPassContext {
            pass,
            physical: table,
            backend: &mut *backend,
        };
        executor.execute(&mut ctx);
    }
    backend.end_pass(pass.id, &pass.name);

    for &id in &pass.destroy {
        table.destroy(id, resources, backend)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::resource::{RgImportKind, RgImported};
    use crate::frame_graph::resource_desc::{RgBufferDesc, RgBufferUsage};

    #[derive(Default)]
    struct CountingBackend {
        next: u64,
        live: Vec<RgPhysicalHandle>,
        fail_on: Option<String>,
    }

    impl RgBackend for CountingBackend {
        fn allocate(&mut self, request: &RgAllocRequest<'_>) -> Result<RgPhysicalHandle, RgAllocError> {
            if self.fail_on.as_deref() == Some(request.name) {
                return Err(RgAllocError::OutOfMemory { requested: 64 });
            }
            self.next += 1;
            let handle = RgPhysicalHandle(self.next);
            self.live.push(handle);
            Ok(handle)
        }

        fn destroy(&mut self, handle: RgPhysicalHandle) {
            self.live.retain(|&h| h != handle);
        }
    }

    fn buffer() -> RgResourceDesc {
        RgBufferDesc::new(256, RgBufferUsage::STORAGE).into()
    }

    #[test]
    fn test_state_machine_transitions_once() {
        let mut resources = RgResourceRegistry::new();
        let raw = resources.register("scratch", buffer(), None, None).unwrap();
        let mut backend = CountingBackend::default();
        let mut table = RgPhysicalTable::new(&resources);

        assert_eq!(table.state(raw.id()), Some(RgPhysicalState::Unallocated));
        table.devirtualize(raw.id(), &resources, &mut backend).unwrap();
        assert!(matches!(table.state(raw.id()), Some(RgPhysicalState::Allocated(_))));
        assert!(matches!(
            table.devirtualize(raw.id(), &resources, &mut backend),
            Err(RgError::PhysicalState { .. })
        ));

        table.destroy(raw.id(), &resources, &mut backend).unwrap();
        assert_eq!(table.state(raw.id()), Some(RgPhysicalState::Destroyed));
        assert!(matches!(table.destroy(raw.id(), &resources, &mut backend), Err(RgError::PhysicalState { .. })));
        assert!(backend.live.is_empty());
    }

    #[test]
    fn test_external_resources_stay_external() {
        let mut resources = RgResourceRegistry::new();
        let imported = RgImported {
            kind: RgImportKind::Resource,
            external: RgPhysicalHandle(99),
        };
        let raw = resources.register("history", buffer(), Some(imported), None).unwrap();
        let mut backend = CountingBackend::default();
        let mut table = RgPhysicalTable::new(&resources);

        assert_eq!(table.handle(raw.id()), Some(RgPhysicalHandle(99)));
        assert!(table.devirtualize(raw.id(), &resources, &mut backend).is_err());
        assert!(table.destroy(raw.id(), &resources, &mut backend).is_err());
        assert_eq!(backend.next, 0);
    }

    #[test]
    fn test_release_all_after_failure() {
        let mut resources = RgResourceRegistry::new();
        let a = resources.register("a", buffer(), None, None).unwrap();
        let b = resources.register("b", buffer(), None, None).unwrap();
        let mut backend = CountingBackend {
            fail_on: Some("b".to_string()),
            ..Default::default()
        };
        let mut table = RgPhysicalTable::new(&resources);

        table.devirtualize(a.id(), &resources, &mut backend).unwrap();
        let err = table.devirtualize(b.id(), &resources, &mut backend).unwrap_err();
        assert!(matches!(err, RgError::Allocation { .. }));

        table.release_all(&mut backend);
        assert!(backend.live.is_empty());
        assert_eq!(table.state(a.id()), Some(RgPhysicalState::Destroyed));
        assert_eq!(table.state(b.id()), Some(RgPhysicalState::Unallocated));
    }
}
