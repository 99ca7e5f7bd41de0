//! FrameGraph 构建器和编译结果
//!
//! 提供 `FrameGraph` 用于声明资源与 Pass，
//! `CompiledGraph` 用于查询编译结果并驱动后端执行。

use super::compiler::compile_graph;
use super::error::{RgError, RgResult};
use super::executor::{RgBackend, RgCallbackPass, RgPassExecutor, execute_plan, setup_pass};
use super::export_info::{RgGraphInfo, graphviz, log_execution_plan};
use super::graph::{DependencyGraph, RgNodeKind};
use super::options::RgCompileOptions;
use super::pass::{RgAttachment, RgPass, RgPassBuilder, RgPassContext, RgPassNode};
use super::resource::{RgImportKind, RgImported, RgVirtualResource};
use super::resource_desc::{RgBufferDesc, RgImageDesc, RgResourceDesc};
use super::resource_handle::{
    RgBufferHandle, RgHandle, RgImageHandle, RgPassId, RgPhysicalHandle, RgRawHandle, RgResourceId,
};
use super::resource_registry::RgResourceRegistry;

/// FrameGraph 构建器
///
/// # 使用流程
///
/// 1. 创建: `FrameGraph::new()`
/// 2. 声明 / 导入资源: `create_image(...)` / `import_render_target(...)`
/// 3. 添加 Pass: `add_pass("name", pass)`
/// 4. 编译: `compile()`
/// 5. 执行: `compiled.execute(&mut backend)`
///
/// # 生命周期
///
/// `'a` 是 Pass 可以借用的外部数据的生命周期。
pub struct FrameGraph<'a> {
    /// 资源注册表
    resources: RgResourceRegistry,
    /// Pass 节点列表（按添加顺序）
    passes: Vec<RgPassNode>,
    /// 与 `passes` 一一对应的执行回调
    executors: Vec<Option<Box<dyn RgPassExecutor + 'a>>>,
    /// 被拒绝的声明
    rejected: Vec<RgError>,
    options: RgCompileOptions,
}

impl Default for FrameGraph<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<'a> FrameGraph<'a> {
    pub fn new() -> Self {
        Self::with_options(RgCompileOptions::default())
    }

    pub fn with_options(options: RgCompileOptions) -> Self {
        Self {
            resources: RgResourceRegistry::new(),
            passes: Vec::new(),
            executors: Vec::new(),
            rejected: Vec::new(),
            options,
        }
    }
}

// resources
impl FrameGraph<'_> {
    /// 声明临时图像，v0 没有写入者
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgResult<RgImageHandle> {
        self.register(name, desc.into(), None, None).map(RgImageHandle::from_raw)
    }

    /// 声明临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgResult<RgBufferHandle> {
        self.register(name, desc.into(), None, None).map(RgBufferHandle::from_raw)
    }

    /// 导入外部图像，写入它的 Pass 自动带有副作用
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        external: RgPhysicalHandle,
        desc: RgImageDesc,
    ) -> RgResult<RgImageHandle> {
        let imported = RgImported {
            kind: RgImportKind::Resource,
            external,
        };
        self.register(name, desc.into(), Some(imported), None).map(RgImageHandle::from_raw)
    }

    /// 导入外部缓冲区
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        external: RgPhysicalHandle,
        desc: RgBufferDesc,
    ) -> RgResult<RgBufferHandle> {
        let imported = RgImported {
            kind: RgImportKind::Resource,
            external,
        };
        self.register(name, desc.into(), Some(imported), None).map(RgBufferHandle::from_raw)
    }

    /// 导入外部渲染目标（例如 swapchain image）
    ///
    /// 只能作为 color attachment 使用，其它连接会被拒绝。
    pub fn import_render_target(
        &mut self,
        name: impl Into<String>,
        external: RgPhysicalHandle,
        desc: RgImageDesc,
    ) -> RgResult<RgImageHandle> {
        let imported = RgImported {
            kind: RgImportKind::RenderTarget,
            external,
        };
        self.register(name, desc.into(), Some(imported), None).map(RgImageHandle::from_raw)
    }

    /// 在已有资源上创建子资源（别名）
    ///
    /// 子资源的使用会延长父资源的生命周期；父资源是外部资源时子资源也不会被分配。
    pub fn create_subresource<H: RgHandle>(
        &mut self,
        parent: H,
        name: impl Into<String>,
        desc: impl Into<RgResourceDesc>,
    ) -> RgResult<H> {
        let name = name.into();
        let desc = desc.into();
        let parent_kind = self.resources.resource(parent.id())?.kind();
        if parent_kind != H::KIND || desc.kind() != H::KIND {
            let err = RgError::InvalidAliasParent {
                name,
                reason: format!("a {} cannot alias a {}", desc.kind(), parent_kind),
            };
            return Err(self.reject(err));
        }
        self.register(name, desc, None, Some(parent.id())).map(H::from_raw)
    }

    fn register(
        &mut self,
        name: impl Into<String>,
        desc: RgResourceDesc,
        imported: Option<RgImported>,
        parent: Option<RgResourceId>,
    ) -> RgResult<RgRawHandle> {
        match self.resources.register(name, desc, imported, parent) {
            Ok(raw) => Ok(raw),
            Err(err) => Err(self.reject(err)),
        }
    }

    fn reject(&mut self, err: RgError) -> RgError {
        if err.is_rejected_declaration() {
            log::warn!("declaration rejected: {}", err);
            self.rejected.push(err.clone());
        }
        err
    }
}

// passes
impl<'a> FrameGraph<'a> {
    /// 添加 Pass
    ///
    /// `setup` 返回错误时 Pass 仍然保留在 graph 中，错误原样返回给调用方。
    pub fn add_pass<P: RgPass + 'a>(&mut self, name: impl Into<String>, pass: P) -> RgResult<RgPassId> {
        let id = self.create_pass(name);
        let (executor, result) = setup_pass(pass, &mut self.builder_of(id));
        self.executors[id.index()] = Some(executor);
        result.map(|_| id)
    }

    /// 以闭包形式添加 Pass
    ///
    /// `setup` 返回的数据在执行时交给 `exec`。
    pub fn add_callback_pass<D, S, E>(&mut self, name: impl Into<String>, setup: S, exec: E) -> RgResult<RgPassId>
    where
        D: 'a,
        S: FnOnce(&mut RgPassBuilder<'_>) -> RgResult<D>,
        E: Fn(&D, &mut RgPassContext<'_>) + 'a,
    {
        let id = self.create_pass(name);
        let data = setup(&mut self.builder_of(id))?;
        self.executors[id.index()] = Some(Box::new(RgCallbackPass { data, exec }));
        Ok(id)
    }

    /// 添加一个没有执行回调的 Pass，之后通过 `pass_builder` 或 `read` / `write` 声明依赖
    pub fn create_pass(&mut self, name: impl Into<String>) -> RgPassId {
        let id = RgPassId(self.passes.len() as u32);
        let name = name.into();
        log::debug!("add pass \"{}\" as {:?}", name, id);

        self.passes.push(RgPassNode::new(name, id));
        self.executors.push(None);
        id
    }

    /// 重新打开某个 Pass 的声明
    pub fn pass_builder(&mut self, pass: RgPassId) -> RgResult<RgPassBuilder<'_>> {
        if pass.index() >= self.passes.len() {
            return Err(RgError::UnknownPass(pass.raw()));
        }
        Ok(self.builder_of(pass))
    }

    fn builder_of(&mut self, pass: RgPassId) -> RgPassBuilder<'_> {
        RgPassBuilder {
            pass: &mut self.passes[pass.index()],
            resources: &mut self.resources,
            rejected: &mut self.rejected,
        }
    }

    /// 声明 `pass` 读取资源
    pub fn read<H: RgHandle>(&mut self, pass: RgPassId, handle: H) -> RgResult<H> {
        self.pass_builder(pass)?.read(handle)
    }

    /// 声明 `pass` 采样图像
    pub fn sample(&mut self, pass: RgPassId, handle: RgImageHandle) -> RgResult<RgImageHandle> {
        self.pass_builder(pass)?.sample(handle)
    }

    /// 声明 `pass` 把图像作为渲染目标使用
    pub fn use_attachment(
        &mut self,
        pass: RgPassId,
        handle: RgImageHandle,
        attachment: RgAttachment,
    ) -> RgResult<RgImageHandle> {
        self.pass_builder(pass)?.use_attachment(handle, attachment)
    }

    /// 声明 `pass` 写入资源，返回新版本的句柄
    pub fn write<H: RgHandle>(&mut self, pass: RgPassId, handle: H) -> RgResult<H> {
        self.pass_builder(pass)?.write(handle)
    }

    /// 声明 `pass` 挂载并写入渲染目标
    pub fn write_attachment(
        &mut self,
        pass: RgPassId,
        handle: RgImageHandle,
        attachment: RgAttachment,
    ) -> RgResult<RgImageHandle> {
        self.pass_builder(pass)?.write_attachment(handle, attachment)
    }

    /// 添加一个读取 `handle` 的 present Pass
    ///
    /// present Pass 带有副作用，它依赖的所有 Pass 都不会被裁剪。
    pub fn present<H: RgHandle>(&mut self, handle: H) -> RgResult<RgPassId> {
        let id = self.create_pass("present");
        self.builder_of(id).present(handle)?;
        Ok(id)
    }
}

// getter
impl FrameGraph<'_> {
    #[inline]
    pub fn options(&self) -> &RgCompileOptions {
        &self.options
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn pass(&self, pass: RgPassId) -> Option<&RgPassNode> {
        self.passes.get(pass.index())
    }

    #[inline]
    pub fn resource<H: RgHandle>(&self, handle: H) -> Option<&RgVirtualResource> {
        self.resources.get(handle.id())
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    /// 资源的描述
    #[inline]
    pub fn descriptor<H: RgHandle>(&self, handle: H) -> Option<&RgResourceDesc> {
        self.resource(handle).map(|res| &res.desc)
    }

    /// 句柄是否指向资源的当前版本
    #[inline]
    pub fn is_valid<H: RgHandle>(&self, handle: H) -> bool {
        self.resources.is_current(handle.raw())
    }

    /// 资源的当前版本
    #[inline]
    pub fn resource_version<H: RgHandle>(&self, handle: H) -> Option<u32> {
        self.resource(handle).map(|res| res.version)
    }

    /// 目前为止被拒绝的声明
    #[inline]
    pub fn rejected(&self) -> &[RgError] {
        &self.rejected
    }
}

// compile
impl<'a> FrameGraph<'a> {
    /// 编译 FrameGraph
    ///
    /// 构建依赖图、检查环与多写入者、裁剪、排序并计算资源生命周期。
    /// 出错时不产生任何执行计划。
    pub fn compile(mut self) -> RgResult<CompiledGraph<'a>> {
        let output = compile_graph(&mut self.passes, &mut self.resources, &self.rejected, &self.options)?;

        let compiled = CompiledGraph {
            resources: self.resources,
            passes: self.passes,
            executors: self.executors,
            graph: output.graph,
            execution_order: output.execution_order,
        };
        if self.options.log_execution_plan {
            compiled.print_execution_plan();
        }
        Ok(compiled)
    }
}

/// 编译后的 FrameGraph
///
/// 执行计划是不可变的，可以多次执行。
///
/// # 生命周期
///
/// `'a` 是 Pass 借用的外部数据的生命周期。
pub struct CompiledGraph<'a> {
    resources: RgResourceRegistry,
    passes: Vec<RgPassNode>,
    executors: Vec<Option<Box<dyn RgPassExecutor + 'a>>>,
    /// 依赖图（用于查询和调试）
    graph: DependencyGraph,
    /// 执行顺序（只包含存活的 Pass）
    execution_order: Vec<RgPassId>,
}

// getter
impl CompiledGraph<'_> {
    /// 获取执行顺序
    #[inline]
    pub fn execution_order(&self) -> &[RgPassId] {
        &self.execution_order
    }

    /// 获取 Pass 数量（包含被裁剪的）
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn pass(&self, pass: RgPassId) -> Option<&RgPassNode> {
        self.passes.get(pass.index())
    }

    /// 获取 Pass 名称
    #[inline]
    pub fn pass_name(&self, pass: RgPassId) -> Option<&str> {
        self.pass(pass).map(|p| p.name.as_str())
    }

    #[inline]
    pub fn is_culled(&self, pass: RgPassId) -> bool {
        self.pass(pass).is_some_and(|p| p.culled)
    }

    /// Pass 执行前分配、执行后销毁的资源
    pub fn pass_bracket(&self, pass: RgPassId) -> Option<(&[RgResourceId], &[RgResourceId])> {
        self.pass(pass).map(|p| (p.devirtualize.as_slice(), p.destroy.as_slice()))
    }

    #[inline]
    pub fn resource<H: RgHandle>(&self, handle: H) -> Option<&RgVirtualResource> {
        self.resources.get(handle.id())
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    /// 资源的生命周期：第一个和最后一个使用它的存活 Pass
    #[inline]
    pub fn resource_lifetime<H: RgHandle>(&self, handle: H) -> Option<(RgPassId, RgPassId)> {
        self.resource(handle).and_then(|res| res.lifetime())
    }

    #[inline]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// 依赖图中 `to` 是否可以从 `from` 到达
    #[inline]
    pub fn is_reachable(&self, from: RgNodeKind, to: RgNodeKind) -> bool {
        self.graph.is_reachable(from, to)
    }
}

// execute
impl CompiledGraph<'_> {
    /// 执行
    ///
    /// 按执行顺序：分配资源、调用执行回调、销毁资源。
    /// 分配失败时，已经分配的资源会被销毁，然后返回 `RgError::Allocation`。
    pub fn execute<B: RgBackend>(&self, backend: &mut B) -> RgResult<()> {
        profile_scope!("CompiledGraph::execute");
        execute_plan(&self.resources, &self.passes, &self.executors, &self.execution_order, backend)
    }
}

// 调试方法
impl CompiledGraph<'_> {
    /// 导出调试信息
    pub fn export_info(&self) -> RgGraphInfo {
        RgGraphInfo::collect(&self.passes, &self.resources, &self.execution_order)
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        self.export_info().to_json()
    }

    /// 导出为 graphviz dot 文本
    pub fn export_graphviz(&self) -> String {
        graphviz(&self.passes, &self.resources)
    }

    /// 打印执行计划（用于调试）
    pub fn print_execution_plan(&self) {
        log_execution_plan(&self.passes, &self.resources, &self.execution_order);
    }
}
