//! Pass 定义和构建器
//!
//! 提供 `RgPass` trait 用于声明式定义 Pass，
//! 以及 `RgPassBuilder` 用于在 setup 阶段声明资源依赖。

use std::any::Any;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use super::error::{RgError, RgResult};
use super::executor::RgPhysicalTable;
use super::resource::RgVirtualResource;
use super::resource_desc::{RgBufferDesc, RgImageDesc, RgImageUsage};
use super::resource_handle::{
    RgBufferHandle, RgHandle, RgImageHandle, RgPassId, RgPhysicalHandle, RgRawHandle, RgResourceId, RgResourceKind,
    RgResourceNodeId,
};
use super::resource_registry::RgResourceRegistry;

/// 渲染目标的挂载点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAttachment {
    Color(u8),
    Depth,
    Stencil,
}

impl fmt::Display for RgAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RgAttachment::Color(slot) => write!(f, "color attachment {}", slot),
            RgAttachment::Depth => write!(f, "depth attachment"),
            RgAttachment::Stencil => write!(f, "stencil attachment"),
        }
    }
}

/// Pass 对资源的一次声明
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RgAccess {
    Read,
    Sample,
    Attachment(RgAttachment),
    Write,
    WriteAttachment(RgAttachment),
    Present,
}

impl RgAccess {
    /// 外部渲染目标只允许作为 color attachment 使用（以及最终的 present）
    fn allowed_on_render_target(self) -> bool {
        matches!(
            self,
            RgAccess::Attachment(RgAttachment::Color(_))
                | RgAccess::WriteAttachment(RgAttachment::Color(_))
                | RgAccess::Present
        )
    }
}

impl fmt::Display for RgAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RgAccess::Read => write!(f, "read"),
            RgAccess::Sample => write!(f, "sampled read"),
            RgAccess::Attachment(att) => write!(f, "{}", att),
            RgAccess::Write => write!(f, "write"),
            RgAccess::WriteAttachment(att) => write!(f, "written {}", att),
            RgAccess::Present => write!(f, "present"),
        }
    }
}

/// Pass 节点数据
///
/// 声明阶段由 `RgPassBuilder` 填写读写集合，
/// 编译阶段填写 `culled` 以及 `devirtualize` / `destroy` 列表。
#[derive(Clone, Debug)]
pub struct RgPassNode {
    /// Pass 名称
    pub name: String,
    /// 声明顺序
    pub id: RgPassId,

    /// 读取的资源节点（去重，保持声明顺序）
    pub reads: IndexSet<RgResourceNodeId>,
    /// 写入产生的资源节点
    pub writes: IndexSet<RgResourceNodeId>,
    /// 作为纹理采样的节点，是 `reads` 的子集
    pub samples: IndexSet<RgResourceNodeId>,
    /// 作为渲染目标使用的节点，是 `reads` 的子集
    pub render_targets: IndexMap<RgResourceNodeId, RgAttachment>,

    /// 写入前句柄 -> 写入后句柄，用于识别重复声明
    pub(crate) write_origins: IndexMap<RgRawHandle, RgRawHandle>,
    /// 按声明顺序记录涉及的资源
    pub(crate) declared: IndexSet<RgResourceId>,

    /// 写入了外部资源，或者被显式标记为外部可见
    pub side_effect: bool,

    /// 执行前需要分配的资源（编译后填充）
    pub devirtualize: Vec<RgResourceId>,
    /// 执行后需要销毁的资源（编译后填充）
    pub destroy: Vec<RgResourceId>,
    /// 是否被裁剪（编译后填充）
    pub culled: bool,
}

// new & init
impl RgPassNode {
    pub(crate) fn new(name: String, id: RgPassId) -> Self {
        Self {
            name,
            id,
            reads: IndexSet::new(),
            writes: IndexSet::new(),
            samples: IndexSet::new(),
            render_targets: IndexMap::new(),
            write_origins: IndexMap::new(),
            declared: IndexSet::new(),
            side_effect: false,
            devirtualize: Vec::new(),
            destroy: Vec::new(),
            culled: false,
        }
    }
}

// getter
impl RgPassNode {
    /// 按声明顺序排列的、该 Pass 直接涉及的资源
    #[inline]
    pub fn declared_resources(&self) -> impl Iterator<Item = RgResourceId> + '_ {
        self.declared.iter().copied()
    }

    /// 没有任何读写声明
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}

/// RgPass trait
///
/// 定义 FrameGraph 中的一个 Pass。用户需要实现此 trait 来创建自定义 Pass。
///
/// # 示例
///
/// ```ignore
/// struct BlurPass {
///     input: RgImageHandle,
///     output: RgImageHandle,
/// }
///
/// impl RgPass for BlurPass {
///     fn setup(&mut self, builder: &mut RgPassBuilder<'_>) -> RgResult<()> {
///         builder.sample(self.input)?;
///         self.output = builder.write(self.output)?;
///         Ok(())
///     }
///
///     fn execute(&self, ctx: &mut RgPassContext<'_>) {
///         let input = ctx.get(self.input);
///         let output = ctx.get(self.output);
///         // 录制命令...
///     }
/// }
/// ```
///
/// Pass 不需要是 Send + Sync，FrameGraph 在单线程中构建和编译。
pub trait RgPass {
    /// 声明 Pass 的资源依赖
    ///
    /// 返回错误时 Pass 仍然保留在 graph 中，已经成功的声明不会回滚。
    fn setup(&mut self, builder: &mut RgPassBuilder<'_>) -> RgResult<()>;

    /// 执行 Pass
    ///
    /// 声明过的资源此时都已经有物理句柄。
    fn execute(&self, ctx: &mut RgPassContext<'_>);
}

/// Pass 构建器
///
/// 在 `RgPass::setup()` 中使用，也可以通过 `FrameGraph::pass_builder` 重新打开某个 Pass 的声明。
pub struct RgPassBuilder<'r> {
    pub(crate) pass: &'r mut RgPassNode,
    pub(crate) resources: &'r mut RgResourceRegistry,
    /// 被拒绝的声明
    pub(crate) rejected: &'r mut Vec<RgError>,
}

// getter
impl RgPassBuilder<'_> {
    #[inline]
    pub fn pass_id(&self) -> RgPassId {
        self.pass.id
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        &self.pass.name
    }
}

// declare
impl RgPassBuilder<'_> {
    /// 声明读取资源
    ///
    /// 重复读取同一版本只记录一次。
    #[inline]
    pub fn read<H: RgHandle>(&mut self, handle: H) -> RgResult<H> {
        self.read_raw(handle.raw(), H::KIND, RgAccess::Read).map(|_| handle)
    }

    /// 声明作为纹理采样，隐含读取
    #[inline]
    pub fn sample(&mut self, handle: RgImageHandle) -> RgResult<RgImageHandle> {
        self.read_raw(handle.raw(), RgResourceKind::Image, RgAccess::Sample).map(|_| handle)
    }

    /// 声明作为渲染目标使用（只读挂载），隐含读取
    #[inline]
    pub fn use_attachment(&mut self, handle: RgImageHandle, attachment: RgAttachment) -> RgResult<RgImageHandle> {
        self.read_raw(handle.raw(), RgResourceKind::Image, RgAccess::Attachment(attachment)).map(|_| handle)
    }

    /// 声明写入资源
    ///
    /// 返回新版本的句柄，传入的句柄随之失效。
    /// 用同一个旧句柄重复写入会直接返回第一次写入的结果。
    #[inline]
    pub fn write<H: RgHandle>(&mut self, handle: H) -> RgResult<H> {
        self.write_raw(handle.raw(), H::KIND, RgAccess::Write).map(H::from_raw)
    }

    /// 挂载为渲染目标并写入（load + store）
    ///
    /// 读和写两部分都通过检查后才会记录，被拒绝时 Pass 保持不变。
    pub fn write_attachment(&mut self, handle: RgImageHandle, attachment: RgAttachment) -> RgResult<RgImageHandle> {
        let access = RgAccess::WriteAttachment(attachment);
        let raw = handle.raw();
        let checked = self
            .resolve_read(raw, RgResourceKind::Image, access)
            .and_then(|_| self.check_write(raw, RgResourceKind::Image, access));
        if let Err(err) = checked {
            return Err(self.report(err));
        }

        self.read_raw(raw, RgResourceKind::Image, access)?;
        self.write_raw(raw, RgResourceKind::Image, access).map(RgImageHandle::from_raw)
    }

    /// 声明 present：外部可见，Pass 不会被裁剪
    pub(crate) fn present<H: RgHandle>(&mut self, handle: H) -> RgResult<H> {
        self.pass.side_effect = true;
        self.read_raw(handle.raw(), H::KIND, RgAccess::Present).map(|_| handle)
    }

    /// 标记 Pass 具有外部可见的副作用，不会被裁剪
    #[inline]
    pub fn side_effect(&mut self) {
        self.pass.side_effect = true;
    }

    /// 创建临时图像
    ///
    /// 图像在第一个使用它的 Pass 之前分配，最后一个使用它的 Pass 之后销毁。
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgResult<RgImageHandle> {
        match self.resources.register(name, desc.into(), None, None) {
            Ok(raw) => Ok(RgImageHandle::from_raw(raw)),
            Err(err) => Err(self.report(err)),
        }
    }

    /// 创建临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgResult<RgBufferHandle> {
        match self.resources.register(name, desc.into(), None, None) {
            Ok(raw) => Ok(RgBufferHandle::from_raw(raw)),
            Err(err) => Err(self.report(err)),
        }
    }
}

impl RgPassBuilder<'_> {
    fn read_raw(&mut self, raw: RgRawHandle, kind: RgResourceKind, access: RgAccess) -> RgResult<RgRawHandle> {
        let node = match self.resolve_read(raw, kind, access) {
            Ok(node) => node,
            Err(err) => return Err(self.report(err)),
        };

        self.pass.reads.insert(node);
        self.pass.declared.insert(raw.id);
        self.read_aliases(raw.id);
        match access {
            RgAccess::Sample => {
                self.pass.samples.insert(node);
            }
            RgAccess::Attachment(att) | RgAccess::WriteAttachment(att) => {
                self.pass.render_targets.insert(node, att);
            }
            RgAccess::Read | RgAccess::Write | RgAccess::Present => {}
        }

        log::debug!("pass \"{}\": {} {}", self.pass.name, access, self.resources.node_label(node));
        Ok(raw)
    }

    fn write_raw(&mut self, raw: RgRawHandle, kind: RgResourceKind, access: RgAccess) -> RgResult<RgRawHandle> {
        match self.check_write(raw, kind, access) {
            Ok(Some(previous)) => return Ok(previous),
            Ok(None) => {}
            Err(err) => return Err(self.report(err)),
        }

        let (post, node) = self.resources.bump_version(raw.id, self.pass.id);
        debug_assert_eq!(self.resources.node(node).writer, Some(self.pass.id));

        if self.resources.is_externally_backed(raw.id) {
            self.pass.side_effect = true;
        }
        self.pass.writes.insert(node);
        self.pass.write_origins.insert(raw, post);
        self.pass.declared.insert(raw.id);
        self.read_aliases(raw.id);

        log::debug!("pass \"{}\": {} {}", self.pass.name, access, self.resources.node_label(node));
        Ok(post)
    }

    /// 父资源和子资源共享内存：访问其中一个时，依赖另一方最新的写入
    ///
    /// 本 Pass 自己写出的节点不计入，否则会形成自环。
    fn read_aliases(&mut self, id: RgResourceId) {
        for alias in self.resources.aliases(id) {
            let Some(resource) = self.resources.get(alias) else { continue };
            let node = resource.current_node();
            match self.resources.node(node).writer {
                Some(writer) if writer != self.pass.id => {
                    if self.pass.reads.insert(node) {
                        log::debug!("pass \"{}\": aliased read {}", self.pass.name, self.resources.node_label(node));
                    }
                }
                _ => {}
            }
        }
    }

    /// 读取声明对应的资源节点
    ///
    /// 本 Pass 已经写过的资源仍然可以读取写入前的版本。
    fn resolve_read(&self, raw: RgRawHandle, kind: RgResourceKind, access: RgAccess) -> RgResult<RgResourceNodeId> {
        let resource = self.lookup(raw, kind)?;
        self.check_access(resource, access)?;

        if raw.version == resource.version {
            return Ok(resource.current_node());
        }
        if self.pass.write_origins.contains_key(&raw)
            && let Some(node) = resource.node_of_version(raw.version)
        {
            return Ok(node);
        }
        Err(self.stale(resource, raw))
    }

    /// 写入前的检查，返回 `Some` 表示重复声明
    fn check_write(&self, raw: RgRawHandle, kind: RgResourceKind, access: RgAccess) -> RgResult<Option<RgRawHandle>> {
        let resource = self.lookup(raw, kind)?;
        self.check_access(resource, access)?;

        if let Some(&post) = self.pass.write_origins.get(&raw) {
            return Ok(Some(post));
        }
        // 一个 Pass 对同一资源只产生一个新版本
        if self.pass.write_origins.keys().any(|origin| origin.id == raw.id) {
            return Err(RgError::DoubleWrite {
                pass: self.pass.name.clone(),
                resource: resource.name.clone(),
            });
        }
        if raw.version != resource.version {
            return Err(self.stale(resource, raw));
        }
        Ok(None)
    }

    fn lookup(&self, raw: RgRawHandle, kind: RgResourceKind) -> RgResult<&RgVirtualResource> {
        let resource = self.resources.resource(raw.id)?;
        if resource.kind() != kind {
            return Err(RgError::KindMismatch {
                expected: kind.to_string(),
                actual: resource.kind().to_string(),
            });
        }
        Ok(resource)
    }

    fn check_access(&self, resource: &RgVirtualResource, access: RgAccess) -> RgResult<()> {
        if self.resources.is_render_target_backed(resource.id) && !access.allowed_on_render_target() {
            return Err(RgError::IllegalImportedUsage {
                resource: resource.name.clone(),
                pass: self.pass.name.clone(),
                usage: access.to_string(),
            });
        }

        match access {
            RgAccess::Attachment(att) | RgAccess::WriteAttachment(att) => self.check_attachment(resource, att),
            _ => Ok(()),
        }
    }

    /// 格式和用途要匹配挂载点，同一个挂载点只能挂一个资源
    fn check_attachment(&self, resource: &RgVirtualResource, attachment: RgAttachment) -> RgResult<()> {
        let invalid = |reason: &str| RgError::InvalidAttachment {
            resource: resource.name.clone(),
            pass: self.pass.name.clone(),
            attachment: attachment.to_string(),
            reason: reason.to_string(),
        };

        let Some(desc) = resource.desc.as_image() else {
            return Err(invalid("not an image"));
        };
        match attachment {
            RgAttachment::Color(_) => {
                if desc.format.is_depth_stencil() {
                    return Err(invalid("depth/stencil format"));
                }
                if !desc.usage.contains(RgImageUsage::COLOR_ATTACHMENT) {
                    return Err(invalid("missing COLOR_ATTACHMENT usage"));
                }
            }
            RgAttachment::Depth | RgAttachment::Stencil => {
                let has_aspect = match attachment {
                    RgAttachment::Depth => desc.format.has_depth(),
                    _ => desc.format.has_stencil(),
                };
                if !has_aspect {
                    return Err(invalid("format has no matching aspect"));
                }
                if !desc.usage.contains(RgImageUsage::DEPTH_STENCIL_ATTACHMENT) {
                    return Err(invalid("missing DEPTH_STENCIL_ATTACHMENT usage"));
                }
            }
        }

        let occupied = self
            .pass
            .render_targets
            .iter()
            .any(|(&node, &att)| att == attachment && self.resources.node(node).resource != resource.id);
        if occupied {
            return Err(invalid("slot already bound to another resource"));
        }
        Ok(())
    }

    fn stale(&self, resource: &RgVirtualResource, raw: RgRawHandle) -> RgError {
        RgError::StaleHandle {
            resource: resource.name.clone(),
            pass: self.pass.name.clone(),
            handle_version: raw.version,
            current_version: resource.version,
        }
    }

    /// 记录并返回错误
    ///
    /// 被拒绝的声明会保存下来，严格模式下编译时据此失败。
    fn report(&mut self, err: RgError) -> RgError {
        if err.is_rejected_declaration() {
            log::warn!("pass \"{}\": declaration rejected: {}", self.pass.name, err);
            self.rejected.push(err.clone());
        } else {
            log::error!("pass \"{}\": {}", self.pass.name, err);
        }
        err
    }
}

/// Pass 执行时的上下文
///
/// 提供 Pass 声明过的资源的物理句柄，以及后端的访问入口。
pub struct RgPassContext<'c> {
    pub(crate) pass: &'c RgPassNode,
    pub(crate) physical: &'c RgPhysicalTable,
    pub(crate) backend: &'c mut dyn Any,
}

impl RgPassContext<'_> {
    #[inline]
    pub fn pass_id(&self) -> RgPassId {
        self.pass.id
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        &self.pass.name
    }

    /// 获取资源的物理句柄
    ///
    /// 只能获取本 Pass 声明过的资源，任意版本的句柄都指向同一个物理资源。
    pub fn get<H: RgHandle>(&self, handle: H) -> Option<RgPhysicalHandle> {
        if !self.pass.declared.contains(&handle.id()) {
            return None;
        }
        self.physical.handle(handle.id())
    }

    /// 获取图像的物理句柄
    #[inline]
    pub fn get_image(&self, handle: RgImageHandle) -> Option<RgPhysicalHandle> {
        self.get(handle)
    }

    /// 获取缓冲区的物理句柄
    #[inline]
    pub fn get_buffer(&self, handle: RgBufferHandle) -> Option<RgPhysicalHandle> {
        self.get(handle)
    }

    /// 以具体类型访问后端
    #[inline]
    pub fn backend<B: 'static>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }
}
