//! 虚拟资源与资源节点
//!
//! `RgVirtualResource` 是跨越所有版本的同一个资源；
//! `RgResourceNode` 是该资源的某一个版本，放在依赖图中。

use super::resource_desc::RgResourceDesc;
use super::resource_handle::{RgPassId, RgPhysicalHandle, RgResourceId, RgResourceKind, RgResourceNodeId};

/// 导入资源的种类
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgImportKind {
    /// 普通外部纹理或缓冲区，可以任意读写
    Resource,
    /// 外部渲染目标（例如 swapchain image），只能作为 color attachment 使用
    RenderTarget,
}

/// 外部导入的物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImported {
    pub kind: RgImportKind,
    pub external: RgPhysicalHandle,
}

/// 虚拟资源
///
/// `first` / `last` / `refcount` 由编译阶段填写，声明阶段始终为空。
#[derive(Clone, Debug)]
pub struct RgVirtualResource {
    /// 调试名称
    pub name: String,
    pub id: RgResourceId,
    /// 当前版本（被写入的次数）
    pub version: u32,
    pub desc: RgResourceDesc,
    /// 外部导入时不为空
    pub imported: Option<RgImported>,
    /// 子资源的父资源
    pub parent: Option<RgResourceId>,

    /// 需要该资源的存活 pass 数量（包含子资源的传递引用）
    pub refcount: u32,
    /// 第一个使用该资源的存活 pass
    pub first: Option<RgPassId>,
    /// 最后一个使用该资源的存活 pass
    pub last: Option<RgPassId>,

    /// 每个版本对应的节点，下标即版本号
    pub(crate) nodes: Vec<RgResourceNodeId>,
}

// new & init
impl RgVirtualResource {
    pub(crate) fn new(
        name: String,
        id: RgResourceId,
        desc: RgResourceDesc,
        imported: Option<RgImported>,
        parent: Option<RgResourceId>,
        initial_node: RgResourceNodeId,
    ) -> Self {
        Self {
            name,
            id,
            version: 0,
            desc,
            imported,
            parent,
            refcount: 0,
            first: None,
            last: None,
            nodes: vec![initial_node],
        }
    }
}

// getter
impl RgVirtualResource {
    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        self.desc.kind()
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        self.imported.is_some()
    }

    /// 是否是只能作为 color attachment 使用的外部渲染目标
    #[inline]
    pub fn is_imported_render_target(&self) -> bool {
        matches!(self.imported, Some(RgImported { kind: RgImportKind::RenderTarget, .. }))
    }

    /// 当前版本对应的节点
    #[inline]
    pub fn current_node(&self) -> RgResourceNodeId {
        // nodes 在构造时至少包含 v0
        self.nodes[self.version as usize]
    }

    /// 指定版本对应的节点
    #[inline]
    pub fn node_of_version(&self, version: u32) -> Option<RgResourceNodeId> {
        self.nodes.get(version as usize).copied()
    }

    /// 所有版本的节点，按版本号排列
    #[inline]
    pub fn version_nodes(&self) -> &[RgResourceNodeId] {
        &self.nodes
    }

    /// 编译后的生命周期区间
    #[inline]
    pub fn lifetime(&self) -> Option<(RgPassId, RgPassId)> {
        self.first.zip(self.last)
    }

    pub(crate) fn reset_lifetime(&mut self) {
        self.refcount = 0;
        self.first = None;
        self.last = None;
    }
}

/// 资源节点：资源的一个版本
///
/// 每个节点至多只有一个写入者。写入总是产生新节点，
/// 读取者持有的节点永远不会被修改。
#[derive(Clone, Debug)]
pub struct RgResourceNode {
    pub id: RgResourceNodeId,
    pub resource: RgResourceId,
    pub version: u32,
    /// 产生该版本的 pass，v0 没有写入者
    pub writer: Option<RgPassId>,
}
