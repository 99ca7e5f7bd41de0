use super::error::{RgError, RgResult};
use super::resource::{RgImported, RgResourceNode, RgVirtualResource};
use super::resource_desc::RgResourceDesc;
use super::resource_handle::{RgPassId, RgRawHandle, RgResourceId, RgResourceNodeId};

/// 资源注册表
///
/// 管理 FrameGraph 中所有声明的虚拟资源以及它们的每一个版本节点。
/// 两者都存放在 arena 里，通过整数索引互相引用。
#[derive(Default)]
pub struct RgResourceRegistry {
    /// 虚拟资源表
    resources: Vec<RgVirtualResource>,
    /// 资源节点表（每个版本一个）
    nodes: Vec<RgResourceNode>,
}

// new & init
impl RgResourceRegistry {
    /// 创建新的资源注册表
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl RgResourceRegistry {
    /// 注册资源，创建 v0 节点
    ///
    /// 描述在此处校验；子资源还要求父资源存在、类别一致且范围不越界。
    pub fn register(
        &mut self,
        name: impl Into<String>,
        desc: RgResourceDesc,
        imported: Option<RgImported>,
        parent: Option<RgResourceId>,
    ) -> RgResult<RgRawHandle> {
        let name = name.into();

        desc.validate().map_err(|reason| RgError::InvalidDescriptor {
            name: name.clone(),
            reason,
        })?;

        if let Some(parent_id) = parent {
            let parent_res = self.resources.get(parent_id.index()).ok_or_else(|| RgError::InvalidAliasParent {
                name: name.clone(),
                reason: format!("parent resource id {} does not exist", parent_id.raw()),
            })?;
            desc.fits_within(&parent_res.desc).map_err(|reason| RgError::InvalidAliasParent {
                name: name.clone(),
                reason,
            })?;
        }

        let id = RgResourceId(self.resources.len() as u32);
        let node = self.push_node(id, 0, None);
        log::debug!("register resource \"{}\" as {:?} (imported: {})", name, id, imported.is_some());

        self.resources.push(RgVirtualResource::new(name, id, desc, imported, parent, node));
        Ok(RgRawHandle::new(id, 0))
    }

    /// 写入资源：版本号加一并创建新的节点，写入者记为 `writer`
    pub(crate) fn bump_version(&mut self, id: RgResourceId, writer: RgPassId) -> (RgRawHandle, RgResourceNodeId) {
        let version = self.resources[id.index()].version + 1;
        let node = self.push_node(id, version, Some(writer));

        let resource = &mut self.resources[id.index()];
        resource.version = version;
        resource.nodes.push(node);
        debug_assert_eq!(resource.nodes.len(), version as usize + 1);

        (RgRawHandle::new(id, version), node)
    }

    fn push_node(&mut self, resource: RgResourceId, version: u32, writer: Option<RgPassId>) -> RgResourceNodeId {
        let id = RgResourceNodeId(self.nodes.len() as u32);
        self.nodes.push(RgResourceNode {
            id,
            resource,
            version,
            writer,
        });
        id
    }
}

// getter & iter
impl RgResourceRegistry {
    /// 获取资源
    #[inline]
    pub fn get(&self, id: RgResourceId) -> Option<&RgVirtualResource> {
        self.resources.get(id.index())
    }

    /// 获取资源，不存在时返回错误
    #[inline]
    pub fn resource(&self, id: RgResourceId) -> RgResult<&RgVirtualResource> {
        self.get(id).ok_or(RgError::UnknownResource(id.raw()))
    }

    #[inline]
    pub(crate) fn resource_mut(&mut self, id: RgResourceId) -> &mut RgVirtualResource {
        &mut self.resources[id.index()]
    }

    /// 获取资源节点
    ///
    /// 节点 id 只由注册表自己产生，因此总是有效的。
    #[inline]
    pub fn node(&self, id: RgResourceNodeId) -> &RgResourceNode {
        &self.nodes[id.index()]
    }

    /// 句柄是否仍然有效
    pub fn is_current(&self, handle: RgRawHandle) -> bool {
        self.get(handle.id).is_some_and(|res| res.version == handle.version)
    }

    /// 资源自身及其所有祖先，从自身开始向上
    ///
    /// 迭代遍历，别名链的无环性在注册子资源时已经保证（父资源总是先注册）。
    pub fn ancestors(&self, id: RgResourceId) -> impl Iterator<Item = RgResourceId> + '_ {
        std::iter::successors(Some(id), move |&current| self.get(current).and_then(|res| res.parent))
    }

    /// 资源由外部提供物理对象：自身或任一祖先是导入资源
    pub fn is_externally_backed(&self, id: RgResourceId) -> bool {
        self.ancestors(id).any(|ancestor| self.get(ancestor).is_some_and(|res| res.is_imported()))
    }

    /// 自身或任一祖先是外部渲染目标，只能作为 color attachment 使用
    pub fn is_render_target_backed(&self, id: RgResourceId) -> bool {
        self.ancestors(id).any(|ancestor| self.get(ancestor).is_some_and(|res| res.is_imported_render_target()))
    }

    /// 与 `id` 共享内存的其他资源：所有祖先和所有后代
    pub fn aliases(&self, id: RgResourceId) -> impl Iterator<Item = RgResourceId> + '_ {
        let descendants = self
            .resources
            .iter()
            .filter(move |res| res.id != id && self.ancestors(res.id).any(|ancestor| ancestor == id))
            .map(|res| res.id);
        self.ancestors(id).skip(1).chain(descendants)
    }

    /// 外部资源的物理句柄（子资源取最近的导入祖先）
    pub fn external_handle(&self, id: RgResourceId) -> Option<RgImported> {
        self.ancestors(id).find_map(|ancestor| self.get(ancestor).and_then(|res| res.imported))
    }

    /// 以 `name@vN` 的形式描述节点
    pub fn node_label(&self, id: RgResourceNodeId) -> String {
        let node = self.node(id);
        let name = self.get(node.resource).map(|res| res.name.as_str()).unwrap_or("<unknown>");
        format!("{}@v{}", name, node.version)
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn iter_resources(&self) -> impl Iterator<Item = &RgVirtualResource> {
        self.resources.iter()
    }

    #[inline]
    pub(crate) fn iter_resources_mut(&mut self) -> impl Iterator<Item = &mut RgVirtualResource> {
        self.resources.iter_mut()
    }

    #[inline]
    pub fn iter_nodes(&self) -> impl Iterator<Item = &RgResourceNode> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::resource::RgImportKind;
    use crate::frame_graph::resource_desc::{RgBufferDesc, RgBufferUsage, RgFormat, RgImageDesc, RgImageUsage};
    use crate::frame_graph::resource_handle::RgPhysicalHandle;

    fn image_desc() -> RgResourceDesc {
        RgImageDesc::new_2d(128, 128, RgFormat::Rgba8Unorm, RgImageUsage::COLOR_ATTACHMENT).into()
    }

    #[test]
    fn test_versions_create_distinct_nodes() {
        let mut registry = RgResourceRegistry::new();
        let v0 = registry.register("color", image_desc(), None, None).unwrap();

        let (v1, node1) = registry.bump_version(v0.id(), RgPassId(0));
        let (v2, node2) = registry.bump_version(v0.id(), RgPassId(1));

        assert_eq!(v1.version(), 1);
        assert_eq!(v2.version(), 2);
        assert_ne!(node1, node2);
        assert_eq!(registry.node(node1).writer, Some(RgPassId(0)));
        assert_eq!(registry.node(node2).writer, Some(RgPassId(1)));
        assert_eq!(registry.node_count(), 3);
        assert_eq!(registry.node_label(node2), "color@v2");
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut registry = RgResourceRegistry::new();
        let v0 = registry.register("color", image_desc(), None, None).unwrap();
        registry.bump_version(v0.id(), RgPassId(0));

        assert!(!registry.is_current(v0));
        assert!(registry.is_current(RgRawHandle::new(v0.id(), 1)));
    }

    #[test]
    fn test_invalid_descriptor_leaves_registry_untouched() {
        let mut registry = RgResourceRegistry::new();
        let result = registry.register("empty", RgBufferDesc::new(0, RgBufferUsage::STORAGE).into(), None, None);

        assert!(matches!(result, Err(RgError::InvalidDescriptor { .. })));
        assert_eq!(registry.resource_count(), 0);
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn test_subresource_chain() {
        let mut registry = RgResourceRegistry::new();
        let imported = RgImported {
            kind: RgImportKind::Resource,
            external: RgPhysicalHandle(7),
        };
        let root = registry.register("root", image_desc(), Some(imported), None).unwrap();
        let mid = registry.register("mid", image_desc(), None, Some(root.id())).unwrap();
        let leaf = registry.register("leaf", image_desc(), None, Some(mid.id())).unwrap();

        let chain: Vec<_> = registry.ancestors(leaf.id()).collect();
        assert_eq!(chain, vec![leaf.id(), mid.id(), root.id()]);
        assert!(registry.is_externally_backed(leaf.id()));
        assert_eq!(registry.external_handle(leaf.id()).map(|i| i.external), Some(RgPhysicalHandle(7)));
        assert_eq!(registry.aliases(mid.id()).collect::<Vec<_>>(), vec![root.id(), leaf.id()]);
        assert!(!registry.is_render_target_backed(leaf.id()));

        let orphan = registry.register("orphan", image_desc(), None, Some(RgResourceId(42)));
        assert!(matches!(orphan, Err(RgError::InvalidAliasParent { .. })));
    }
}
