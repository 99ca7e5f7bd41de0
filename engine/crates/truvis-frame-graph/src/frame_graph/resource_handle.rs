//! FrameGraph 资源句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与后端的物理句柄分离。
//! 每个句柄包含版本号：Pass 每写入一次资源就产生一个新版本，
//! 旧版本的句柄随之失效，不能再被读取或写入。

use std::fmt;

/// 虚拟资源在注册表中的索引
///
/// 同一资源的所有版本共享同一个 id。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RgResourceId(pub(crate) u32);

impl RgResourceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// 资源节点（资源的某一个版本）在 arena 中的索引
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RgResourceNodeId(pub(crate) u32);

impl RgResourceNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pass 的索引，同时也是 Pass 的声明顺序
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RgPassId(pub(crate) u32);

impl RgPassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// 后端分配出的物理资源句柄
///
/// 对 graph 来说是不透明的 64 位值，具体含义由 `RgBackend` 实现决定。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct RgPhysicalHandle(pub u64);

/// 资源类别
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RgResourceKind {
    Image,
    Buffer,
}

impl fmt::Display for RgResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RgResourceKind::Image => write!(f, "image"),
            RgResourceKind::Buffer => write!(f, "buffer"),
        }
    }
}

/// 不区分资源类别的句柄：资源 id + 版本号
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgRawHandle {
    pub(crate) id: RgResourceId,
    pub(crate) version: u32,
}

impl RgRawHandle {
    #[inline]
    pub(crate) fn new(id: RgResourceId, version: u32) -> Self {
        Self { id, version }
    }

    #[inline]
    pub fn id(&self) -> RgResourceId {
        self.id
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Debug for RgRawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rg({}.v{})", self.id.0, self.version)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// 带类型的资源句柄
///
/// 只有 [`RgImageHandle`] 和 [`RgBufferHandle`] 实现此 trait，
/// builder 上的 read / write 等方法对两者通用。
pub trait RgHandle: Copy + fmt::Debug + sealed::Sealed {
    const KIND: RgResourceKind;

    fn raw(self) -> RgRawHandle;

    #[doc(hidden)]
    fn from_raw(raw: RgRawHandle) -> Self;

    /// 获取资源 ID
    #[inline]
    fn id(self) -> RgResourceId {
        self.raw().id
    }

    /// 获取版本号
    #[inline]
    fn version(self) -> u32 {
        self.raw().version
    }
}

/// Graph 内部的 Image 句柄
///
/// 用于在 FrameGraph 构建阶段引用图像资源（纹理、渲染目标）。
/// `version` 字段跟踪资源被写入的次数，用于依赖分析。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgImageHandle {
    raw: RgRawHandle,
}

impl sealed::Sealed for RgImageHandle {}

impl RgHandle for RgImageHandle {
    const KIND: RgResourceKind = RgResourceKind::Image;

    #[inline]
    fn raw(self) -> RgRawHandle {
        self.raw
    }

    #[inline]
    fn from_raw(raw: RgRawHandle) -> Self {
        Self { raw }
    }
}

impl fmt::Debug for RgImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgImage({}.v{})", self.raw.id.0, self.raw.version)
    }
}

/// Graph 内部的 Buffer 句柄
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgBufferHandle {
    raw: RgRawHandle,
}

impl sealed::Sealed for RgBufferHandle {}

impl RgHandle for RgBufferHandle {
    const KIND: RgResourceKind = RgResourceKind::Buffer;

    #[inline]
    fn raw(self) -> RgRawHandle {
        self.raw
    }

    #[inline]
    fn from_raw(raw: RgRawHandle) -> Self {
        Self { raw }
    }
}

impl fmt::Debug for RgBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgBuffer({}.v{})", self.raw.id.0, self.raw.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug_format() {
        let image = RgImageHandle::from_raw(RgRawHandle::new(RgResourceId(3), 1));
        let buffer = RgBufferHandle::from_raw(RgRawHandle::new(RgResourceId(0), 2));

        assert_eq!(format!("{:?}", image), "RgImage(3.v1)");
        assert_eq!(format!("{:?}", buffer), "RgBuffer(0.v2)");
    }

    #[test]
    fn test_handle_identity_includes_version() {
        let v0 = RgImageHandle::from_raw(RgRawHandle::new(RgResourceId(1), 0));
        let v1 = RgImageHandle::from_raw(RgRawHandle::new(RgResourceId(1), 1));

        assert_eq!(v0.id(), v1.id());
        assert_ne!(v0, v1);
        assert_eq!(v1.version(), 1);
    }
}
