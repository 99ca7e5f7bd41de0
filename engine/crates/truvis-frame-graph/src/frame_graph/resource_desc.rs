//! 资源描述
//!
//! 描述临时资源的尺寸、格式和用途，后端据此分配物理资源。
//! 描述在声明时就会被校验，自相矛盾的描述在声明阶段直接拒绝。

use bitflags::bitflags;

use super::resource_handle::RgResourceKind;

/// 图像格式
///
/// 只保留分配资源所需的信息，不涉及具体像素布局。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
    S8Uint,
}

impl RgFormat {
    /// 是否包含深度分量
    #[inline]
    pub fn has_depth(self) -> bool {
        matches!(self, Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// 是否包含模板分量
    #[inline]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::S8Uint | Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// 深度或模板格式
    #[inline]
    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8Srgb | Self::Bgra8Srgb)
    }
}

bitflags! {
    /// 图像用途
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RgImageUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const INPUT_ATTACHMENT = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

bitflags! {
    /// 缓冲区用途
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RgBufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const INDIRECT = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

/// 图像维度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgImageType {
    Type1D,
    Type2D,
    Type3D,
}

/// uniform buffer 的最大尺寸（字节）
pub const MAX_UNIFORM_BUFFER_SIZE: u64 = 64 * 1024;

/// 单张图像允许的最大采样数
pub const MAX_SAMPLE_COUNT: u32 = 64;

/// 图像资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgImageDesc {
    /// 图像宽度
    pub width: u32,
    /// 图像高度
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 图像格式
    pub format: RgFormat,
    /// 图像用途
    pub usage: RgImageUsage,
    /// 采样数
    pub samples: u32,
    /// 图像类型
    pub image_type: RgImageType,
}

impl Default for RgImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: RgFormat::Rgba8Unorm,
            usage: RgImageUsage::SAMPLED | RgImageUsage::STORAGE,
            samples: 1,
            image_type: RgImageType::Type2D,
        }
    }
}

// new & init
impl RgImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: RgFormat, usage: RgImageUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    /// 设置尺寸
    #[inline]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// 设置格式
    #[inline]
    pub fn with_format(mut self, format: RgFormat) -> Self {
        self.format = format;
        self
    }

    /// 设置用途
    #[inline]
    pub fn with_usage(mut self, usage: RgImageUsage) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    #[inline]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

// validate
impl RgImageDesc {
    /// 按当前尺寸可以拥有的最大 mip 级别数
    pub fn max_mip_levels(&self) -> u32 {
        let extent = self.width.max(self.height).max(self.depth);
        u32::BITS - extent.leading_zeros()
    }

    /// 校验描述是否自洽
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(format!("zero-sized extent {}x{}x{}", self.width, self.height, self.depth));
        }
        if self.mip_levels == 0 || self.array_layers == 0 {
            return Err("mip_levels and array_layers must be at least 1".to_string());
        }
        if self.usage.is_empty() {
            return Err("image usage is empty".to_string());
        }
        if self.mip_levels > self.max_mip_levels() {
            return Err(format!(
                "{} mip levels requested but a {}x{}x{} image has at most {}",
                self.mip_levels,
                self.width,
                self.height,
                self.depth,
                self.max_mip_levels()
            ));
        }
        if !self.samples.is_power_of_two() || self.samples > MAX_SAMPLE_COUNT {
            return Err(format!("unsupported sample count {}", self.samples));
        }

        match self.image_type {
            RgImageType::Type1D if self.height != 1 || self.depth != 1 => {
                return Err("1D image must have height and depth of 1".to_string());
            }
            RgImageType::Type2D if self.depth != 1 => {
                return Err("2D image must have depth of 1".to_string());
            }
            RgImageType::Type3D if self.array_layers != 1 => {
                return Err("3D image cannot be layered".to_string());
            }
            _ => {}
        }

        if self.samples > 1 {
            if self.mip_levels > 1 {
                return Err("multisampled image cannot have mip levels".to_string());
            }
            if self.image_type != RgImageType::Type2D {
                return Err("multisampled image must be 2D".to_string());
            }
            if self.usage.contains(RgImageUsage::STORAGE) {
                return Err("multisampled image cannot be used as storage".to_string());
            }
        }

        if self.format.is_depth_stencil() {
            if self.usage.intersects(RgImageUsage::COLOR_ATTACHMENT | RgImageUsage::STORAGE) {
                return Err(format!("depth/stencil format {:?} cannot be a color or storage image", self.format));
            }
        } else if self.usage.contains(RgImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            return Err(format!("color format {:?} cannot be a depth/stencil attachment", self.format));
        }

        if self.format.is_srgb() && self.usage.contains(RgImageUsage::STORAGE) {
            return Err(format!("sRGB format {:?} cannot be used as storage", self.format));
        }

        Ok(())
    }

    /// 判断 `self` 能否作为 `parent` 的子资源（视图）
    pub(crate) fn fits_within(&self, parent: &RgImageDesc) -> Result<(), String> {
        if self.width > parent.width || self.height > parent.height || self.depth > parent.depth {
            return Err(format!(
                "extent {}x{}x{} exceeds parent {}x{}x{}",
                self.width, self.height, self.depth, parent.width, parent.height, parent.depth
            ));
        }
        if self.mip_levels > parent.mip_levels || self.array_layers > parent.array_layers {
            return Err("subresource range exceeds parent".to_string());
        }
        if self.samples != parent.samples {
            return Err("sample count differs from parent".to_string());
        }
        if self.format.is_depth_stencil() != parent.format.is_depth_stencil() {
            return Err("depth/stencil and color formats cannot alias".to_string());
        }
        Ok(())
    }
}

/// 缓冲区资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: u64,
    /// 缓冲区用途
    pub usage: RgBufferUsage,
}

impl Default for RgBufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: RgBufferUsage::STORAGE,
        }
    }
}

// new & init
impl RgBufferDesc {
    /// 创建新描述
    #[inline]
    pub fn new(size: u64, usage: RgBufferUsage) -> Self {
        Self { size, usage }
    }
}

impl RgBufferDesc {
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("zero-sized buffer".to_string());
        }
        if self.usage.is_empty() {
            return Err("buffer usage is empty".to_string());
        }
        if self.usage.contains(RgBufferUsage::UNIFORM) && self.size > MAX_UNIFORM_BUFFER_SIZE {
            return Err(format!(
                "uniform buffer of {} bytes exceeds the {} byte limit",
                self.size, MAX_UNIFORM_BUFFER_SIZE
            ));
        }
        Ok(())
    }

    pub(crate) fn fits_within(&self, parent: &RgBufferDesc) -> Result<(), String> {
        if self.size > parent.size {
            return Err(format!("size {} exceeds parent size {}", self.size, parent.size));
        }
        Ok(())
    }
}

/// 任意资源的描述
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceDesc {
    Image(RgImageDesc),
    Buffer(RgBufferDesc),
}

impl RgResourceDesc {
    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        match self {
            RgResourceDesc::Image(_) => RgResourceKind::Image,
            RgResourceDesc::Buffer(_) => RgResourceKind::Buffer,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            RgResourceDesc::Image(desc) => desc.validate(),
            RgResourceDesc::Buffer(desc) => desc.validate(),
        }
    }

    #[inline]
    pub fn as_image(&self) -> Option<&RgImageDesc> {
        match self {
            RgResourceDesc::Image(desc) => Some(desc),
            RgResourceDesc::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn as_buffer(&self) -> Option<&RgBufferDesc> {
        match self {
            RgResourceDesc::Buffer(desc) => Some(desc),
            RgResourceDesc::Image(_) => None,
        }
    }

    /// 检查子资源描述是否落在父资源范围内
    pub(crate) fn fits_within(&self, parent: &RgResourceDesc) -> Result<(), String> {
        match (self, parent) {
            (RgResourceDesc::Image(child), RgResourceDesc::Image(parent)) => child.fits_within(parent),
            (RgResourceDesc::Buffer(child), RgResourceDesc::Buffer(parent)) => child.fits_within(parent),
            _ => Err(format!("a {} cannot alias a {}", self.kind(), parent.kind())),
        }
    }

    /// 以 key-value 形式列出描述字段，用于调试导出
    pub fn attributes(&self) -> Vec<(String, String)> {
        match self {
            RgResourceDesc::Image(desc) => vec![
                ("kind".to_string(), "image".to_string()),
                ("extent".to_string(), format!("{}x{}x{}", desc.width, desc.height, desc.depth)),
                ("format".to_string(), format!("{:?}", desc.format)),
                ("mip_levels".to_string(), desc.mip_levels.to_string()),
                ("array_layers".to_string(), desc.array_layers.to_string()),
                ("samples".to_string(), desc.samples.to_string()),
                ("usage".to_string(), format!("{:?}", desc.usage)),
            ],
            RgResourceDesc::Buffer(desc) => vec![
                ("kind".to_string(), "buffer".to_string()),
                ("size".to_string(), desc.size.to_string()),
                ("usage".to_string(), format!("{:?}", desc.usage)),
            ],
        }
    }
}

impl From<RgImageDesc> for RgResourceDesc {
    fn from(desc: RgImageDesc) -> Self {
        RgResourceDesc::Image(desc)
    }
}

impl From<RgBufferDesc> for RgResourceDesc {
    fn from(desc: RgBufferDesc) -> Self {
        RgResourceDesc::Buffer(desc)
    }
}
