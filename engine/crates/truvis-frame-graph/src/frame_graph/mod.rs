//! FrameGraph - 临时资源的版本管理与生命周期调度
//!
//! Pass 对虚拟资源声明读写，FrameGraph 据此构建依赖图，裁剪没有副作用的 Pass，
//! 计算执行顺序，并为每个临时资源决定在哪个 Pass 之前分配、在哪个 Pass 之后销毁。
//!
//! # 核心概念
//!
//! - **RgImageHandle / RgBufferHandle**: 带版本号的虚拟资源句柄，每次写入产生新版本
//! - **RgPass**: Pass trait，声明资源依赖和执行逻辑
//! - **FrameGraph**: 构建器，用于注册资源和 Pass
//! - **CompiledGraph**: 编译结果，包含执行顺序和每个 Pass 的 devirtualize / destroy 指令
//! - **RgBackend**: 后端接口，负责真正分配和销毁物理资源
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_frame_graph::frame_graph::*;
//!
//! struct LightingPass {
//!     gbuffer: RgImageHandle,
//!     target: RgImageHandle,
//! }
//!
//! impl RgPass for LightingPass {
//!     fn setup(&mut self, builder: &mut RgPassBuilder<'_>) -> RgResult<()> {
//!         builder.sample(self.gbuffer)?;
//!         self.target = builder.write_attachment(self.target, RgAttachment::Color(0))?;
//!         Ok(())
//!     }
//!
//!     fn execute(&self, ctx: &mut RgPassContext<'_>) {
//!         let gbuffer = ctx.get(self.gbuffer);
//!         let target = ctx.get(self.target);
//!         let device = ctx.backend::<MyBackend>();
//!         // 录制命令...
//!     }
//! }
//!
//! let mut fg = FrameGraph::new();
//! let swapchain = fg.import_render_target("swapchain", swapchain_handle, swapchain_desc)?;
//! let gbuffer = fg.create_image("gbuffer", gbuffer_desc)?;
//! fg.add_pass("gbuffer", GBufferPass { gbuffer })?;
//! fg.add_pass("lighting", LightingPass { gbuffer, target: swapchain })?;
//!
//! let compiled = fg.compile()?;
//! compiled.execute(&mut backend)?;
//! ```
//!
//! # 模块结构
//!
//! - `resource_handle`: 虚拟资源句柄定义
//! - `resource_desc`: 资源描述与校验
//! - `resource` / `resource_registry`: 虚拟资源、资源节点和注册表
//! - `pass`: Pass trait、builder 和执行上下文
//! - `graph`: 依赖图、环检测和可达性
//! - `compiler`: 裁剪、排序和生命周期计算
//! - `executor`: 后端接口和执行
//! - `export_info`: 调试导出

mod compiler;
mod error;
mod executor;
mod export_info;
#[allow(clippy::module_inception)]
mod frame_graph;
mod graph;
mod options;
mod pass;
mod resource;
mod resource_desc;
mod resource_handle;
mod resource_registry;

// Re-exports
pub use error::{RgAllocError, RgError, RgResult};
pub use executor::{RgAllocRequest, RgBackend, RgPhysicalState, RgPhysicalTable};
pub use export_info::{RgGraphInfo, RgPassInfo, RgResourceInfo};
pub use frame_graph::{CompiledGraph, FrameGraph};
pub use graph::{DependencyGraph, RgEdgeKind, RgNodeKind};
pub use options::RgCompileOptions;
pub use pass::{RgAttachment, RgPass, RgPassBuilder, RgPassContext, RgPassNode};
pub use resource::{RgImportKind, RgImported, RgResourceNode, RgVirtualResource};
pub use resource_desc::{
    MAX_SAMPLE_COUNT, MAX_UNIFORM_BUFFER_SIZE, RgBufferDesc, RgBufferUsage, RgFormat, RgImageDesc, RgImageType,
    RgImageUsage, RgResourceDesc,
};
pub use resource_handle::{
    RgBufferHandle, RgHandle, RgImageHandle, RgPassId, RgPhysicalHandle, RgRawHandle, RgResourceId, RgResourceKind,
    RgResourceNodeId,
};
pub use resource_registry::RgResourceRegistry;
