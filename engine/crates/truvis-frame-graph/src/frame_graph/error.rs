//! FrameGraph 错误类型
//!
//! 错误分为四类：
//! - 声明阶段被拒绝的操作（描述非法、导入资源的非法连接），graph 保持可编译；
//! - 声明阶段的逻辑错误（失效句柄、重复写入），说明调用方代码有 bug；
//! - 编译阶段的致命错误（循环依赖），整帧不产生执行计划；
//! - 执行阶段由后端报告的分配失败。

use thiserror::Error;

pub type RgResult<T> = Result<T, RgError>;

/// 后端分配物理资源失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RgAllocError {
    #[error("out of device memory ({requested} bytes requested)")]
    OutOfMemory { requested: u64 },
    #[error("unsupported resource: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RgError {
    #[error("invalid descriptor for \"{name}\": {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("imported render target \"{resource}\" cannot be connected as {usage} in pass \"{pass}\"; only color attachment use is allowed")]
    IllegalImportedUsage { resource: String, pass: String, usage: String },

    #[error("invalid alias parent for \"{name}\": {reason}")]
    InvalidAliasParent { name: String, reason: String },

    #[error("\"{resource}\" cannot be attached as {attachment} in pass \"{pass}\": {reason}")]
    InvalidAttachment {
        resource: String,
        pass: String,
        attachment: String,
        reason: String,
    },

    #[error("stale handle v{handle_version} of \"{resource}\" used in pass \"{pass}\", current version is v{current_version}")]
    StaleHandle {
        resource: String,
        pass: String,
        handle_version: u32,
        current_version: u32,
    },

    #[error("pass \"{pass}\" writes \"{resource}\" twice within one declaration")]
    DoubleWrite { pass: String, resource: String },

    #[error("handle refers to a {actual} but a {expected} was expected")]
    KindMismatch { expected: String, actual: String },

    #[error("unknown resource id {0}")]
    UnknownResource(u32),

    #[error("unknown pass id {0}")]
    UnknownPass(u32),

    #[error("frame graph contains a cycle through passes [{}] and resources [{}]", .passes.join(" -> "), .resources.join(", "))]
    Cycle { passes: Vec<String>, resources: Vec<String> },

    #[error("resource node \"{resource}\" has {writers} writers")]
    MultipleWriters { resource: String, writers: usize },

    #[error("{count} declaration(s) were rejected, first: {first}")]
    RejectedDeclarations { count: usize, first: Box<RgError> },

    #[error("failed to allocate \"{resource}\": {source}")]
    Allocation {
        resource: String,
        #[source]
        source: RgAllocError,
    },

    #[error("resource \"{resource}\" cannot be {action} while {state}")]
    PhysicalState {
        resource: String,
        action: &'static str,
        state: &'static str,
    },
}

impl RgError {
    /// 整帧无法继续的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RgError::Cycle { .. }
                | RgError::MultipleWriters { .. }
                | RgError::RejectedDeclarations { .. }
                | RgError::Allocation { .. }
                | RgError::PhysicalState { .. }
        )
    }

    /// 声明被拒绝但 graph 仍然有效的错误
    pub fn is_rejected_declaration(&self) -> bool {
        matches!(
            self,
            RgError::InvalidDescriptor { .. }
                | RgError::IllegalImportedUsage { .. }
                | RgError::InvalidAliasParent { .. }
                | RgError::InvalidAttachment { .. }
        )
    }

    /// 调用方误用 API 的逻辑错误
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            RgError::StaleHandle { .. }
                | RgError::DoubleWrite { .. }
                | RgError::KindMismatch { .. }
                | RgError::UnknownResource(_)
                | RgError::UnknownPass(_)
        )
    }
}
