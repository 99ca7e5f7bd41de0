//! 编译选项

use serde::Deserialize;

/// FrameGraph 编译选项
///
/// 可以在代码中构造，也可以从 toml 读取：
///
/// ```toml
/// cull_passes = true
/// strict_imported_usage = false
/// log_execution_plan = false
/// validate_single_writer = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RgCompileOptions {
    /// 裁剪没有副作用的 Pass；关闭后所有 Pass 都会执行
    pub cull_passes: bool,
    /// 外部渲染目标的非法连接在编译时报错，而不只是丢弃该连接
    pub strict_imported_usage: bool,
    /// 编译完成后打印执行计划
    pub log_execution_plan: bool,
    /// 编译时检查每个资源节点至多一个写入者
    pub validate_single_writer: bool,
}

impl Default for RgCompileOptions {
    fn default() -> Self {
        Self {
            cull_passes: true,
            strict_imported_usage: false,
            log_execution_plan: false,
            validate_single_writer: true,
        }
    }
}

impl RgCompileOptions {
    /// 从 toml 文本读取，缺省字段使用默认值
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    #[inline]
    pub fn with_cull_passes(mut self, cull_passes: bool) -> Self {
        self.cull_passes = cull_passes;
        self
    }

    #[inline]
    pub fn with_strict_imported_usage(mut self, strict: bool) -> Self {
        self.strict_imported_usage = strict;
        self
    }

    #[inline]
    pub fn with_log_execution_plan(mut self, log_plan: bool) -> Self {
        self.log_execution_plan = log_plan;
        self
    }

    #[inline]
    pub fn with_validate_single_writer(mut self, validate: bool) -> Self {
        self.validate_single_writer = validate;
        self
    }
}
