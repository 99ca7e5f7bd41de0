//! 可选的 tracy 性能标记
//!
//! 开启 `profiling` feature 后 `profile_scope!` 会创建一个 tracy span，
//! 否则展开为空。使用前需要由应用启动 `tracy_client::Client`。

macro_rules! profile_scope {
    ($name:expr) => {
        #[cfg(feature = "profiling")]
        let _profile_span = tracy_client::span!($name);
    };
}
