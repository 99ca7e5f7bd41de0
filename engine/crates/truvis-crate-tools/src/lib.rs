//! 在各个 crate 之间共享的工具

mod init_log;

pub use init_log::{init_log, init_log_with_level, init_test_log};
