//! relaypb 核心错误类型
//!
//! 提供各子 crate 共用的错误分类和上下文。

pub mod error;

// 导出主要类型到 crate root
pub use crate::error::{ErrorContext, RelayError, RelayErrorKind, Result};

// 预导出
pub mod prelude {
    pub use crate::error::{ErrorContext, RelayError, RelayErrorKind, Result};
}
