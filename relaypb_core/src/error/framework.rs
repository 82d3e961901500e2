//! relaypb 框架错误类型
//!
//! 汇总线格式、Schema、配置、路由和分发各层的错误。

use super::context::ErrorContext;
use std::error::Error as StdError;
use thiserror::Error;

/// relaypb 框架错误类型
#[derive(Error, Debug)]
pub enum RelayError {
    /// 线格式错误（扫描、字段解码、改写）
    ///
    /// `fatal` 表示整条消息无法解析；`source` 保留原始的类型化错误
    #[error("线格式错误: {message}")]
    Wire {
        message: String,
        fatal: bool,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Schema 错误
    #[error("Schema 错误: {0}")]
    Schema(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 路由错误
    #[error("路由错误: {0}")]
    Router(String),

    /// 分发错误（Worker 池、通道）
    #[error("分发错误: {0}")]
    Dispatch(String),

    /// 超时错误
    #[error("操作超时")]
    Timeout,

    /// 验证错误
    #[error("验证失败: {0}")]
    Validation(String),

    /// 带上下文的错误
    #[error("{1}: {0}")]
    WithContext(#[source] Box<RelayError>, ErrorContext),
}

impl RelayError {
    /// 获取错误类型
    ///
    /// 带上下文的错误返回内部错误的类型
    pub fn kind(&self) -> RelayErrorKind {
        match self {
            RelayError::Wire { .. } => RelayErrorKind::Wire,
            RelayError::Schema(_) => RelayErrorKind::Schema,
            RelayError::Config(_) => RelayErrorKind::Config,
            RelayError::Router(_) => RelayErrorKind::Router,
            RelayError::Dispatch(_) => RelayErrorKind::Dispatch,
            RelayError::Timeout => RelayErrorKind::Timeout,
            RelayError::Validation(_) => RelayErrorKind::Validation,
            RelayError::WithContext(inner, _) => inner.kind(),
        }
    }

    /// 是否为消息级的致命错误（无法扫描），调用方据此决定丢弃还是原样转发
    pub fn is_fatal(&self) -> bool {
        match self {
            RelayError::Wire { fatal, .. } => *fatal,
            RelayError::WithContext(inner, _) => inner.is_fatal(),
            _ => false,
        }
    }

    /// 取回线格式错误携带的原始错误，穿透上下文包装
    pub fn find_source<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            RelayError::Wire {
                source: Some(source),
                ..
            } => source.downcast_ref::<E>(),
            RelayError::WithContext(inner, _) => inner.find_source(),
            _ => None,
        }
    }

    /// 添加上下文信息
    pub fn with_context<C>(self, context: C) -> Self
    where
        C: Into<ErrorContext>,
    {
        RelayError::WithContext(Box::new(self), context.into())
    }

    /// 创建线格式错误
    pub fn wire(msg: impl Into<String>) -> Self {
        RelayError::Wire {
            message: msg.into(),
            fatal: false,
            source: None,
        }
    }

    /// 由类型化的线格式错误创建
    pub fn wire_source<E>(err: E, fatal: bool) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        RelayError::Wire {
            message: err.to_string(),
            fatal,
            source: Some(Box::new(err)),
        }
    }

    /// 创建 Schema 错误
    pub fn schema(msg: impl Into<String>) -> Self {
        RelayError::Schema(msg.into())
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// 创建路由错误
    pub fn router(msg: impl Into<String>) -> Self {
        RelayError::Router(msg.into())
    }

    /// 创建分发错误
    pub fn dispatch(msg: impl Into<String>) -> Self {
        RelayError::Dispatch(msg.into())
    }

    /// 创建超时错误
    pub fn timeout() -> Self {
        RelayError::Timeout
    }

    /// 创建验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        RelayError::Validation(msg.into())
    }
}

/// 错误类型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayErrorKind {
    /// 线格式错误
    Wire,
    /// Schema 错误
    Schema,
    /// 配置错误
    Config,
    /// 路由错误
    Router,
    /// 分发错误
    Dispatch,
    /// 超时错误
    Timeout,
    /// 验证错误
    Validation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RelayError::router("no route for execZ");
        assert!(matches!(err, RelayError::Router(_)));
        assert_eq!(err.kind(), RelayErrorKind::Router);
    }

    #[test]
    fn test_error_with_context_keeps_kind() {
        let err = RelayError::wire("truncated").with_context(7u64);
        assert!(matches!(err, RelayError::WithContext(_, _)));
        assert_eq!(err.kind(), RelayErrorKind::Wire);
        assert_eq!(err.to_string(), "消息 #7: 线格式错误: truncated");
    }

    #[test]
    fn test_wire_source_survives_context() {
        let err = RelayError::wire_source(std::fmt::Error, true).with_context(3u64);
        assert_eq!(err.kind(), RelayErrorKind::Wire);
        assert!(err.is_fatal());
        assert!(err.find_source::<std::fmt::Error>().is_some());
        assert!(err.find_source::<std::io::Error>().is_none());
        assert!(StdError::source(&err).is_some());

        let plain = RelayError::wire("bad field");
        assert!(!plain.is_fatal());
        assert!(plain.find_source::<std::fmt::Error>().is_none());
        assert!(!RelayError::router("no route").is_fatal());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RelayError::config("").kind(), RelayErrorKind::Config);
        assert_eq!(RelayError::dispatch("").kind(), RelayErrorKind::Dispatch);
        assert_eq!(RelayError::timeout().kind(), RelayErrorKind::Timeout);
    }
}
