//! 错误上下文
//!
//! 记录出错时所处的消息和字段位置。

use std::fmt;

/// 错误上下文信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    /// 出错的入站消息序列号
    Message(u64),
    /// 出错的字段路径（字段编号序列）
    FieldPath(Vec<u32>),
    /// 键值对上下文
    KeyValue(String, String),
    /// 自定义上下文
    Custom(String),
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::Message(seq) => write!(f, "消息 #{}", seq),
            ErrorContext::FieldPath(path) => {
                write!(f, "字段 ")?;
                for (i, tag) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", tag)?;
                }
                Ok(())
            }
            ErrorContext::KeyValue(key, value) => write!(f, "{}: {}", key, value),
            ErrorContext::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<u64> for ErrorContext {
    fn from(sequence_id: u64) -> Self {
        ErrorContext::Message(sequence_id)
    }
}

impl From<&[u32]> for ErrorContext {
    fn from(path: &[u32]) -> Self {
        ErrorContext::FieldPath(path.to_vec())
    }
}

impl From<(&str, String)> for ErrorContext {
    fn from((key, value): (&str, String)) -> Self {
        ErrorContext::KeyValue(key.to_string(), value)
    }
}

impl From<(&str, &str)> for ErrorContext {
    fn from((key, value): (&str, &str)) -> Self {
        ErrorContext::KeyValue(key.to_string(), value.to_string())
    }
}

impl From<String> for ErrorContext {
    fn from(msg: String) -> Self {
        ErrorContext::Custom(msg)
    }
}

impl From<&str> for ErrorContext {
    fn from(msg: &str) -> Self {
        ErrorContext::Custom(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_field_path() {
        let path: &[u32] = &[1, 3];
        let ctx: ErrorContext = path.into();
        assert_eq!(ctx.to_string(), "字段 1.3");
    }

    #[test]
    fn test_context_message() {
        let ctx: ErrorContext = 42u64.into();
        assert_eq!(ctx, ErrorContext::Message(42));
        assert_eq!(ctx.to_string(), "消息 #42");
    }

    #[test]
    fn test_context_from_tuple() {
        let ctx: ErrorContext = ("destination", "execA").into();
        assert_eq!(ctx.to_string(), "destination: execA");
    }
}
