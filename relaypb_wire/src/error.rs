//! 线格式与 Schema 错误
//!
//! 扫描错误对整条消息是致命的；字段级错误交由调用方决定丢弃还是原样转发。

use crate::scanner::WireType;
use relaypb_core::RelayError;
use thiserror::Error;

/// 线格式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// 变长整数、长度前缀、负载或定长字段越过缓冲区末尾
    #[error("输入被截断: 偏移 {offset} 处需要 {needed} 字节, 仅剩 {remaining} 字节")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// 变长整数超过 10 字节仍未结束，或溢出 64 位
    #[error("畸形 varint: 偏移 {offset}")]
    MalformedVarint { offset: usize },

    /// 字段编号为 0、超出范围，或线类型不受支持
    #[error("无效的字段键: 偏移 {offset} 处的键值 {key:#x}")]
    InvalidKey { offset: usize, key: u64 },

    /// 长度前缀超出 usize 表示范围
    #[error("长度前缀溢出: 偏移 {offset} 处的长度 {length}")]
    LengthOverflow { offset: usize, length: u64 },

    /// 字段的线类型与声明类型不兼容，或负载无法按声明类型解释
    #[error("字段 {tag} 解码失败: {reason}")]
    FieldDecode { tag: u32, reason: String },

    /// 描述符中不存在该字段
    #[error("未知字段: {tag}")]
    UnknownField { tag: u32 },

    /// 该字段不是单值消息类型，无法下钻
    #[error("字段 {tag} 不是消息类型")]
    NotAMessage { tag: u32 },

    /// 字段路径为空
    #[error("字段路径为空")]
    EmptyPath,

    /// 改写字节的线类型与原始记录不一致
    #[error("字段 {tag} 的改写线类型不匹配: 原始为 {expected}, 改写为 {found}")]
    UnsupportedOverrideType {
        tag: u32,
        expected: WireType,
        found: WireType,
    },

    /// 改写字节本身不是合法的线格式，或包含其他字段的记录
    #[error("字段 {tag} 的改写字节无效: {reason}")]
    InvalidOverride { tag: u32, reason: String },
}

impl WireError {
    /// 是否为扫描级错误（整条消息不可用）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireError::TruncatedInput { .. }
                | WireError::MalformedVarint { .. }
                | WireError::InvalidKey { .. }
                | WireError::LengthOverflow { .. }
        )
    }
}

/// Schema 构建和加载错误
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// 同一消息内字段编号重复
    #[error("消息 {message} 中字段编号重复: {tag}")]
    DuplicateTag { message: String, tag: u32 },

    /// 同一消息内字段名重复
    #[error("消息 {message} 中字段名重复: {name}")]
    DuplicateName { message: String, name: String },

    /// 字段编号超出合法范围
    #[error("消息 {message} 中字段编号无效: {tag}")]
    InvalidTag { message: String, tag: u32 },

    /// 消息已注册
    #[error("消息已存在: {0}")]
    MessageAlreadyExists(String),

    /// 消息未注册
    #[error("消息未注册: {0}")]
    MessageNotRegistered(String),

    /// 字段路径中的字段不存在
    #[error("消息 {message} 中不存在字段: {name}")]
    UnknownField { message: String, name: String },

    /// 字段路径的中间段不是单值消息字段
    #[error("消息 {message} 的字段 {name} 不是单值消息，无法继续解析路径")]
    NotAMessage { message: String, name: String },

    /// 字段类型既不是标量也不是已声明的消息
    #[error("消息 {message} 的字段 {field} 引用了未知类型: {type_name}")]
    UnknownType {
        message: String,
        field: String,
        type_name: String,
    },

    /// 递归引用的目标描述符已随描述符表释放
    #[error("消息描述符已释放: {0}")]
    Released(String),

    /// Schema 文档解析失败
    #[error("解析 Schema 失败: {0}")]
    Parse(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WireError> for RelayError {
    fn from(err: WireError) -> Self {
        let fatal = err.is_fatal();
        RelayError::wire_source(err, fatal)
    }
}

impl From<DescriptorError> for RelayError {
    fn from(err: DescriptorError) -> Self {
        RelayError::schema(err.to_string())
    }
}
