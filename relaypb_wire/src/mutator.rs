//! 字节保留改写
//!
//! 按原始出现顺序拼接记录：被改写的字段换成预编码字节，其余记录（包括未知字段）逐字节复制。
//! 整个过程只操作字节区间，不解码任何字段。

use crate::error::WireError;
use crate::scanner::{FieldIndex, Scanner, WireType};
use crate::varint::{encode_varint, encode_zigzag32, encode_zigzag64, encoded_len_varint};
use crate::view::LazyMessage;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// 单个字段的改写
///
/// 保存完整的预编码记录（键 + [长度] + 负载），可以包含同一字段的多条记录；空字节表示清除该字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    tag: u32,
    encoded: Bytes,
}

impl Override {
    /// 使用调用方预编码的记录字节
    pub fn raw(tag: u32, encoded: impl Into<Bytes>) -> Self {
        Self {
            tag,
            encoded: encoded.into(),
        }
    }

    /// 清除字段的全部记录
    pub fn clear(tag: u32) -> Self {
        Self::raw(tag, Bytes::new())
    }

    pub fn string(tag: u32, value: &str) -> Self {
        Self::length_delimited(tag, value.as_bytes())
    }

    pub fn bytes(tag: u32, value: &[u8]) -> Self {
        Self::length_delimited(tag, value)
    }

    /// 嵌入已编码的子消息
    pub fn message(tag: u32, encoded: &[u8]) -> Self {
        Self::length_delimited(tag, encoded)
    }

    pub fn bool(tag: u32, value: bool) -> Self {
        Self::varint(tag, u64::from(value))
    }

    /// 负数按 64 位符号扩展编码，与线格式约定一致
    pub fn int32(tag: u32, value: i32) -> Self {
        Self::varint(tag, i64::from(value) as u64)
    }

    pub fn int64(tag: u32, value: i64) -> Self {
        Self::varint(tag, value as u64)
    }

    pub fn uint32(tag: u32, value: u32) -> Self {
        Self::varint(tag, u64::from(value))
    }

    pub fn uint64(tag: u32, value: u64) -> Self {
        Self::varint(tag, value)
    }

    pub fn sint32(tag: u32, value: i32) -> Self {
        Self::varint(tag, u64::from(encode_zigzag32(value)))
    }

    pub fn sint64(tag: u32, value: i64) -> Self {
        Self::varint(tag, encode_zigzag64(value))
    }

    pub fn enum_value(tag: u32, value: i32) -> Self {
        Self::int32(tag, value)
    }

    pub fn fixed32(tag: u32, value: u32) -> Self {
        Self::fixed(tag, WireType::Fixed32, &value.to_le_bytes())
    }

    pub fn sfixed32(tag: u32, value: i32) -> Self {
        Self::fixed(tag, WireType::Fixed32, &value.to_le_bytes())
    }

    pub fn float(tag: u32, value: f32) -> Self {
        Self::fixed(tag, WireType::Fixed32, &value.to_le_bytes())
    }

    pub fn fixed64(tag: u32, value: u64) -> Self {
        Self::fixed(tag, WireType::Fixed64, &value.to_le_bytes())
    }

    pub fn sfixed64(tag: u32, value: i64) -> Self {
        Self::fixed(tag, WireType::Fixed64, &value.to_le_bytes())
    }

    pub fn double(tag: u32, value: f64) -> Self {
        Self::fixed(tag, WireType::Fixed64, &value.to_le_bytes())
    }

    /// 重复字符串字段，每个元素一条记录
    pub fn repeated_strings<I, S>(tag: u32, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buf = BytesMut::new();
        for value in values {
            put_length_delimited(&mut buf, tag, value.as_ref().as_bytes());
        }
        Self::raw(tag, buf.freeze())
    }

    /// 字段编号
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// 预编码字节
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    /// 是否为清除操作
    pub fn is_clear(&self) -> bool {
        self.encoded.is_empty()
    }

    fn length_delimited(tag: u32, payload: &[u8]) -> Self {
        let mut buf = BytesMut::new();
        put_length_delimited(&mut buf, tag, payload);
        Self::raw(tag, buf.freeze())
    }

    fn varint(tag: u32, value: u64) -> Self {
        let mut buf = BytesMut::with_capacity(key_len(tag) + encoded_len_varint(value));
        put_key(&mut buf, tag, WireType::Varint);
        encode_varint(value, &mut buf);
        Self::raw(tag, buf.freeze())
    }

    fn fixed(tag: u32, wire_type: WireType, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(key_len(tag) + payload.len());
        put_key(&mut buf, tag, wire_type);
        buf.put_slice(payload);
        Self::raw(tag, buf.freeze())
    }
}

fn key_len(tag: u32) -> usize {
    prost::encoding::key_len(tag)
}

fn put_key(buf: &mut BytesMut, tag: u32, wire_type: WireType) {
    prost::encoding::encode_key(tag, wire_type.to_prost(), buf);
}

fn put_length_delimited(buf: &mut BytesMut, tag: u32, payload: &[u8]) {
    buf.reserve(key_len(tag) + encoded_len_varint(payload.len() as u64) + payload.len());
    put_key(buf, tag, WireType::LengthDelimited);
    encode_varint(payload.len() as u64, buf);
    buf.put_slice(payload);
}

/// 改写集合
///
/// 按字段编号排序，保证新增字段的追加顺序确定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: BTreeMap<u32, Bytes>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个改写，同一字段的旧改写被替换
    pub fn insert(&mut self, entry: Override) -> Option<Bytes> {
        self.entries.insert(entry.tag, entry.encoded)
    }

    /// 链式加入改写
    pub fn with(mut self, entry: Override) -> Self {
        self.insert(entry);
        self
    }

    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按字段编号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.entries.iter().map(|(tag, encoded)| (*tag, encoded))
    }
}

impl FromIterator<Override> for Overrides {
    fn from_iter<I: IntoIterator<Item = Override>>(iter: I) -> Self {
        let mut overrides = Overrides::new();
        overrides.extend(iter);
        overrides
    }
}

impl Extend<Override> for Overrides {
    fn extend<I: IntoIterator<Item = Override>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

/// 生成改写后的新缓冲区
///
/// - 改写字段在其第一条记录的位置输出，后续同号记录被跳过（整字段替换）
/// - 原消息中不存在的字段按编号升序追加到末尾
/// - 没有改写时直接返回原始缓冲区
pub fn mutate(view: &LazyMessage, overrides: &Overrides) -> Result<Bytes, WireError> {
    let index = view.index()?;
    let raw = view.raw_bytes();
    if overrides.is_empty() {
        return Ok(raw.clone());
    }

    for (tag, encoded) in overrides.iter() {
        if let Some(original) = index.first(tag) {
            validate_override(tag, encoded, original.wire_type)?;
        }
    }

    let mut out = BytesMut::with_capacity(output_capacity(raw.len(), index, overrides));
    let mut emitted = HashSet::new();
    let mut run: Option<(usize, usize)> = None;

    for record in index.records() {
        match overrides.get(record.tag) {
            None => {
                run = Some(match run {
                    Some((start, _)) => (start, record.end),
                    None => (record.key_start, record.end),
                });
            }
            Some(encoded) => {
                if let Some((start, end)) = run.take() {
                    out.put_slice(&raw[start..end]);
                }
                if emitted.insert(record.tag) {
                    out.put_slice(encoded);
                }
            }
        }
    }
    if let Some((start, end)) = run {
        out.put_slice(&raw[start..end]);
    }

    let mut appended = 0;
    for (tag, encoded) in overrides.iter() {
        if !index.contains(tag) {
            out.put_slice(encoded);
            appended += 1;
        }
    }

    debug!(
        message = view.descriptor().name(),
        input = raw.len(),
        output = out.len(),
        replaced = emitted.len(),
        appended,
        "改写完成"
    );
    Ok(out.freeze())
}

/// 改写嵌套消息中的字段
///
/// `path` 为从顶层到目标消息的字段编号；改写后的子消息作为整体替换回父消息
pub fn mutate_path(
    view: &mut LazyMessage,
    path: &[u32],
    overrides: &Overrides,
) -> Result<Bytes, WireError> {
    match path.split_first() {
        None => mutate(view, overrides),
        Some((&tag, rest)) => {
            let nested = view.message(tag)?;
            let rebuilt = mutate_path(nested, rest, overrides)?;
            let parent = Overrides::new().with(Override::message(tag, &rebuilt));
            mutate(view, &parent)
        }
    }
}

/// 已存在字段的改写必须是同号、同线类型的合法记录
fn validate_override(tag: u32, encoded: &[u8], expected: WireType) -> Result<(), WireError> {
    for record in Scanner::new(encoded) {
        let record = record.map_err(|e| WireError::InvalidOverride {
            tag,
            reason: e.to_string(),
        })?;
        if record.tag != tag {
            return Err(WireError::InvalidOverride {
                tag,
                reason: format!("包含字段 {} 的记录", record.tag),
            });
        }
        if record.wire_type != expected {
            return Err(WireError::UnsupportedOverrideType {
                tag,
                expected,
                found: record.wire_type,
            });
        }
    }
    Ok(())
}

fn output_capacity(raw_len: usize, index: &FieldIndex, overrides: &Overrides) -> usize {
    let replaced: usize = index
        .records()
        .iter()
        .filter(|record| overrides.contains(record.tag))
        .map(|record| record.end - record.key_start)
        .sum();
    let added: usize = overrides.iter().map(|(_, encoded)| encoded.len()).sum();
    raw_len - replaced + added
}
