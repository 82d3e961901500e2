//! 线格式扫描器
//!
//! 顺序遍历原始字节，产出 (字段编号, 线类型, 字节区间) 记录，不解释字段语义。
//!
//! ```text
//! +-----------+---------------+-----------------+
//! | key       | [length]      | payload         |
//! | varint    | varint (LD)   | variable        |
//! +-----------+---------------+-----------------+
//! ^key_start                  ^value_start      ^end
//! ```

use crate::error::WireError;
use crate::varint::decode_varint;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use tracing::trace;

/// 最大字段编号 (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// 线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// 变长整数
    Varint,
    /// 长度前缀 + 负载
    LengthDelimited,
    /// 4 字节小端
    Fixed32,
    /// 8 字节小端
    Fixed64,
}

impl WireType {
    /// 从键的低 3 位解析线类型
    ///
    /// group (3/4) 和保留值 (6/7) 不受支持
    pub fn from_raw(value: u64) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    /// 线类型在键中的编码值
    pub fn as_raw(self) -> u8 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::Fixed32 => 5,
        }
    }

    pub(crate) fn to_prost(self) -> prost::encoding::WireType {
        match self {
            WireType::Varint => prost::encoding::WireType::Varint,
            WireType::Fixed64 => prost::encoding::WireType::SixtyFourBit,
            WireType::LengthDelimited => prost::encoding::WireType::LengthDelimited,
            WireType::Fixed32 => prost::encoding::WireType::ThirtyTwoBit,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Varint => "VARINT",
            WireType::LengthDelimited => "LENGTH_DELIMITED",
            WireType::Fixed32 => "FIXED32",
            WireType::Fixed64 => "FIXED64",
        };
        f.write_str(name)
    }
}

/// 字段记录
///
/// 只保存相对于原始缓冲区的偏移，不复制字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRecord {
    /// 字段编号
    pub tag: u32,
    /// 线类型
    pub wire_type: WireType,
    /// 键的起始偏移
    pub key_start: usize,
    /// 负载起始偏移（长度前缀之后）
    pub value_start: usize,
    /// 负载结束偏移（不含）
    pub end: usize,
}

impl FieldRecord {
    /// 负载区间（不含键和长度前缀）
    pub fn value_span(&self) -> Range<usize> {
        self.value_start..self.end
    }

    /// 完整记录区间（键 + 长度前缀 + 负载）
    pub fn full_span(&self) -> Range<usize> {
        self.key_start..self.end
    }

    /// 键和长度前缀的字节数
    pub fn header_len(&self) -> usize {
        self.value_start - self.key_start
    }

    /// 负载字节数
    pub fn value_len(&self) -> usize {
        self.end - self.value_start
    }
}

/// 线格式扫描器
///
/// 以迭代器形式逐条产出记录；遇到错误后停止
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Scanner<'a> {
    /// 创建新的扫描器
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// 当前游标位置
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_record(&mut self) -> Result<FieldRecord, WireError> {
        let key_start = self.pos;
        let (key, key_len) = decode_varint(self.buf, key_start)?;

        let field_number = key >> 3;
        if field_number == 0 || field_number > u64::from(MAX_FIELD_NUMBER) {
            return Err(WireError::InvalidKey {
                offset: key_start,
                key,
            });
        }
        let wire_type = WireType::from_raw(key & 0x07).ok_or(WireError::InvalidKey {
            offset: key_start,
            key,
        })?;

        let cursor = key_start + key_len;
        let (value_start, end) = match wire_type {
            WireType::Varint => {
                let (_, len) = decode_varint(self.buf, cursor)?;
                (cursor, cursor + len)
            }
            WireType::Fixed32 => (cursor, self.ensure_len(cursor, 4)?),
            WireType::Fixed64 => (cursor, self.ensure_len(cursor, 8)?),
            WireType::LengthDelimited => {
                let (length, prefix_len) = decode_varint(self.buf, cursor)?;
                let length = usize::try_from(length).map_err(|_| WireError::LengthOverflow {
                    offset: cursor,
                    length,
                })?;
                let value_start = cursor + prefix_len;
                (value_start, self.ensure_len(value_start, length)?)
            }
        };

        self.pos = end;
        Ok(FieldRecord {
            tag: field_number as u32,
            wire_type,
            key_start,
            value_start,
            end,
        })
    }

    /// 确认 `start` 之后还有 `len` 字节，返回结束偏移
    fn ensure_len(&self, start: usize, len: usize) -> Result<usize, WireError> {
        let remaining = self.buf.len() - start;
        if len > remaining {
            return Err(WireError::TruncatedInput {
                offset: start,
                needed: len,
                remaining,
            });
        }
        Ok(start + len)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<FieldRecord, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let record = self.read_record();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}

/// 扫描整个缓冲区
///
/// 任何错误都使整次扫描失败，不返回部分结果
pub fn scan(buf: &[u8]) -> Result<Vec<FieldRecord>, WireError> {
    let records = Scanner::new(buf).collect::<Result<Vec<_>, _>>()?;
    trace!(bytes = buf.len(), fields = records.len(), "扫描完成");
    Ok(records)
}

/// 字段索引
///
/// 一次扫描的结果：按出现顺序保存的记录，以及字段编号到记录位置的映射
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    records: Vec<FieldRecord>,
    by_tag: HashMap<u32, Vec<usize>>,
}

impl FieldIndex {
    /// 扫描缓冲区并建立索引
    pub fn build(buf: &[u8]) -> Result<Self, WireError> {
        let records = scan(buf)?;
        let mut by_tag: HashMap<u32, Vec<usize>> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            by_tag.entry(record.tag).or_default().push(position);
        }
        Ok(Self { records, by_tag })
    }

    /// 按出现顺序的全部记录
    pub fn records(&self) -> &[FieldRecord] {
        &self.records
    }

    /// 指定字段的全部记录（出现顺序）
    pub fn records_for(&self, tag: u32) -> impl Iterator<Item = &FieldRecord> + '_ {
        self.by_tag
            .get(&tag)
            .into_iter()
            .flatten()
            .map(|&position| &self.records[position])
    }

    /// 指定字段的最后一条记录
    pub fn last(&self, tag: u32) -> Option<&FieldRecord> {
        self.by_tag
            .get(&tag)
            .and_then(|positions| positions.last())
            .map(|&position| &self.records[position])
    }

    /// 指定字段的第一条记录
    pub fn first(&self, tag: u32) -> Option<&FieldRecord> {
        self.by_tag
            .get(&tag)
            .and_then(|positions| positions.first())
            .map(|&position| &self.records[position])
    }

    /// 是否存在该字段
    pub fn contains(&self, tag: u32) -> bool {
        self.by_tag.contains_key(&tag)
    }

    /// 记录总数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否没有任何记录
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 出现过的字段编号数量
    pub fn distinct_tags(&self) -> usize {
        self.by_tag.len()
    }
}
