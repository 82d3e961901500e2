//! 惰性消息视图
//!
//! 包装一条消息的原始字节：首次访问时扫描一次建立字段索引，字段在被请求时才解码并缓存。
//! 视图属于处理该消息的单个 Worker，可以跨线程移动，但不能共享。

use crate::descriptor::{FieldType, MessageDescriptor};
use crate::error::WireError;
use crate::mutator::{self, Overrides};
use crate::scanner::{FieldIndex, FieldRecord};
use crate::value::{Value, decode_record, decode_repeated_record, nested_descriptor};
use bytes::{Bytes, BytesMut};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// 惰性消息视图
#[derive(Debug, Clone)]
pub struct LazyMessage {
    /// 原始字节，从不原地修改
    raw: Bytes,
    descriptor: Arc<MessageDescriptor>,
    /// 扫描结果；失败也会被记住，索引从不重建
    index: OnceCell<Result<FieldIndex, WireError>>,
    cache: HashMap<u32, Value>,
}

impl LazyMessage {
    /// 创建新的视图，不做任何扫描
    pub fn new(raw: impl Into<Bytes>, descriptor: Arc<MessageDescriptor>) -> Self {
        Self {
            raw: raw.into(),
            descriptor,
            index: OnceCell::new(),
            cache: HashMap::new(),
        }
    }

    /// 原始字节
    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// 取回原始字节并丢弃视图
    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// 字段索引，首次调用时扫描
    pub fn index(&self) -> Result<&FieldIndex, WireError> {
        self.index
            .get_or_init(|| FieldIndex::build(&self.raw))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// 是否已经扫描过
    pub fn is_scanned(&self) -> bool {
        self.index.get().is_some()
    }

    /// 字段是否已解码缓存
    pub fn is_cached(&self, tag: u32) -> bool {
        self.cache.contains_key(&tag)
    }

    /// 字段是否出现在消息中，只查索引不解码
    pub fn has(&self, tag: u32) -> Result<bool, WireError> {
        Ok(self.index()?.contains(tag))
    }

    /// 获取字段值
    ///
    /// 字段缺失时返回类型零值；未在描述符中声明的字段返回 `UnknownField`
    pub fn get(&mut self, tag: u32) -> Result<&Value, WireError> {
        let value = match self.cache.remove(&tag) {
            Some(value) => value,
            None => self.materialize(tag)?,
        };
        Ok(self.cache.entry(tag).or_insert(value))
    }

    /// 下钻到单值消息字段，返回保留自身缓存的嵌套视图
    pub fn message(&mut self, tag: u32) -> Result<&mut LazyMessage, WireError> {
        self.get(tag)?;
        self.cache
            .get_mut(&tag)
            .and_then(Value::as_message_mut)
            .ok_or(WireError::NotAMessage { tag })
    }

    /// 沿字段编号路径获取值，例如 `[1, 3]` 即 `header.target`
    pub fn get_path(&mut self, path: &[u32]) -> Result<&Value, WireError> {
        let (last, parents) = path.split_last().ok_or(WireError::EmptyPath)?;
        let mut view = self;
        for &tag in parents {
            view = view.message(tag)?;
        }
        view.get(*last)
    }

    /// 沿字段编号路径检查字段是否存在
    ///
    /// 中间的消息字段会被物化为嵌套视图，最后一段只查索引
    pub fn has_path(&mut self, path: &[u32]) -> Result<bool, WireError> {
        let (last, parents) = path.split_last().ok_or(WireError::EmptyPath)?;
        let mut view = self;
        for &tag in parents {
            if !view.has(tag)? {
                return Ok(false);
            }
            view = view.message(tag)?;
        }
        view.has(*last)
    }

    /// 指定字段的全部原始记录
    pub fn records(&self, tag: u32) -> Result<Vec<FieldRecord>, WireError> {
        Ok(self.index()?.records_for(tag).copied().collect())
    }

    /// 描述符中未声明的字段记录
    pub fn unknown_fields(&self) -> Result<Vec<FieldRecord>, WireError> {
        Ok(self
            .index()?
            .records()
            .iter()
            .filter(|record| self.descriptor.lookup(record.tag).is_none())
            .copied()
            .collect())
    }

    /// 记录总数
    pub fn field_count(&self) -> Result<usize, WireError> {
        Ok(self.index()?.len())
    }

    /// 基于本视图做字节保留改写
    pub fn mutate(&self, overrides: &Overrides) -> Result<Bytes, WireError> {
        mutator::mutate(self, overrides)
    }

    fn materialize(&self, tag: u32) -> Result<Value, WireError> {
        let field = self
            .descriptor
            .lookup(tag)
            .ok_or(WireError::UnknownField { tag })?;
        let index = self.index()?;
        self.descriptor.record_materialization();

        if field.is_repeated() {
            let mut items = Vec::new();
            for record in index.records_for(tag) {
                decode_repeated_record(field, record, &self.raw, &mut items)?;
            }
            return Ok(Value::Repeated(items));
        }

        if let FieldType::Message(nested) = field.field_type() {
            // 同一消息字段出现多次时按线格式合并语义拼接负载
            let records: Vec<&FieldRecord> = index.records_for(tag).collect();
            if records.len() > 1 {
                let mut merged = BytesMut::new();
                for record in &records {
                    decode_record(field, record, &self.raw)?;
                    merged.extend_from_slice(&self.raw[record.value_span()]);
                }
                return Ok(Value::Message(LazyMessage::new(
                    merged.freeze(),
                    nested_descriptor(tag, nested)?,
                )));
            }
        }

        match index.last(tag) {
            Some(record) => decode_record(field, record, &self.raw),
            None => Value::default_for(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldType;

    fn header() -> Arc<MessageDescriptor> {
        MessageDescriptor::builder("Header")
            .field(1, "request_id", FieldType::String)
            .field(2, "status", FieldType::String)
            .field(3, "target", FieldType::String)
            .field(4, "attempt", FieldType::Uint32)
            .build()
            .unwrap()
    }

    fn ld(tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![((tag << 3) | 2) as u8, payload.len() as u8];
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_new_view_is_not_scanned() {
        let view = LazyMessage::new(ld(3, b"execA"), header());
        assert!(!view.is_scanned());
        assert!(!view.is_cached(3));
    }

    #[test]
    fn test_get_and_has() {
        let mut buf = ld(1, b"r1");
        buf.extend(ld(3, b"execA"));
        let mut view = LazyMessage::new(buf, header());

        assert!(view.has(3).unwrap());
        assert!(!view.has(2).unwrap());
        assert!(view.is_scanned());
        assert!(!view.is_cached(3));

        assert_eq!(view.get(3).unwrap().as_str(), Some("execA"));
        assert!(view.is_cached(3));
        assert!(!view.is_cached(1));
    }

    #[test]
    fn test_absent_field_yields_default() {
        let mut view = LazyMessage::new(ld(1, b"r1"), header());
        assert_eq!(view.get(2).unwrap().as_str(), Some(""));
        assert_eq!(view.get(4).unwrap(), &Value::Uint32(0));
    }

    #[test]
    fn test_unknown_field_is_error() {
        let mut view = LazyMessage::new(ld(9, b"opaque"), header());
        assert!(view.has(9).unwrap());
        assert_eq!(view.get(9), Err(WireError::UnknownField { tag: 9 }));
        assert_eq!(view.unknown_fields().unwrap().len(), 1);
    }

    #[test]
    fn test_last_record_wins_for_scalars() {
        let mut buf = ld(2, b"pending");
        buf.extend(ld(2, b"running"));
        let mut view = LazyMessage::new(buf, header());
        assert_eq!(view.get(2).unwrap().as_str(), Some("running"));
        assert_eq!(view.records(2).unwrap().len(), 2);
    }

    #[test]
    fn test_scan_error_is_remembered() {
        let mut view = LazyMessage::new(vec![0x0a, 0x96], header());
        assert!(matches!(view.has(1), Err(WireError::TruncatedInput { .. })));
        assert!(matches!(view.get(1), Err(WireError::TruncatedInput { .. })));
        assert!(view.is_scanned());
    }

    #[test]
    fn test_cache_returns_same_value() {
        let mut view = LazyMessage::new(ld(3, b"execA"), header());
        view.get(3).unwrap();
        let before = view.descriptor().materializations();
        assert_eq!(view.get(3).unwrap().as_str(), Some("execA"));
        assert_eq!(view.descriptor().materializations(), before);
    }

    #[test]
    fn test_raw_bytes_untouched() {
        let mut buf = ld(1, b"r1");
        buf.extend(ld(9, b"unknown"));
        let mut view = LazyMessage::new(buf.clone(), header());
        view.get(1).unwrap();
        assert_eq!(&view.raw_bytes()[..], buf.as_slice());
    }

    #[test]
    fn test_nested_path() {
        let header = header();
        let envelope = MessageDescriptor::builder("Envelope")
            .message_field(1, "header", &header)
            .build()
            .unwrap();

        let buf = ld(1, &ld(3, b"execA"));
        let mut view = LazyMessage::new(buf, envelope);
        assert!(view.has_path(&[1, 3]).unwrap());
        assert!(!view.has_path(&[1, 2]).unwrap());
        assert_eq!(view.get_path(&[1, 3]).unwrap().as_str(), Some("execA"));
        assert_eq!(view.get_path(&[]), Err(WireError::EmptyPath));
        // target 的缓存保存在嵌套视图里
        assert!(view.message(1).unwrap().is_cached(3));
    }

    #[test]
    fn test_message_on_scalar_field() {
        let mut view = LazyMessage::new(ld(3, b"execA"), header());
        assert!(matches!(view.message(3), Err(WireError::NotAMessage { tag: 3 })));
    }

    #[test]
    fn test_repeated_message_fields_merge() {
        let header = header();
        let envelope = MessageDescriptor::builder("Envelope")
            .message_field(1, "header", &header)
            .build()
            .unwrap();

        let mut buf = ld(1, &ld(1, b"r1"));
        buf.extend(ld(1, &ld(3, b"execB")));
        let mut view = LazyMessage::new(buf, envelope);
        assert_eq!(view.get_path(&[1, 1]).unwrap().as_str(), Some("r1"));
        assert_eq!(view.get_path(&[1, 3]).unwrap().as_str(), Some("execB"));
    }
}
