//! 已解码的字段值
//!
//! 每种语义类型对应一个变体；嵌套消息仍是惰性视图。

use crate::descriptor::{FieldDescriptor, FieldType, MessageDescriptor, MessageRef};
use crate::error::WireError;
use crate::scanner::{FieldRecord, WireType};
use crate::varint::{decode_varint, decode_zigzag32, decode_zigzag64};
use crate::view::LazyMessage;
use bytes::Bytes;
use std::sync::Arc;

/// 字段值
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    /// int32 / sint32 / sfixed32
    Int32(i32),
    /// int64 / sint64 / sfixed64
    Int64(i64),
    /// uint32 / fixed32
    Uint32(u32),
    /// uint64 / fixed64
    Uint64(u64),
    Float(f32),
    Double(f64),
    Enum(i32),
    String(String),
    Bytes(Bytes),
    /// 嵌套消息，子字段仍未解码
    Message(LazyMessage),
    /// 重复字段，按出现顺序
    Repeated(Vec<Value>),
}

impl Value {
    /// 字段缺失时的零值
    ///
    /// 仅当递归消息的目标描述符已释放时返回错误
    pub fn default_for(field: &FieldDescriptor) -> Result<Value, WireError> {
        if field.is_repeated() {
            return Ok(Value::Repeated(Vec::new()));
        }
        let value = match field.field_type() {
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Bytes::new()),
            FieldType::Bool => Value::Bool(false),
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Value::Int32(0),
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Value::Int64(0),
            FieldType::Uint32 | FieldType::Fixed32 => Value::Uint32(0),
            FieldType::Uint64 | FieldType::Fixed64 => Value::Uint64(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Enum => Value::Enum(0),
            FieldType::Message(target) => Value::Message(LazyMessage::new(
                Bytes::new(),
                nested_descriptor(field.tag(), target)?,
            )),
        };
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 有符号整数视图（含 enum）
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) | Value::Enum(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint32(v) => Some(u64::from(*v)),
            Value::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&LazyMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut LazyMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_repeated(&self) -> Option<&[Value]> {
        match self {
            Value::Repeated(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// 嵌套消息按原始字节比较
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Uint32(a), Value::Uint32(b)) => a == b,
            (Value::Uint64(a), Value::Uint64(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a.raw_bytes() == b.raw_bytes(),
            (Value::Repeated(a), Value::Repeated(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// 按字段描述解码一条记录（单个值）
pub(crate) fn decode_record(
    field: &FieldDescriptor,
    record: &FieldRecord,
    raw: &Bytes,
) -> Result<Value, WireError> {
    let tag = field.tag();
    let field_type = field.field_type();
    let expected = field_type.wire_type();
    if record.wire_type != expected {
        return Err(WireError::FieldDecode {
            tag,
            reason: format!(
                "线类型 {} 与 {} 类型不兼容 (期望 {})",
                record.wire_type,
                field_type.name(),
                expected
            ),
        });
    }

    let span = record.value_span();
    match expected {
        WireType::Varint => {
            let (value, _) = decode_varint(raw, span.start)?;
            Ok(from_varint(field_type, value))
        }
        WireType::Fixed32 => {
            let bytes = fixed_bytes::<4>(tag, &raw[span])?;
            Ok(from_fixed32(field_type, bytes))
        }
        WireType::Fixed64 => {
            let bytes = fixed_bytes::<8>(tag, &raw[span])?;
            Ok(from_fixed64(field_type, bytes))
        }
        WireType::LengthDelimited => match field_type {
            FieldType::String => std::str::from_utf8(&raw[span])
                .map(|s| Value::String(s.to_owned()))
                .map_err(|e| WireError::FieldDecode {
                    tag,
                    reason: format!("无效的 UTF-8: {}", e),
                }),
            FieldType::Message(target) => Ok(Value::Message(LazyMessage::new(
                raw.slice(span),
                nested_descriptor(tag, target)?,
            ))),
            _ => Ok(Value::Bytes(raw.slice(span))),
        },
    }
}

/// 取得嵌套消息字段的描述符
pub(crate) fn nested_descriptor(
    tag: u32,
    target: &MessageRef,
) -> Result<Arc<MessageDescriptor>, WireError> {
    target.descriptor().map_err(|e| WireError::FieldDecode {
        tag,
        reason: e.to_string(),
    })
}

/// 解码重复字段的一条记录，打包编码时会展开为多个值
pub(crate) fn decode_repeated_record(
    field: &FieldDescriptor,
    record: &FieldRecord,
    raw: &Bytes,
    out: &mut Vec<Value>,
) -> Result<(), WireError> {
    let field_type = field.field_type();
    if record.wire_type != WireType::LengthDelimited || !field_type.is_packable() {
        out.push(decode_record(field, record, raw)?);
        return Ok(());
    }

    let tag = field.tag();
    let payload = &raw[record.value_span()];
    let packed_error = |e: WireError| WireError::FieldDecode {
        tag,
        reason: format!("打包字段损坏: {}", e),
    };

    let mut pos = 0;
    while pos < payload.len() {
        match field_type.wire_type() {
            WireType::Varint => {
                let (value, used) = decode_varint(payload, pos).map_err(packed_error)?;
                out.push(from_varint(field_type, value));
                pos += used;
            }
            WireType::Fixed32 => {
                let end = (pos + 4).min(payload.len());
                out.push(from_fixed32(field_type, fixed_bytes::<4>(tag, &payload[pos..end])?));
                pos += 4;
            }
            WireType::Fixed64 => {
                let end = (pos + 8).min(payload.len());
                out.push(from_fixed64(field_type, fixed_bytes::<8>(tag, &payload[pos..end])?));
                pos += 8;
            }
            WireType::LengthDelimited => unreachable!("不可打包的类型已在上方处理"),
        }
    }
    Ok(())
}

fn fixed_bytes<const N: usize>(tag: u32, slice: &[u8]) -> Result<[u8; N], WireError> {
    slice.try_into().map_err(|_| WireError::FieldDecode {
        tag,
        reason: format!("定长字段需要 {} 字节, 实际 {} 字节", N, slice.len()),
    })
}

fn from_varint(field_type: &FieldType, value: u64) -> Value {
    match field_type {
        FieldType::Bool => Value::Bool(value != 0),
        FieldType::Int32 => Value::Int32(value as i32),
        FieldType::Uint32 => Value::Uint32(value as u32),
        FieldType::Uint64 => Value::Uint64(value),
        FieldType::Sint32 => Value::Int32(decode_zigzag32(value as u32)),
        FieldType::Sint64 => Value::Int64(decode_zigzag64(value)),
        FieldType::Enum => Value::Enum(value as i32),
        _ => Value::Int64(value as i64),
    }
}

fn from_fixed32(field_type: &FieldType, bytes: [u8; 4]) -> Value {
    match field_type {
        FieldType::Sfixed32 => Value::Int32(i32::from_le_bytes(bytes)),
        FieldType::Float => Value::Float(f32::from_le_bytes(bytes)),
        _ => Value::Uint32(u32::from_le_bytes(bytes)),
    }
}

fn from_fixed64(field_type: &FieldType, bytes: [u8; 8]) -> Value {
    match field_type {
        FieldType::Sfixed64 => Value::Int64(i64::from_le_bytes(bytes)),
        FieldType::Double => Value::Double(f64::from_le_bytes(bytes)),
        _ => Value::Uint64(u64::from_le_bytes(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn decode(field_type: FieldType, buf: &[u8]) -> Result<Value, WireError> {
        let raw = Bytes::copy_from_slice(buf);
        let records = scan(&raw).unwrap();
        let field = FieldDescriptor::new(1, "f", field_type, false);
        decode_record(&field, &records[0], &raw)
    }

    #[test]
    fn test_varint_types() {
        assert_eq!(decode(FieldType::Bool, &[0x08, 0x01]).unwrap(), Value::Bool(true));
        assert_eq!(decode(FieldType::Int64, &[0x08, 0x96, 0x01]).unwrap(), Value::Int64(150));
        // sint32 -2 的 zigzag 编码为 3
        assert_eq!(decode(FieldType::Sint32, &[0x08, 0x03]).unwrap(), Value::Int32(-2));
        assert_eq!(decode(FieldType::Enum, &[0x08, 0x02]).unwrap(), Value::Enum(2));
    }

    #[test]
    fn test_negative_int32_sign_extended() {
        let mut buf = vec![0x08];
        crate::varint::encode_varint(-5i64 as u64, &mut buf);
        assert_eq!(decode(FieldType::Int32, &buf).unwrap(), Value::Int32(-5));
    }

    #[test]
    fn test_fixed_types() {
        let mut buf = vec![0x0d];
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        assert_eq!(decode(FieldType::Float, &buf).unwrap(), Value::Float(1.5));

        let mut buf = vec![0x09];
        buf.extend_from_slice(&(-7i64).to_le_bytes());
        assert_eq!(decode(FieldType::Sfixed64, &buf).unwrap(), Value::Int64(-7));
    }

    #[test]
    fn test_wire_type_mismatch() {
        // 长度前缀记录被声明为定长整数
        let err = decode(FieldType::Fixed32, &[0x0a, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, WireError::FieldDecode { tag: 1, .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode(FieldType::String, &[0x0a, 0x02, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, WireError::FieldDecode { .. }));
    }

    #[test]
    fn test_packed_repeated() {
        // field 1 packed: [1, 150, 3]
        let raw = Bytes::from_static(&[0x0a, 0x04, 0x01, 0x96, 0x01, 0x03]);
        let records = scan(&raw).unwrap();
        let field = FieldDescriptor::new(1, "nums", FieldType::Uint32, true);
        let mut out = Vec::new();
        decode_repeated_record(&field, &records[0], &raw, &mut out).unwrap();
        assert_eq!(
            out,
            vec![Value::Uint32(1), Value::Uint32(150), Value::Uint32(3)]
        );
    }

    #[test]
    fn test_packed_fixed_with_trailing_garbage() {
        let raw = Bytes::from_static(&[0x0a, 0x05, 1, 0, 0, 0, 9]);
        let records = scan(&raw).unwrap();
        let field = FieldDescriptor::new(1, "nums", FieldType::Fixed32, true);
        let mut out = Vec::new();
        let err = decode_repeated_record(&field, &records[0], &raw, &mut out).unwrap_err();
        assert!(matches!(err, WireError::FieldDecode { .. }));
    }

    #[test]
    fn test_default_values() {
        let field = FieldDescriptor::new(1, "s", FieldType::String, false);
        assert_eq!(Value::default_for(&field).unwrap().as_str(), Some(""));
        let field = FieldDescriptor::new(1, "r", FieldType::Int64, true);
        assert_eq!(Value::default_for(&field).unwrap().as_repeated().map(<[Value]>::len), Some(0));
    }
}
