//! 变长整数编解码
//!
//! 解码自行实现以区分截断和畸形两种错误；编码复用 prost 的线格式工具。

use crate::error::WireError;

pub use prost::encoding::{encode_varint, encoded_len_varint};

/// varint 最大字节数
pub const MAX_VARINT_LEN: usize = 10;

/// 从 `buf[offset..]` 读取一个 varint
///
/// 返回 (值, 占用字节数)
pub fn decode_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = buf.get(offset + i) else {
            return Err(WireError::TruncatedInput {
                offset,
                needed: i + 1,
                remaining: buf.len().saturating_sub(offset),
            });
        };

        // 第 10 个字节只能贡献最高 1 位
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(WireError::MalformedVarint { offset });
        }

        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }

    Err(WireError::MalformedVarint { offset })
}

/// zigzag 解码 (sint32)
pub fn decode_zigzag32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// zigzag 解码 (sint64)
pub fn decode_zigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// zigzag 编码 (sint32)
pub fn encode_zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// zigzag 编码 (sint64)
pub fn encode_zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}
