//! relaypb 线格式引擎
//!
//! 按需扫描和解码 Protobuf 消息，并在不做完整编解码的前提下生成字节保留的改写结果。
//!
//! ```rust,ignore
//! use relaypb_wire::prelude::*;
//!
//! let mut view = LazyMessage::new(bytes, envelope);
//! let target = view.get_path(&[1, 3])?.as_str();
//! let out = mutate_path(&mut view, &[1], &Overrides::new().with(Override::string(2, "done")))?;
//! ```

pub mod descriptor;
pub mod error;
pub mod mutator;
pub mod scanner;
pub mod schema;
pub mod value;
pub mod varint;
pub mod view;

pub use crate::descriptor::{
    DescriptorTable, FieldDescriptor, FieldType, MessageDescriptor, MessageDescriptorBuilder,
    MessageRef,
};
pub use crate::error::{DescriptorError, WireError};
pub use crate::mutator::{Override, Overrides, mutate, mutate_path};
pub use crate::scanner::{FieldIndex, FieldRecord, Scanner, WireType, scan};
pub use crate::schema::SchemaDocument;
pub use crate::value::Value;
pub use crate::view::LazyMessage;

// 预导出
pub mod prelude {
    pub use crate::descriptor::{DescriptorTable, FieldType, MessageDescriptor};
    pub use crate::error::{DescriptorError, WireError};
    pub use crate::mutator::{Override, Overrides, mutate, mutate_path};
    pub use crate::value::Value;
    pub use crate::view::LazyMessage;
}
