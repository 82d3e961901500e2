//! 字段描述符表
//!
//! 由外部 Schema 工具产出，启动时构建一次，运行期只读并在所有 Worker 间共享。

use crate::error::DescriptorError;
use crate::scanner::{MAX_FIELD_NUMBER, WireType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// 字段的语义类型
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Bytes,
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    Enum,
    /// 嵌套消息
    Message(MessageRef),
}

/// 嵌套消息类型的引用
///
/// 递归类型中指回祖先的引用只持有弱引用，由描述符表保持目标存活；
/// 其余引用直接持有目标描述符。
#[derive(Clone)]
pub struct MessageRef {
    name: String,
    target: RefTarget,
}

#[derive(Clone)]
enum RefTarget {
    Strong(Arc<MessageDescriptor>),
    /// 目标构建完成后才写入
    Deferred(Arc<OnceLock<Weak<MessageDescriptor>>>),
}

impl MessageRef {
    pub fn new(descriptor: &Arc<MessageDescriptor>) -> Self {
        Self {
            name: descriptor.name().to_string(),
            target: RefTarget::Strong(Arc::clone(descriptor)),
        }
    }

    pub(crate) fn deferred(
        name: impl Into<String>,
        slot: Arc<OnceLock<Weak<MessageDescriptor>>>,
    ) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Deferred(slot),
        }
    }

    /// 目标消息类型名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 是否为递归类型的回指引用
    pub fn is_recursive(&self) -> bool {
        matches!(self.target, RefTarget::Deferred(_))
    }

    /// 取得目标描述符
    pub fn descriptor(&self) -> Result<Arc<MessageDescriptor>, DescriptorError> {
        match &self.target {
            RefTarget::Strong(descriptor) => Ok(Arc::clone(descriptor)),
            RefTarget::Deferred(slot) => slot
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| DescriptorError::Released(self.name.clone())),
        }
    }
}

impl From<Arc<MessageDescriptor>> for MessageRef {
    fn from(descriptor: Arc<MessageDescriptor>) -> Self {
        Self {
            name: descriptor.name().to_string(),
            target: RefTarget::Strong(descriptor),
        }
    }
}

// 只打印类型名，递归类型不会无限展开
impl fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageRef").field(&self.name).finish()
    }
}

impl FieldType {
    /// 按标量类型名解析（消息类型由 Schema 加载器单独解析）
    pub fn scalar_from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            "bool" => FieldType::Bool,
            "int32" => FieldType::Int32,
            "int64" => FieldType::Int64,
            "uint32" => FieldType::Uint32,
            "uint64" => FieldType::Uint64,
            "sint32" => FieldType::Sint32,
            "sint64" => FieldType::Sint64,
            "fixed32" => FieldType::Fixed32,
            "fixed64" => FieldType::Fixed64,
            "sfixed32" => FieldType::Sfixed32,
            "sfixed64" => FieldType::Sfixed64,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "enum" => FieldType::Enum,
            _ => return None,
        };
        Some(ty)
    }

    /// 类型名
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Bool => "bool",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Enum => "enum",
            FieldType::Message(_) => "message",
        }
    }

    /// 单个值在线上的编码方式
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
                WireType::LengthDelimited
            }
            FieldType::Bool
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Enum => WireType::Varint,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::Fixed32,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::Fixed64,
        }
    }

    /// 重复字段是否可以打包编码
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }
}

/// 字段描述符
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    tag: u32,
    name: String,
    field_type: FieldType,
    repeated: bool,
}

impl FieldDescriptor {
    /// 创建新的字段描述符
    pub fn new(tag: u32, name: impl Into<String>, field_type: FieldType, repeated: bool) -> Self {
        Self {
            tag,
            name: name.into(),
            field_type,
            repeated,
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// 嵌套消息类型的引用（仅消息类型字段）
    pub fn message_ref(&self) -> Option<&MessageRef> {
        match &self.field_type {
            FieldType::Message(target) => Some(target),
            _ => None,
        }
    }

    /// 嵌套消息的描述符；非消息字段或目标已释放时返回 None
    pub fn message_descriptor(&self) -> Option<Arc<MessageDescriptor>> {
        self.message_ref().and_then(|target| target.descriptor().ok())
    }
}

/// 消息描述符
///
/// 同时记录基于该描述符的视图一共物化了多少次字段，用于观察惰性解码
#[derive(Debug)]
pub struct MessageDescriptor {
    name: String,
    fields: BTreeMap<u32, FieldDescriptor>,
    names: HashMap<String, u32>,
    materializations: AtomicU64,
}

impl MessageDescriptor {
    /// 创建构建器
    pub fn builder(name: impl Into<String>) -> MessageDescriptorBuilder {
        MessageDescriptorBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// 消息类型名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按字段编号查找
    ///
    /// 返回 None 表示未知字段：原样保留，从不物化
    pub fn lookup(&self, tag: u32) -> Option<&FieldDescriptor> {
        self.fields.get(&tag)
    }

    /// 按字段名查找
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.names.get(name).and_then(|tag| self.fields.get(tag))
    }

    /// 字段名对应的编号
    pub fn tag_of(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    /// 按编号升序遍历字段
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    /// 字段数量
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 把 `header.target` 形式的路径解析为字段编号序列
    ///
    /// 除最后一段外，每一段都必须是单值消息字段
    pub fn resolve_path(&self, path: &str) -> Result<Vec<u32>, DescriptorError> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut tags = Vec::with_capacity(segments.len());
        let mut nested: Option<Arc<MessageDescriptor>> = None;

        for (i, segment) in segments.iter().enumerate() {
            let current = nested.as_deref().unwrap_or(self);
            let field =
                current
                    .field_by_name(segment)
                    .ok_or_else(|| DescriptorError::UnknownField {
                        message: current.name.clone(),
                        name: segment.to_string(),
                    })?;
            tags.push(field.tag());

            if i + 1 < segments.len() {
                let next = match (field.message_ref(), field.is_repeated()) {
                    (Some(target), false) => target.descriptor()?,
                    _ => {
                        return Err(DescriptorError::NotAMessage {
                            message: current.name.clone(),
                            name: segment.to_string(),
                        });
                    }
                };
                nested = Some(next);
            }
        }

        Ok(tags)
    }

    /// 已物化的字段次数
    pub fn materializations(&self) -> u64 {
        self.materializations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_materialization(&self) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
    }
}

/// 消息描述符构建器
#[derive(Debug, Clone)]
pub struct MessageDescriptorBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptorBuilder {
    /// 添加单值字段
    pub fn field(mut self, tag: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields
            .push(FieldDescriptor::new(tag, name, field_type, false));
        self
    }

    /// 添加重复字段
    pub fn repeated_field(
        mut self,
        tag: u32,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.fields
            .push(FieldDescriptor::new(tag, name, field_type, true));
        self
    }

    /// 添加嵌套消息字段
    pub fn message_field(
        self,
        tag: u32,
        name: impl Into<String>,
        descriptor: &Arc<MessageDescriptor>,
    ) -> Self {
        self.field(tag, name, FieldType::Message(MessageRef::new(descriptor)))
    }

    /// 构建消息描述符
    pub fn build(self) -> Result<Arc<MessageDescriptor>, DescriptorError> {
        let mut fields = BTreeMap::new();
        let mut names = HashMap::new();

        for field in self.fields {
            if field.tag == 0 || field.tag > MAX_FIELD_NUMBER {
                return Err(DescriptorError::InvalidTag {
                    message: self.name,
                    tag: field.tag,
                });
            }
            if fields.contains_key(&field.tag) {
                return Err(DescriptorError::DuplicateTag {
                    message: self.name,
                    tag: field.tag,
                });
            }
            if names.contains_key(&field.name) {
                return Err(DescriptorError::DuplicateName {
                    message: self.name,
                    name: field.name,
                });
            }
            names.insert(field.name.clone(), field.tag);
            fields.insert(field.tag, field);
        }

        Ok(Arc::new(MessageDescriptor {
            name: self.name,
            fields,
            names,
            materializations: AtomicU64::new(0),
        }))
    }
}

/// 描述符表
///
/// 消息类型名称到描述符的映射。递归类型的回指引用依赖本表保持目标存活，
/// 表需要比基于这些描述符的视图活得更久
#[derive(Debug, Default)]
pub struct DescriptorTable {
    messages: HashMap<String, Arc<MessageDescriptor>>,
}

impl DescriptorTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册消息描述符
    pub fn register(&mut self, descriptor: Arc<MessageDescriptor>) -> Result<(), DescriptorError> {
        if self.messages.contains_key(descriptor.name()) {
            return Err(DescriptorError::MessageAlreadyExists(
                descriptor.name().to_string(),
            ));
        }
        self.messages
            .insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// 按名称获取描述符
    pub fn get(&self, name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(name)
    }

    /// 按名称获取描述符，不存在时报错
    pub fn require(&self, name: &str) -> Result<&Arc<MessageDescriptor>, DescriptorError> {
        self.get(name)
            .ok_or_else(|| DescriptorError::MessageNotRegistered(name.to_string()))
    }

    /// 检查消息是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    /// 已注册消息数量
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// 按字母序列出所有消息名称
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.messages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 解析某个消息类型下的字段路径
    pub fn resolve_path(&self, message: &str, path: &str) -> Result<Vec<u32>, DescriptorError> {
        self.require(message)?.resolve_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Arc<MessageDescriptor> {
        MessageDescriptor::builder("Header")
            .field(1, "request_id", FieldType::String)
            .field(2, "status", FieldType::String)
            .field(3, "target", FieldType::String)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_and_lookup() {
        let header = header();
        assert_eq!(header.name(), "Header");
        assert_eq!(header.len(), 3);
        assert_eq!(header.lookup(3).unwrap().name(), "target");
        assert!(header.lookup(4).is_none());
        assert_eq!(header.tag_of("status"), Some(2));
        let tags: Vec<u32> = header.fields().map(FieldDescriptor::tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let result = MessageDescriptor::builder("Bad")
            .field(1, "a", FieldType::Bool)
            .field(1, "b", FieldType::Bool)
            .build();
        assert!(matches!(result, Err(DescriptorError::DuplicateTag { tag: 1, .. })));

        let result = MessageDescriptor::builder("Bad")
            .field(1, "a", FieldType::Bool)
            .field(2, "a", FieldType::Bool)
            .build();
        assert!(matches!(result, Err(DescriptorError::DuplicateName { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_tags() {
        let result = MessageDescriptor::builder("Bad")
            .field(0, "zero", FieldType::Bool)
            .build();
        assert!(matches!(result, Err(DescriptorError::InvalidTag { tag: 0, .. })));

        let result = MessageDescriptor::builder("Bad")
            .field(MAX_FIELD_NUMBER + 1, "huge", FieldType::Bool)
            .build();
        assert!(matches!(result, Err(DescriptorError::InvalidTag { .. })));
    }

    #[test]
    fn test_resolve_path() {
        let header = header();
        let envelope = MessageDescriptor::builder("Envelope")
            .message_field(1, "header", &header)
            .repeated_field(3, "tags", FieldType::String)
            .build()
            .unwrap();

        assert_eq!(envelope.resolve_path("header.target").unwrap(), vec![1, 3]);
        assert_eq!(envelope.resolve_path("header").unwrap(), vec![1]);
        assert!(matches!(
            envelope.resolve_path("header.missing"),
            Err(DescriptorError::UnknownField { .. })
        ));
        assert!(matches!(
            envelope.resolve_path("tags.inner"),
            Err(DescriptorError::NotAMessage { .. })
        ));
    }

    #[test]
    fn test_wire_type_mapping() {
        assert_eq!(FieldType::Sint64.wire_type(), WireType::Varint);
        assert_eq!(FieldType::Float.wire_type(), WireType::Fixed32);
        assert_eq!(FieldType::Sfixed64.wire_type(), WireType::Fixed64);
        assert_eq!(FieldType::Message(header().into()).wire_type(), WireType::LengthDelimited);
        assert!(FieldType::Enum.is_packable());
        assert!(!FieldType::String.is_packable());
        assert!(FieldType::scalar_from_name("message").is_none());
        assert_eq!(FieldType::scalar_from_name("double").unwrap().name(), "double");
    }

    #[test]
    fn test_table_registration() {
        let mut table = DescriptorTable::new();
        table.register(header()).unwrap();
        assert!(table.contains("Header"));
        assert_eq!(table.count(), 1);
        assert!(matches!(
            table.register(header()),
            Err(DescriptorError::MessageAlreadyExists(_))
        ));
        assert!(matches!(
            table.require("Missing"),
            Err(DescriptorError::MessageNotRegistered(_))
        ));
        assert_eq!(table.resolve_path("Header", "status").unwrap(), vec![2]);
    }

    #[test]
    fn test_message_ref() {
        let header = header();
        let target = MessageRef::new(&header);
        assert_eq!(target.name(), "Header");
        assert!(!target.is_recursive());
        assert!(Arc::ptr_eq(&target.descriptor().unwrap(), &header));
        assert_eq!(format!("{:?}", target), "MessageRef(\"Header\")");

        let slot = Arc::new(OnceLock::new());
        let pending = MessageRef::deferred("Header", Arc::clone(&slot));
        assert!(pending.is_recursive());
        assert!(matches!(pending.descriptor(), Err(DescriptorError::Released(_))));

        slot.set(Arc::downgrade(&header)).unwrap();
        assert!(Arc::ptr_eq(&pending.descriptor().unwrap(), &header));

        drop(header);
        drop(target);
        assert!(matches!(pending.descriptor(), Err(DescriptorError::Released(_))));
    }
}
