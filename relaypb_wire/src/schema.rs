//! Schema 文档加载
//!
//! 外部 Schema 工具以 TOML 输出字段描述，这里把它解析为描述符表。
//!
//! ```toml
//! [[message]]
//! name = "Header"
//!
//! [[message.field]]
//! tag = 1
//! name = "request_id"
//! type = "string"
//! ```

use crate::descriptor::{DescriptorTable, FieldType, MessageDescriptor, MessageRef};
use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};

/// Schema 文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "message", default)]
    pub messages: Vec<MessageSchema>,
}

/// 单个消息的 Schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSchema {
    pub name: String,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldSchema>,
}

/// 单个字段的 Schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub tag: u32,
    pub name: String,
    /// 标量类型名，或同一文档中的消息名
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub repeated: bool,
}

impl SchemaDocument {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, DescriptorError> {
        toml::from_str(content).map_err(|e| DescriptorError::Parse(e.to_string()))
    }

    /// 构建描述符表
    ///
    /// 消息引用按依赖顺序解析，未知类型会被拒绝。
    /// 递归引用（包括相互引用）指回尚在构建中的消息时改为弱引用，由返回的表持有目标
    pub fn build(&self) -> Result<DescriptorTable, DescriptorError> {
        let mut schemas: HashMap<&str, &MessageSchema> = HashMap::new();
        for message in &self.messages {
            if schemas.insert(message.name.as_str(), message).is_some() {
                return Err(DescriptorError::MessageAlreadyExists(message.name.clone()));
            }
        }

        let mut resolver = Resolver {
            schemas: &schemas,
            built: HashMap::new(),
            visiting: HashSet::new(),
            pending: HashMap::new(),
        };
        for message in &self.messages {
            resolver.resolve(&message.name)?;
        }

        let mut table = DescriptorTable::new();
        for message in &self.messages {
            if let Some(descriptor) = resolver.built.remove(message.name.as_str()) {
                table.register(descriptor)?;
            }
        }
        Ok(table)
    }
}

struct Resolver<'a> {
    schemas: &'a HashMap<&'a str, &'a MessageSchema>,
    built: HashMap<&'a str, Arc<MessageDescriptor>>,
    visiting: HashSet<&'a str>,
    /// 构建中的消息被回指时登记的占位，构建完成后写入
    pending: HashMap<&'a str, Arc<OnceLock<Weak<MessageDescriptor>>>>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, name: &'a str) -> Result<Arc<MessageDescriptor>, DescriptorError> {
        if let Some(descriptor) = self.built.get(name) {
            return Ok(Arc::clone(descriptor));
        }
        self.visiting.insert(name);

        let schemas = self.schemas;
        let schema = schemas
            .get(name)
            .copied()
            .ok_or_else(|| DescriptorError::MessageNotRegistered(name.to_string()))?;

        let mut builder = MessageDescriptor::builder(name);
        for field in &schema.fields {
            let field_type = match FieldType::scalar_from_name(&field.type_name) {
                Some(scalar) => scalar,
                None if self.schemas.contains_key(field.type_name.as_str()) => {
                    FieldType::Message(self.reference(&field.type_name)?)
                }
                None => {
                    return Err(DescriptorError::UnknownType {
                        message: name.to_string(),
                        field: field.name.clone(),
                        type_name: field.type_name.clone(),
                    });
                }
            };
            builder = if field.repeated {
                builder.repeated_field(field.tag, field.name.as_str(), field_type)
            } else {
                builder.field(field.tag, field.name.as_str(), field_type)
            };
        }

        let descriptor = builder.build()?;
        self.visiting.remove(name);
        if let Some(slot) = self.pending.remove(name) {
            // 占位只在这里写入一次
            let _ = slot.set(Arc::downgrade(&descriptor));
        }
        self.built.insert(name, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    fn reference(&mut self, name: &'a str) -> Result<MessageRef, DescriptorError> {
        if self.visiting.contains(name) {
            let slot = self.pending.entry(name).or_default();
            return Ok(MessageRef::deferred(name, Arc::clone(slot)));
        }
        Ok(MessageRef::new(&self.resolve(name)?))
    }
}

impl DescriptorTable {
    /// 从 TOML Schema 字符串构建描述符表
    pub fn from_toml_str(content: &str) -> Result<Self, DescriptorError> {
        SchemaDocument::from_toml_str(content)?.build()
    }

    /// 从 TOML Schema 文件构建描述符表
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTING_SCHEMA: &str = r#"
        [[message]]
        name = "Envelope"
        [[message.field]]
        tag = 1
        name = "header"
        type = "Header"
        [[message.field]]
        tag = 2
        name = "data"
        type = "Data"

        [[message]]
        name = "Header"
        [[message.field]]
        tag = 1
        name = "request_id"
        type = "string"
        [[message.field]]
        tag = 3
        name = "target"
        type = "string"

        [[message]]
        name = "Data"
        [[message.field]]
        tag = 1
        name = "strings"
        type = "string"
        repeated = true
    "#;

    #[test]
    fn test_load_routing_schema() {
        let table = DescriptorTable::from_toml_str(ROUTING_SCHEMA).unwrap();
        assert_eq!(table.names(), vec!["Data", "Envelope", "Header"]);
        assert_eq!(
            table.resolve_path("Envelope", "header.target").unwrap(),
            vec![1, 3]
        );

        let data = table.get("Data").unwrap();
        assert!(data.lookup(1).unwrap().is_repeated());

        // 引用共享同一个描述符实例
        let envelope = table.get("Envelope").unwrap();
        let nested = envelope.lookup(1).unwrap().message_descriptor().unwrap();
        assert!(Arc::ptr_eq(&nested, table.get("Header").unwrap()));
        assert!(!envelope.lookup(1).unwrap().message_ref().unwrap().is_recursive());
    }

    #[test]
    fn test_unknown_type() {
        let schema = r#"
            [[message]]
            name = "A"
            [[message.field]]
            tag = 1
            name = "b"
            type = "Missing"
        "#;
        assert!(matches!(
            DescriptorTable::from_toml_str(schema),
            Err(DescriptorError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_self_recursive_message() {
        let schema = r#"
            [[message]]
            name = "Node"
            [[message.field]]
            tag = 1
            name = "child"
            type = "Node"
            [[message.field]]
            tag = 2
            name = "label"
            type = "string"
        "#;
        let table = DescriptorTable::from_toml_str(schema).unwrap();
        let node = table.get("Node").unwrap();

        let child = node.lookup(1).unwrap();
        assert!(child.message_ref().unwrap().is_recursive());
        assert!(Arc::ptr_eq(&child.message_descriptor().unwrap(), node));
        assert_eq!(
            table.resolve_path("Node", "child.child.label").unwrap(),
            vec![1, 1, 2]
        );

        // 回指只是弱引用，表释放后描述符一并释放
        let weak = Arc::downgrade(node);
        drop(table);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_mutually_recursive_messages() {
        let schema = r#"
            [[message]]
            name = "Expr"
            [[message.field]]
            tag = 1
            name = "call"
            type = "Call"

            [[message]]
            name = "Call"
            [[message.field]]
            tag = 1
            name = "name"
            type = "string"
            [[message.field]]
            tag = 2
            name = "args"
            type = "Expr"
            repeated = true
        "#;
        let table = DescriptorTable::from_toml_str(schema).unwrap();
        let expr = Arc::clone(table.get("Expr").unwrap());
        let call = Arc::clone(table.get("Call").unwrap());

        let args = call.lookup(2).unwrap();
        assert!(args.message_ref().unwrap().is_recursive());
        assert!(Arc::ptr_eq(&args.message_descriptor().unwrap(), &expr));
        assert_eq!(
            table.resolve_path("Expr", "call.name").unwrap(),
            vec![1, 1]
        );

        // 只持有 Call 时，指回 Expr 的引用随表释放而失效
        drop(expr);
        drop(table);
        let args = call.lookup(2).unwrap();
        assert!(args.message_descriptor().is_none());
        assert!(matches!(
            args.message_ref().unwrap().descriptor(),
            Err(DescriptorError::Released(_))
        ));
    }

    #[test]
    fn test_duplicate_message() {
        let schema = r#"
            [[message]]
            name = "A"
            [[message]]
            name = "A"
        "#;
        assert!(matches!(
            DescriptorTable::from_toml_str(schema),
            Err(DescriptorError::MessageAlreadyExists(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            DescriptorTable::from_toml_str("[[message]]\nname = 3"),
            Err(DescriptorError::Parse(_))
        ));
    }
}
