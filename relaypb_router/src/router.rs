//! 路由表
//!
//! 只读取路由字段（例如 `header.target`）决定去向；需要改写时做字节保留改写，否则原样转发。

use crate::context::RoutingContext;
use bytes::Bytes;
use relaypb_core::{RelayError, Result};
use relaypb_wire::{LazyMessage, MessageDescriptor, Override, Overrides, Value, mutate_path};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// 目标去向
    pub destination: String,
    /// 待转发的字节
    pub payload: Bytes,
    /// 是否经过改写
    pub mutated: bool,
}

/// 转发前的改写
///
/// `path` 指向被改写字段所在的消息，空路径表示顶层消息
#[derive(Debug, Clone)]
struct Rewrite {
    path: Vec<u32>,
    overrides: Overrides,
}

/// 路由器
#[derive(Debug)]
pub struct Router {
    /// 路由字段的编号路径
    route_path: Vec<u32>,
    /// 路由表 target -> destination
    routes: HashMap<String, String>,
    /// 未命中时的默认去向
    default_destination: Option<String>,
    /// 转发前按顺序应用的改写
    rewrites: Vec<Rewrite>,
}

impl Router {
    /// 以字段编号路径创建路由器
    pub fn new(route_path: Vec<u32>) -> Self {
        Self {
            route_path,
            routes: HashMap::new(),
            default_destination: None,
            rewrites: Vec::new(),
        }
    }

    /// 以字段名路径创建路由器，例如 `header.target`
    pub fn from_descriptor(descriptor: &MessageDescriptor, field_path: &str) -> Result<Self> {
        let route_path = descriptor.resolve_path(field_path)?;
        Ok(Self::new(route_path))
    }

    /// 添加路由
    pub fn add_route(
        &mut self,
        target: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<()> {
        let target = target.into();
        if self.routes.contains_key(&target) {
            return Err(RelayError::router(format!("路由已存在: {}", target)));
        }
        self.routes.insert(target, destination.into());
        Ok(())
    }

    /// 查找路由
    pub fn get_route(&self, target: &str) -> Option<&str> {
        self.routes.get(target).map(String::as_str)
    }

    /// 设置默认去向
    pub fn set_default_destination(&mut self, destination: Option<String>) {
        self.default_destination = destination;
    }

    /// 添加转发前改写，同一路径的改写合并在一起
    pub fn add_rewrite(&mut self, path: Vec<u32>, entry: Override) {
        match self.rewrites.iter_mut().find(|rewrite| rewrite.path == path) {
            Some(rewrite) => {
                rewrite.overrides.insert(entry);
            }
            None => self.rewrites.push(Rewrite {
                path,
                overrides: Overrides::new().with(entry),
            }),
        }
    }

    pub fn route_path(&self) -> &[u32] {
        &self.route_path
    }

    /// 路由条目数量
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// 对一条消息做路由决策
    pub fn route(&self, ctx: &mut RoutingContext) -> Result<RouteDecision> {
        let target = match ctx.view_mut().get_path(&self.route_path)? {
            Value::String(target) => target.clone(),
            _ => {
                return Err(RelayError::router("路由字段不是字符串类型")
                    .with_context(self.route_path.as_slice()));
            }
        };

        let destination = self
            .resolve_destination(&target)
            .ok_or_else(|| RelayError::router(format!("没有匹配的路由: {:?}", target)))?
            .to_string();

        if self.rewrites.is_empty() {
            debug!(seq = ctx.sequence_id(), %target, %destination, "原样转发");
            return Ok(RouteDecision {
                destination,
                payload: ctx.raw_bytes().clone(),
                mutated: false,
            });
        }

        let descriptor = Arc::clone(ctx.view().descriptor());
        let mut rewritten: Option<Bytes> = None;
        for rewrite in &self.rewrites {
            let result = match rewritten.take() {
                None => mutate_path(ctx.view_mut(), &rewrite.path, &rewrite.overrides),
                Some(bytes) => {
                    let mut view = LazyMessage::new(bytes, Arc::clone(&descriptor));
                    mutate_path(&mut view, &rewrite.path, &rewrite.overrides)
                }
            };
            let bytes = result
                .map_err(|e| RelayError::from(e).with_context(rewrite.path.as_slice()))?;
            rewritten = Some(bytes);
        }

        let payload = rewritten.unwrap_or_else(|| ctx.raw_bytes().clone());
        debug!(
            seq = ctx.sequence_id(),
            %target,
            %destination,
            bytes = payload.len(),
            "改写后转发"
        );
        Ok(RouteDecision {
            destination,
            payload,
            mutated: true,
        })
    }

    /// 空目标只走默认去向
    fn resolve_destination(&self, target: &str) -> Option<&str> {
        let routed = if target.is_empty() {
            None
        } else {
            self.routes.get(target)
        };
        routed.or(self.default_destination.as_ref()).map(String::as_str)
    }
}
