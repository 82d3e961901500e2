//! Gateway builder for common use cases
//!
//! Provides a fluent API that turns a config, a schema and a routing table into
//! a running worker pool.

use crate::{Error, Result};
use bytes::Bytes;
use relaypb_config::GatewayConfig;
use relaypb_core::RelayError;
use relaypb_router::{Outbound, Router, WorkerPool};
use relaypb_wire::{DescriptorTable, MessageDescriptor, Override};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Gateway entry point
///
/// # Example
///
/// ```rust,no_run,ignore
/// use relaypb::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> relaypb::Result<()> {
///     let mut gateway = Gateway::builder()
///         .schema(DescriptorTable::from_file("schema.toml")?)
///         .route("execA", "10.0.0.1:7000")
///         .rewrite("header", Override::string(2, "forwarded"))
///         .start()?;
///
///     gateway.submit(bytes).await?;
///     while let Some(outbound) = gateway.recv().await {
///         // forward outbound payload
///     }
///     gateway.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Gateway;

impl Gateway {
    /// Create a new gateway builder with default configuration
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

/// Fluent gateway builder
pub struct GatewayBuilder {
    /// Gateway configuration
    config: GatewayConfig,
    /// Message schema, required before `start`
    schema: Option<DescriptorTable>,
    /// `target -> destination` pairs
    routes: Vec<(String, String)>,
    /// Default destination, takes precedence over the config value
    default_destination: Option<String>,
    /// `(message path, override)` pairs applied before forwarding
    rewrites: Vec<(String, Override)>,
}

impl GatewayBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            schema: None,
            routes: Vec::new(),
            default_destination: None,
            rewrites: Vec::new(),
        }
    }

    /// Set custom gateway configuration
    ///
    /// # Example
    ///
    /// ```rust,no_run,ignore
    /// let config = GatewayConfig {
    ///     worker_threads: Some(4),
    ///     routing_field: "header.target".to_string(),
    ///     ..Default::default()
    /// };
    ///
    /// let gateway = Gateway::builder().config(config);
    /// ```
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a TOML file, applying `RELAYPB_*` overrides
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = GatewayConfig::from_file_with_env(path)?;
        Ok(self)
    }

    /// Set the descriptor table the routing message is looked up in
    pub fn schema(mut self, schema: DescriptorTable) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add a route from a routing field value to a destination
    pub fn route(mut self, target: impl Into<String>, destination: impl Into<String>) -> Self {
        self.routes.push((target.into(), destination.into()));
        self
    }

    /// Set the destination for messages whose target matches no route
    pub fn default_destination(mut self, destination: impl Into<String>) -> Self {
        self.default_destination = Some(destination.into());
        self
    }

    /// Add a rewrite applied before forwarding
    ///
    /// `message_path` names the message holding the overridden field, using
    /// field names relative to the routing message. An empty path targets the
    /// routing message itself.
    ///
    /// # Example
    ///
    /// ```rust,no_run,ignore
    /// // header.status = "done"
    /// Gateway::builder().rewrite("header", Override::string(2, "done"));
    /// ```
    pub fn rewrite(mut self, message_path: impl Into<String>, entry: Override) -> Self {
        self.rewrites.push((message_path.into(), entry));
        self
    }

    /// Build the router and start the worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<RunningGateway> {
        self.config.validate()?;

        let schema = self
            .schema
            .ok_or_else(|| Error::Core(RelayError::config("未设置消息模式")))?;
        let descriptor = Arc::clone(schema.require(&self.config.routing_message)?);

        let mut router = Router::from_descriptor(&descriptor, &self.config.routing_field)?;
        router.set_default_destination(
            self.default_destination
                .or_else(|| self.config.default_destination.clone()),
        );
        for (target, destination) in self.routes {
            router.add_route(target, destination)?;
        }
        for (path, entry) in self.rewrites {
            let tags = resolve_message_path(&descriptor, &path)?;
            router.add_rewrite(tags, entry);
        }

        let routes = router.route_count();
        let (pool, outbound) = WorkerPool::start(&self.config, Arc::new(router), Arc::clone(&descriptor))?;
        info!(
            routing_message = descriptor.name(),
            routing_field = %self.config.routing_field,
            routes,
            "relaypb 网关已启动"
        );

        Ok(RunningGateway {
            pool,
            outbound,
            descriptor,
            schema,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a dotted path to a nested, non-repeated message field
fn resolve_message_path(descriptor: &MessageDescriptor, path: &str) -> Result<Vec<u32>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let tags = descriptor.resolve_path(path)?;
    let mut nested: Option<Arc<MessageDescriptor>> = None;
    for tag in &tags {
        let current = nested.as_deref().unwrap_or(descriptor);
        let next = current
            .lookup(*tag)
            .filter(|field| !field.is_repeated())
            .and_then(|field| field.message_descriptor());
        nested = match next {
            Some(next) => Some(next),
            None => {
                return Err(Error::Core(RelayError::validation(format!(
                    "改写路径不是单值消息字段: {}",
                    path
                ))));
            }
        };
    }
    Ok(tags)
}

/// A started gateway
pub struct RunningGateway {
    pool: WorkerPool,
    outbound: mpsc::Receiver<Outbound>,
    descriptor: Arc<MessageDescriptor>,
    /// Owns recursive message types reached through weak back references
    schema: DescriptorTable,
}

impl RunningGateway {
    /// Submit a message, returning its sequence id
    pub async fn submit(&self, payload: impl Into<Bytes>) -> Result<u64> {
        Ok(self.pool.submit(payload).await?)
    }

    /// Receive the next routed or rejected message
    ///
    /// Returns `None` once the pool has shut down and every result was drained.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Descriptor of the routing message
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Descriptor table the gateway was started with
    pub fn schema(&self) -> &DescriptorTable {
        &self.schema
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Split into the pool, the outbound receiver and the descriptor table
    ///
    /// Keep the table alive until the pool is shut down when the schema has
    /// recursive message types.
    pub fn into_parts(self) -> (WorkerPool, mpsc::Receiver<Outbound>, DescriptorTable) {
        (self.pool, self.outbound, self.schema)
    }

    /// Stop accepting new messages
    ///
    /// Messages already submitted are still routed; keep calling
    /// [`recv`](RunningGateway::recv) until it returns `None`.
    pub fn close(&mut self) {
        self.pool.close();
    }

    /// Stop accepting messages, drain the outbound channel and wait for workers
    ///
    /// Returns every result that had not been received yet.
    pub async fn shutdown(self) -> Result<Vec<Outbound>> {
        Ok(self.pool.shutdown(self.outbound).await?)
    }
}
