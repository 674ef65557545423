//! Process-wide name → factory table for backend types.
//!
//! Mirrors the original's `BackendFactory::createBackend`/`attachBackend`
//! self-registration scheme, but as an explicit, idiomatic Rust registry
//! populated at [`Registry::with_builtins`] time rather than via static
//! initialization order tricks.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{aggregator::AggregatorBackend, lazy::LazyBackend, null::NullBackend, vector::VectorBackend, Backend};
use crate::error::{Error, Result};
use crate::provider::rpc::RpcEngine;
use crate::provider::TaskPool;

/// Creates a new backend instance from an RPC engine reference, a task
/// pool, and a JSON config, either for a brand new database (`create`)
/// or for re-opening one that already exists on disk (`attach`). The
/// RPC engine reference lets a backend (the scripted backend's bridge,
/// in particular) re-enter the fleet to reach other databases.
#[async_trait::async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>>;
    async fn attach(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>>;
}

/// The process-wide table of registered backend type names.
pub struct Registry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in backend types:
    /// `"vector"`, `"null"`, `"scripted"`, `"lazy"`, `"aggregator"`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("vector", Arc::new(VectorFactory));
        reg.register("null", Arc::new(NullFactory));
        reg.register(
            "scripted",
            Arc::new(crate::backend::scripted::ScriptedFactory),
        );
        reg.register("lazy", Arc::new(DecoratorFactory::Lazy));
        reg.register("aggregator", Arc::new(DecoratorFactory::Aggregator));
        reg
    }

    pub fn register(&mut self, name: &str, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub async fn create(
        &self,
        kind: &str,
        engine: Arc<dyn RpcEngine>,
        pool: TaskPool,
        config: Value,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::Invalid(format!("unknown database type '{kind}'")))?;
        factory.create(engine, pool, config).await
    }

    pub async fn attach(
        &self,
        kind: &str,
        engine: Arc<dyn RpcEngine>,
        pool: TaskPool,
        config: Value,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::Invalid(format!("unknown database type '{kind}'")))?;
        factory.attach(engine, pool, config).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

struct VectorFactory;

#[async_trait::async_trait]
impl BackendFactory for VectorFactory {
    async fn create(&self, _engine: Arc<dyn RpcEngine>, _pool: TaskPool, _config: Value) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(VectorBackend::new()))
    }

    async fn attach(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>> {
        // The vector backend has no durable state; attach behaves as create.
        self.create(engine, pool, config).await
    }
}

struct NullFactory;

#[async_trait::async_trait]
impl BackendFactory for NullFactory {
    async fn create(&self, _engine: Arc<dyn RpcEngine>, _pool: TaskPool, _config: Value) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(NullBackend::new()))
    }

    async fn attach(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>> {
        self.create(engine, pool, config).await
    }
}

/// Shared factory for both decorator kinds; which one it builds is
/// selected by the variant.
enum DecoratorFactory {
    Lazy,
    Aggregator,
}

#[async_trait::async_trait]
impl BackendFactory for DecoratorFactory {
    async fn create(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>> {
        self.build(engine, pool, config, true).await
    }

    async fn attach(&self, engine: Arc<dyn RpcEngine>, pool: TaskPool, config: Value) -> Result<Arc<dyn Backend>> {
        self.build(engine, pool, config, false).await
    }
}

impl DecoratorFactory {
    async fn build(
        &self,
        engine: Arc<dyn RpcEngine>,
        pool: TaskPool,
        config: Value,
        creating: bool,
    ) -> Result<Arc<dyn Backend>> {
        let obj = config
            .as_object()
            .ok_or_else(|| Error::Invalid("decorator config must be an object".into()))?;
        let inner_kind = obj
            .get("backend")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Invalid("decorator config missing 'backend'".into()))?;
        let inner_config = obj.get("config").cloned().unwrap_or(Value::Object(Default::default()));

        let registry = Registry::with_builtins();
        let inner = if creating {
            Box::pin(registry.create(inner_kind, engine.clone(), pool.clone(), inner_config)).await?
        } else {
            Box::pin(registry.attach(inner_kind, engine.clone(), pool.clone(), inner_config)).await?
        };

        match self {
            DecoratorFactory::Lazy => {
                // Lazy's config spells these flags with hyphens, unlike
                // aggregator's underscored spelling; both are the real
                // wire contract and neither is "fixed" to match the other.
                let flush_on_read = obj.get("flush-on-read").and_then(Value::as_bool).unwrap_or(true);
                let flush_on_exec = obj.get("flush-on-exec").and_then(Value::as_bool).unwrap_or(true);
                Ok(Arc::new(LazyBackend::new(inner, pool, flush_on_read, flush_on_exec)))
            }
            DecoratorFactory::Aggregator => {
                let flush_on_read = obj.get("flush_on_read").and_then(Value::as_bool).unwrap_or(true);
                let flush_on_exec = obj.get("flush_on_exec").and_then(Value::as_bool).unwrap_or(true);
                let batch_size = obj.get("batch_size").and_then(Value::as_u64).unwrap_or(32) as usize;
                let commit_on_flush = obj.get("commit_on_flush").and_then(Value::as_bool).unwrap_or(false);
                Ok(Arc::new(AggregatorBackend::new(
                    inner,
                    pool,
                    flush_on_read,
                    flush_on_exec,
                    batch_size,
                    commit_on_flush,
                )))
            }
        }
    }
}
