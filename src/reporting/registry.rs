use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::warn;

use super::{file, redis, FileReporter, RedisReporter, Reporter};
use crate::config::ReporterConfig;
use crate::error::{ReportError, Result};
use crate::pool::WorkerPool;

/// Tag used when a requested tag is not registered.
pub const DEFAULT_REPORTER: &str = file::REPORTER_TYPE;

pub type ReporterFactory =
    Arc<dyn Fn(&ReporterConfig, &WorkerPool) -> Result<Box<dyn Reporter>> + Send + Sync>;

/// Maps reporter tags to constructors.
pub struct ReporterRegistry {
    factories: RwLock<HashMap<String, ReporterFactory>>,
}

impl ReporterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the bundled `json` and `redis` backends.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(file::REPORTER_TYPE, |config, pool| {
            Ok(Box::new(FileReporter::new(config.json.clone(), pool.clone())))
        });
        registry.register(redis::REPORTER_TYPE, |config, _pool| {
            Ok(Box::new(RedisReporter::new(config.redis.clone())))
        });
        registry
    }

    /// Process-wide registry, built with the bundled backends on first use.
    pub fn global() -> &'static ReporterRegistry {
        static REGISTRY: OnceLock<ReporterRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_builtins)
    }

    /// Add or replace the constructor for `tag`.
    pub fn register<F>(&self, tag: &str, factory: F)
    where
        F: Fn(&ReporterConfig, &WorkerPool) -> Result<Box<dyn Reporter>> + Send + Sync + 'static,
    {
        self.factories.write().insert(tag.to_string(), Arc::new(factory));
    }

    /// Build the backend for `tag`. Unknown tags fall back to
    /// [`DEFAULT_REPORTER`] with a warning.
    pub fn create(
        &self,
        tag: &str,
        config: &ReporterConfig,
        pool: &WorkerPool,
    ) -> Result<Box<dyn Reporter>> {
        let factory = {
            let factories = self.factories.read();
            match factories.get(tag) {
                Some(factory) => factory.clone(),
                None => {
                    warn!(reporter = tag, fallback = DEFAULT_REPORTER, "unknown reporter type");
                    factories.get(DEFAULT_REPORTER).cloned().ok_or_else(|| {
                        ReportError::Config(format!(
                            "unknown reporter type '{tag}' and no '{DEFAULT_REPORTER}' default registered"
                        ))
                    })?
                }
            }
        };
        factory(config, pool)
    }

    /// Registered tags, sorted.
    pub fn reporter_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.read().keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl Default for ReporterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::Capability;
    use async_trait::async_trait;

    struct Null;

    #[async_trait]
    impl Reporter for Null {
        fn reporter_type(&self) -> &str {
            "null"
        }

        fn capabilities(&self) -> &'static [Capability] {
            &[]
        }

        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_global_has_builtins() {
        let types = ReporterRegistry::global().reporter_types();
        assert_eq!(types, vec!["json".to_string(), "redis".to_string()]);
    }

    #[test]
    fn test_create_known_and_unknown_tags() {
        let registry = ReporterRegistry::with_builtins();
        let pool = WorkerPool::new(1);
        let config = ReporterConfig::default();

        let redis = registry.create("redis", &config, &pool).unwrap();
        assert_eq!(redis.reporter_type(), "redis");

        let fallback = registry.create("bigquery", &config, &pool).unwrap();
        assert_eq!(fallback.reporter_type(), DEFAULT_REPORTER);
    }

    #[test]
    fn test_register_custom_backend() {
        let registry = ReporterRegistry::with_builtins();
        registry.register("null", |_config, _pool| Ok(Box::new(Null)));

        let pool = WorkerPool::new(1);
        let reporter = registry.create("null", &ReporterConfig::default(), &pool).unwrap();
        assert_eq!(reporter.reporter_type(), "null");
        assert!(registry.reporter_types().contains(&"null".to_string()));
    }

    #[test]
    fn test_empty_registry_has_no_default() {
        let registry = ReporterRegistry::new();
        let pool = WorkerPool::new(1);
        let err = registry
            .create("json", &ReporterConfig::default(), &pool)
            .err()
            .unwrap();
        assert!(matches!(err, ReportError::Config(_)));
    }
}
