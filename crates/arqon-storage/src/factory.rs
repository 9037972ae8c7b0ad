use std::sync::Arc;

use arqon_config::{StorageBackend as ConfigBackend, StorageConfig, StorageMode};

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::log_stream::LogStreamBackend;
use crate::memory::MemoryBackend;
use crate::sql::SqlBackend;

const DEFAULT_STREAM_PREFIX: &str = "arqonbus";

/// Builds the configured storage backend, matching the source's
/// `StorageRegistry.create_backend` dispatch by backend name. A backend
/// with no configured URL in strict mode refuses to start outright.
pub async fn build(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let strict = config.mode == StorageMode::Strict;

    match config.backend {
        None | Some(ConfigBackend::Memory) => Ok(Arc::new(MemoryBackend::new(config.max_history_size))),
        Some(ConfigBackend::LogStream) => match &config.log_stream_url {
            Some(url) => {
                let backend =
                    LogStreamBackend::connect(url, strict, DEFAULT_STREAM_PREFIX, config.max_history_size, config.max_history_size)
                        .await?;
                Ok(Arc::new(backend))
            }
            None if strict => Err(Error::Strict("log_stream backend requires a configured URL in strict mode".to_string())),
            None => Ok(Arc::new(LogStreamBackend::degraded(
                DEFAULT_STREAM_PREFIX,
                config.max_history_size,
                config.max_history_size,
            ))),
        },
        Some(ConfigBackend::Sql) => match &config.sql_url {
            Some(url) => Ok(Arc::new(SqlBackend::connect(url, strict, config.max_history_size).await?)),
            None if strict => Err(Error::Strict("sql backend requires a configured URL in strict mode".to_string())),
            None => Ok(Arc::new(SqlBackend::degraded(config.max_history_size))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_memory_backend() {
        let config = StorageConfig::default();
        let backend = build(&config).await.unwrap();
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn strict_log_stream_without_url_refuses_to_start() {
        let config = StorageConfig {
            backend: Some(ConfigBackend::LogStream),
            mode: StorageMode::Strict,
            ..StorageConfig::default()
        };
        let err = build(&config).await.unwrap_err();
        assert!(matches!(err, Error::Strict(_)));
    }
}
