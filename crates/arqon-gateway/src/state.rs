//! Shared broker state: every subsystem a connection handler or command
//! executor needs, wired together once at startup and handed around as
//! `Arc<GatewayState>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arqon_config::ArqonBusConfig;
use arqon_dispatch::{OperatorAuth, OperatorRegistry, ResultCollector, TaskDispatcher};
use arqon_registry::ClientRegistry;
use arqon_router::Router;
use arqon_storage::{ConsumerGroupStore, StorageBackend};
use arqon_telemetry::TelemetryEmitter;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::casil_gate::CasilGate;
use crate::telemetry_fanout::BusFanOut;

/// Everything a connection or command handler needs, bundled once at
/// startup. Cheap to clone (every field is an `Arc` or plain data);
/// handlers hold `Arc<GatewayState>`.
pub struct GatewayState {
    pub config: ArqonBusConfig,
    pub registry: Arc<ClientRegistry>,
    pub router: Arc<Router>,
    pub operators: Arc<OperatorRegistry>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub collector: Arc<ResultCollector>,
    pub storage: Arc<dyn StorageBackend>,
    pub consumer_groups: Option<Arc<dyn ConsumerGroupStore>>,
    pub telemetry: Arc<TelemetryEmitter>,
    pub casil: Arc<CasilGate>,
    /// Root of the per-connection task tree; cancelling this cancels every
    /// connection-tied task (including operator delivery loops) as a unit.
    pub shutdown: CancellationToken,
    connection_count: AtomicU64,
}

impl GatewayState {
    /// Assembles the broker from a loaded configuration. Storage backend
    /// construction is the one place that branches on backend kind: a
    /// log-stream backend is built concretely so a second `Arc` handle can
    /// be coerced to `dyn ConsumerGroupStore` alongside the `dyn
    /// StorageBackend` handle every backend provides.
    pub async fn new(config: ArqonBusConfig) -> crate::error::Result<Arc<Self>> {
        let registry = Arc::new(ClientRegistry::new());
        let router = Arc::new(Router::new(registry.clone()));

        let operator_auth = if config.operator.auth_required {
            OperatorAuth {
                required: true,
                token: config.operator.auth_token.clone(),
            }
        } else {
            OperatorAuth::disabled()
        };
        let operators = Arc::new(OperatorRegistry::new(operator_auth));
        let dispatcher = Arc::new(TaskDispatcher::new(operators.clone(), router.clone()));
        let collector = Arc::new(ResultCollector::with_default_selector());

        let (storage, consumer_groups) = build_storage(&config).await?;

        let fan_out = Arc::new(BusFanOut::new(registry.clone(), config.telemetry.telemetry_room.clone()));
        let telemetry = Arc::new(TelemetryEmitter::new(&config.telemetry, fan_out));

        let casil = Arc::new(CasilGate::new(config.casil.clone()));

        Ok(Arc::new(Self {
            config,
            registry,
            router,
            operators,
            dispatcher,
            collector,
            storage,
            consumer_groups,
            telemetry,
            casil,
            shutdown: CancellationToken::new(),
            connection_count: AtomicU64::new(0),
        }))
    }

    /// Admits a new connection if under the configured limit, returning a
    /// guard that decrements the count when dropped. `None` means the
    /// connection must be rejected (spec: close immediately, code 1013).
    pub fn try_admit_connection(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let max = self.config.server.max_connections as u64;
        loop {
            let current = self.connection_count.load(Ordering::SeqCst);
            if current >= max {
                return None;
            }
            if self
                .connection_count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(ConnectionGuard { state: self.clone() });
            }
        }
    }

    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// A task-tree root tied to this connection, itself a child of the
    /// broker-wide shutdown token so a global shutdown cancels every
    /// connection at once.
    pub fn connection_cancellation(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// RAII connection-slot guard; dropping it frees the slot so the next
/// accept can reuse it.
pub struct ConnectionGuard {
    state: Arc<GatewayState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connection_count.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn build_storage(
    config: &ArqonBusConfig,
) -> crate::error::Result<(Arc<dyn StorageBackend>, Option<Arc<dyn ConsumerGroupStore>>)> {
    use arqon_config::StorageBackend as ConfigBackend;
    use arqon_storage::LogStreamBackend;

    let strict = config.storage.mode == arqon_config::StorageMode::Strict;

    if config.storage.backend == Some(ConfigBackend::LogStream) {
        let concrete = match &config.storage.log_stream_url {
            Some(url) => {
                LogStreamBackend::connect(
                    url,
                    strict,
                    "arqonbus",
                    config.storage.max_history_size,
                    config.storage.max_history_size,
                )
                .await?
            }
            None if strict => {
                return Err(arqon_storage::Error::Strict(
                    "log_stream backend requires a configured URL in strict mode".to_string(),
                )
                .into())
            }
            None => LogStreamBackend::degraded(
                "arqonbus",
                config.storage.max_history_size,
                config.storage.max_history_size,
            ),
        };
        let concrete = Arc::new(concrete);
        let as_storage: Arc<dyn StorageBackend> = concrete.clone();
        let as_groups: Arc<dyn ConsumerGroupStore> = concrete;
        return Ok((as_storage, Some(as_groups)));
    }

    let backend = arqon_storage::build(&config.storage).await?;
    Ok((backend, None))
}
