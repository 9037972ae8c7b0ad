use std::sync::Arc;

use arqon_protocol::Envelope;
use arqon_router::Router;
use tracing::{info, warn};

use crate::error::Result;
use crate::operators::OperatorRegistry;
use crate::strategy::DispatchStrategy;

/// Routes tasks to operator groups according to a [`DispatchStrategy`],
/// delegating the actual socket send to the shared [`Router`].
pub struct TaskDispatcher {
    operators: Arc<OperatorRegistry>,
    router: Arc<Router>,
}

impl TaskDispatcher {
    pub fn new(operators: Arc<OperatorRegistry>, router: Arc<Router>) -> Self {
        Self { operators, router }
    }

    /// Dispatches `task` to the group named by `required_capability`,
    /// returning how many operators actually received it.
    pub async fn dispatch(
        &self,
        task: &Envelope,
        required_capability: &str,
        strategy: DispatchStrategy,
    ) -> Result<usize> {
        let targets = match strategy {
            DispatchStrategy::RoundRobin => {
                match self.operators.next_round_robin(required_capability).await {
                    Some(id) => vec![id],
                    None => Vec::new(),
                }
            }
            DispatchStrategy::Competing | DispatchStrategy::Broadcast => {
                self.operators.operators_in(required_capability).await
            }
        };

        if targets.is_empty() {
            warn!(capability = required_capability, "no operators found for capability");
            return Ok(0);
        }

        let mut sent = 0;
        for target in &targets {
            let envelope = Arc::new(task.clone());
            if self.router.route_direct(envelope, target).await.is_ok() {
                sent += 1;
            }
        }

        info!(
            task_id = %task.id,
            capability = required_capability,
            strategy = strategy.as_str(),
            sent,
            "dispatched task"
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;
    use arqon_registry::ClientRegistry;
    use tokio::sync::mpsc;

    async fn setup() -> (TaskDispatcher, String) {
        let client_registry = Arc::new(ClientRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let operator_id = client_registry.register(tx, None, None).await.unwrap();

        let operators = Arc::new(OperatorRegistry::new(crate::operators::OperatorAuth::disabled()));
        operators.register(&operator_id, "code.python", "").await;

        let router = Arc::new(Router::new(client_registry));
        (TaskDispatcher::new(operators, router), operator_id)
    }

    #[tokio::test]
    async fn round_robin_sends_to_exactly_one_operator() {
        let (dispatcher, _operator_id) = setup().await;
        let task = Envelope::build(EnvelopeType::Command).with_command("run", Default::default());
        let sent = dispatcher.dispatch(&task, "code.python", DispatchStrategy::RoundRobin).await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn missing_capability_dispatches_to_nobody() {
        let (dispatcher, _operator_id) = setup().await;
        let task = Envelope::build(EnvelopeType::Command).with_command("run", Default::default());
        let sent = dispatcher.dispatch(&task, "code.rust", DispatchStrategy::Competing).await.unwrap();
        assert_eq!(sent, 0);
    }
}
