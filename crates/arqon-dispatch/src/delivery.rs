use std::sync::Arc;
use std::time::Duration;

use arqon_protocol::{Envelope, EnvelopeType};
use arqon_registry::ClientRegistry;
use arqon_storage::ConsumerGroupStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const READ_COUNT: usize = 1;
const BLOCK_MS: u64 = 5_000;

pub fn stream_for(group: &str) -> String {
    format!("arqonbus:group:{group}")
}

/// Runs a single operator's cooperative read loop: pull one record at a
/// time from the group's consumer-group stream and forward it, without
/// acking. Acking happens later, out of band, when the operator sends an
/// explicit acknowledgement command. Cancels promptly when `cancel` fires
/// (operator disconnect) or the operator socket closes.
pub async fn run(
    storage: Arc<dyn ConsumerGroupStore>,
    registry: Arc<ClientRegistry>,
    group: String,
    operator_id: String,
    cancel: CancellationToken,
) {
    let stream = stream_for(&group);
    if let Err(e) = storage.ensure_group(&stream, &group).await {
        warn!(stream, group, error = %e, "failed to ensure consumer group, delivery loop exiting");
        return;
    }

    loop {
        if cancel.is_cancelled() || !registry.has_client(&operator_id).await {
            break;
        }

        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            result = storage.read_group(&stream, &group, &operator_id, READ_COUNT, BLOCK_MS) => result,
        };

        let records = match batch {
            Ok(records) => records,
            Err(e) => {
                warn!(stream, group, error = %e, "read_group failed, backing off");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        for (stream_id, fields) in records {
            let envelope = envelope_from_fields(&fields);
            debug!(stream_id, operator_id, "delivering task to operator");
            if !registry.send_to(&operator_id, Arc::new(envelope)).await {
                warn!(operator_id, "operator socket closed mid-delivery");
                return;
            }
        }
    }

    info!(group, operator_id, "task delivery loop exiting");
}

fn envelope_from_fields(fields: &std::collections::HashMap<String, String>) -> Envelope {
    let payload = fields
        .get("payload")
        .and_then(|p| serde_json::from_str(p).ok())
        .unwrap_or_default();

    Envelope::build(EnvelopeType::Command)
        .with_command(fields.get("command").cloned().unwrap_or_default(), Default::default())
        .with_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_name_is_namespaced_per_group() {
        assert_eq!(stream_for("code.python"), "arqonbus:group:code.python");
    }
}
