//! Unique identifier generation for ArqonBus messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Process-wide generator for message, client, room, and channel ids.
///
/// Message ids are `arq_<start_time_ns>_<counter>_<rand6hex>`: a timestamp
/// fixed at generator creation, a monotonically incrementing counter, and a
/// short random suffix for extra uniqueness within the same nanosecond.
pub struct IdGenerator {
    start_time_ns: u128,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            start_time_ns: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn generate_message_id(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let rand6 = &Uuid::new_v4().simple().to_string()[..6];
        format!("arq_{}_{}_{}", self.start_time_ns, counter, rand6)
    }

    pub fn generate_client_id(&self) -> String {
        format!("arq_client_{}", Uuid::new_v4().simple())
    }

    pub fn generate_room_id(&self) -> String {
        format!("arq_room_{}", Uuid::new_v4().simple())
    }

    pub fn generate_channel_id(&self) -> String {
        format!("arq_channel_{}", Uuid::new_v4().simple())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn global() -> &'static IdGenerator {
    static GEN: OnceLock<IdGenerator> = OnceLock::new();
    GEN.get_or_init(IdGenerator::new)
}

/// Generate a message id using the global generator.
pub fn generate_message_id() -> String {
    global().generate_message_id()
}

pub fn generate_client_id() -> String {
    global().generate_client_id()
}

pub fn generate_room_id() -> String {
    global().generate_room_id()
}

pub fn generate_channel_id() -> String {
    global().generate_channel_id()
}

/// Checks a message id against the `arq_<timestamp>_<counter>_<rand6hex>` shape.
pub fn is_valid_message_id(message_id: &str) -> bool {
    let Some(rest) = message_id.strip_prefix("arq_") else {
        return false;
    };
    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() != 3 {
        return false;
    }
    if parts[0].parse::<u128>().is_err() {
        return false;
    }
    if parts[1].parse::<u64>().is_err() {
        return false;
    }
    let rand = parts[2];
    rand.len() == 6 && u32::from_str_radix(rand, 16).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique_and_valid() {
        let gen = IdGenerator::new();
        let a = gen.generate_message_id();
        let b = gen.generate_message_id();
        assert_ne!(a, b);
        assert!(is_valid_message_id(&a));
        assert!(is_valid_message_id(&b));
    }

    #[test]
    fn prefixed_ids_have_expected_prefix() {
        let gen = IdGenerator::new();
        assert!(gen.generate_client_id().starts_with("arq_client_"));
        assert!(gen.generate_room_id().starts_with("arq_room_"));
        assert!(gen.generate_channel_id().starts_with("arq_channel_"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_message_id(""));
        assert!(!is_valid_message_id("not_arq_prefixed"));
        assert!(!is_valid_message_id("arq_123_456"));
        assert!(!is_valid_message_id("arq_123_456_zzzzzz"));
        assert!(!is_valid_message_id("arq_abc_456_aaaaaa"));
        assert!(!is_valid_message_id("arq_123_456_aaaaa"));
    }

    #[test]
    fn counter_is_monotonic() {
        let gen = IdGenerator::new();
        let ids: Vec<String> = (0..50).map(|_| gen.generate_message_id()).collect();
        let counters: Vec<u64> = ids
            .iter()
            .map(|id| id.split('_').nth(2).unwrap().parse::<u64>().unwrap())
            .collect();
        for pair in counters.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }
}
