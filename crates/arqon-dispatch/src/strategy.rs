#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Load-balance: one live group member handles the task.
    RoundRobin,
    /// Parallel speculation: every live member gets the task; a
    /// [`crate::collector::WinnerSelector`] picks the result that counts.
    Competing,
    /// Informational fan-out: every live member gets the task, no result
    /// collection.
    Broadcast,
}

impl DispatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStrategy::RoundRobin => "round_robin",
            DispatchStrategy::Competing => "competing",
            DispatchStrategy::Broadcast => "broadcast",
        }
    }
}
