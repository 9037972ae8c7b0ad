pub mod collector;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod operators;
pub mod strategy;

pub use collector::{FirstResponseWins, ResultCollector, WinnerSelector};
pub use dispatcher::TaskDispatcher;
pub use error::{Error, Result};
pub use operators::{OperatorAuth, OperatorInfo, OperatorRegistry};
pub use strategy::DispatchStrategy;
