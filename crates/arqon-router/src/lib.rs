pub mod error;
pub mod router;

pub use error::{Error, Result};
pub use router::{Router, RouterHealth, RouterStatus};
