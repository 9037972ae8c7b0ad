pub mod env;
pub mod environment;
pub mod error;
pub mod preflight;
pub mod schema;
pub mod validate;

pub use environment::Environment;
pub use error::{Error, Result};
pub use schema::*;

/// Load configuration from the environment and run both field validation and
/// startup preflight in one call, matching the source's `get_config()`
/// behavior of refusing a bad configuration before the broker starts.
pub fn load() -> Result<ArqonBusConfig> {
    let cfg = env::from_environment()?;

    let mut errors = validate::validate(&cfg);
    errors.extend(preflight::preflight_errors(&cfg));

    if errors.is_empty() {
        Ok(cfg)
    } else {
        Err(Error::Preflight(errors))
    }
}
