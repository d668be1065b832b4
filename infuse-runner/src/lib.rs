//! Drivers around `infuse_engine`: rule set configuration, change
//! record decoding, the offline (file) and online (UDP) streams, and
//! result output.
pub mod config;
pub mod offline;
pub mod online;
pub mod output;
pub mod record;

pub use config::ConfigError;
pub use config::DeclaredFunctions;
pub use config::RuleSet;
pub use offline::Stats;
