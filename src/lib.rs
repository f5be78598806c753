pub mod aggregate;
pub mod config;
pub mod constants;
pub mod error;
pub mod etl;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod rpc;
pub mod server;
pub mod sources;
pub mod types;

pub use error::{Result, ServiceError};
pub use normalize::{normalize_sigla, MatchPass, Normalizer, RuleStore};
