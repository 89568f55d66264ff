//! Runtime configuration re-exports.
//!
//! The validated config types live in `prcast-core::config` so the core
//! processors can read them; this module re-exports them for convenience.

pub use prcast_core::config::{
    BitbucketConfig, BitbucketCredentials, DeliveryConfig, ServerConfig, SharedConfig,
};
