//! Background processors.
//!
//! - `BitbucketSync`: Receives `ResyncRequest`, reloads open pull requests
//!   from the Bitbucket REST API into the registry
//!
//! Webhook handling and delivery are request-driven and live in
//! `handlers` and `delivery`.

pub mod bitbucket_sync;

pub use bitbucket_sync::BitbucketSync;
