#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod bitbucket;
pub mod config;
pub mod delivery;
pub mod entities;
pub mod events;
pub mod handlers;
pub mod processors;
