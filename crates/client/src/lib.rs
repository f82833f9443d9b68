#![forbid(unsafe_code)]

//! Rate-limited HTTP access to the Habitica v3 API.

pub mod api;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod paginate;
pub mod rate;
pub mod response;

pub use api::{HabitApi, HabiticaClient};
pub use client::RateLimitedClient;
pub use config::{min_interval_for, ClientConfig, ConfigError};
pub use endpoints::{action_endpoint, Endpoint};
pub use paginate::{paginate, Paginated};
pub use rate::{RateLimiter, RateState};
pub use response::classify;
