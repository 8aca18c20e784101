//! ChanRelay Backend Gateway
//!
//! Forwards privileged commands and bookkeeping notices from the relay to the
//! trusted backend over sealed HTTP requests.
//!
//! ## Components
//!
//! - **BackendClient**: seals requests, posts them, classifies the response
//! - **ResponseCache**: (command, payload) -> response, expiry set per
//!   response by the backend
//! - **HealthTracker**: last successful call per endpoint bucket
//!
//! ## Endpoints
//!
//! - `POST /cmd/<command>` - remote command on behalf of an end user
//! - `POST /stats` - aggregated statistics
//! - `POST /topics` - topic added / topics cleaned up
//! - `POST /startup` - relay startup announcement
//!
//! Every request body is a sealed envelope (`nonce`, `msg`, `id`); see
//! [`chanrelay_crypto::RequestSealer`].

mod cache;
mod client;
mod error;
mod health;

pub use cache::{CacheKey, ResponseCache};
pub use client::{parse_cache_duration, BackendClient, BackendConfig, CACHE_DURATION_HEADER};
pub use error::{BackendError, ForwardedError, Result};
pub use health::{HealthBucket, HealthSnapshot, HealthTracker, COMMAND_PATH_PREFIX};
