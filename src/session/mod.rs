//! Session state shared by every request of a crawl
//!
//! # Components
//!
//! - `IdentityPool`: user-agent strings, one of which is chosen per session
//! - `ProxyRegistry`: egress proxies and the rotation cursor

mod identity;
mod proxy;

// Re-export main types
pub use identity::{IdentityPool, DEFAULT_IDENTITIES};
pub use proxy::{ProxyEndpoint, ProxyRegistry};
