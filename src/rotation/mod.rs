//! Rotation of outbound network identities
//!
//! # Components
//!
//! - `RotationPool`: per-worker cyclic set of proxies and user agents
//! - `ProxySource`: on-demand supplier of proxy endpoints (direct, file, HTTP)

mod pool;
mod source;

pub use pool::{Identity, RotationPool};
pub use source::{
    parse_proxy_list, source_from_config, DirectSource, FileProxySource, HttpProxySource,
    ProxyEndpoint, ProxySource,
};
