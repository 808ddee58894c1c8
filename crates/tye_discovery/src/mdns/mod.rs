//! Multicast DNS discovery of dashboards that announce themselves.

pub mod browser;
pub mod client;
pub mod codec;

pub use browser::{BrowseState, MdnsService};
pub use client::MdnsBrowser;
