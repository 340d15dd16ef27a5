// fuzzy-daemon library entry point.

pub mod config;
pub mod error;
pub mod rpc;
pub mod runtime;
pub mod sandbox;
pub mod search;
pub mod security;
pub mod session;
pub mod store;
