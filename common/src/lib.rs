pub mod cache;
pub mod classify;
pub mod config;
pub mod debci;
pub mod deps;
pub mod diagnostics;
pub mod errors;
pub mod excuses;
pub mod hints;
pub mod http;
pub mod launchpad;
pub mod query;
