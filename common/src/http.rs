use crate::errors::*;
pub use reqwest::blocking::Client;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("pmexplain/", env!("CARGO_PKG_VERSION"));

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(Error::from)
}
