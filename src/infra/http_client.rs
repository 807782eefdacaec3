use std::time::Duration;

use crate::common::error::Result;

/// Connect and whole-request timeouts for one upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl HttpTimeouts {
    pub fn from_secs(connect: u64, request: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            request: Duration::from_secs(request),
        }
    }
}

/// Build a pooled client. Timeouts surface as `reqwest::Error::is_timeout`.
pub fn build_client(timeouts: HttpTimeouts) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .user_agent(concat!("mdm_pipeline/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
