//! Bounded polling of a health endpoint.
//!
//! ```text
//! Unchecked ──first attempt──▶ Polling ──response──▶ Ready
//!                                 │
//!                                 └──max attempts──▶ Failed
//! ```
//!
//! The interval is fixed, so the worst case is `max_attempts × interval`.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_HEALTH_URL: &str = "http://localhost:8080/health";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("{url} did not respond after {attempts} attempts")]
    Timeout { url: String, attempts: u32 },
}

/// Parameters of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub url: String,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self {
            url: DEFAULT_HEALTH_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unchecked,
    Polling { attempts: u32 },
    Ready { attempts: u32 },
    Failed { attempts: u32 },
}

/// One connectivity check.
#[allow(async_fn_in_trait)]
pub trait Probe {
    /// `true` if the target answered at all.
    async fn check(&self, url: &str) -> bool;
}

impl<P: Probe + ?Sized> Probe for &P {
    async fn check(&self, url: &str) -> bool {
        (**self).check(url).await
    }
}

/// HTTP probe. Any response counts as success, whatever the status code.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                debug!("{} answered {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("{} not reachable: {}", url, e);
                false
            }
        }
    }
}

/// Runs a [`ReadinessCheck`] through a [`Probe`].
pub struct ReadinessProber<P> {
    check: ReadinessCheck,
    probe: P,
    state: ProbeState,
}

impl ReadinessProber<HttpProbe> {
    pub fn http(check: ReadinessCheck) -> Self {
        Self::new(check, HttpProbe::default())
    }
}

impl<P: Probe> ReadinessProber<P> {
    pub fn new(check: ReadinessCheck, probe: P) -> Self {
        Self {
            check,
            probe,
            state: ProbeState::Unchecked,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Poll until the target answers or the attempts run out.
    ///
    /// Returns the number of attempts it took. Ready and Failed are terminal:
    /// calling this again returns the same outcome without probing.
    pub async fn wait_ready(&mut self) -> Result<u32, ReadinessError> {
        loop {
            let attempts = match self.state {
                ProbeState::Ready { attempts } => return Ok(attempts),
                ProbeState::Failed { attempts } => {
                    return Err(ReadinessError::Timeout {
                        url: self.check.url.clone(),
                        attempts,
                    })
                }
                ProbeState::Unchecked => {
                    info!("Waiting for {}", self.check.url);
                    0
                }
                ProbeState::Polling { attempts } => {
                    tokio::time::sleep(self.check.interval).await;
                    attempts
                }
            };

            let attempts = attempts + 1;
            self.state = if self.probe.check(&self.check.url).await {
                info!("{} is ready after {} attempt(s)", self.check.url, attempts);
                ProbeState::Ready { attempts }
            } else if attempts >= self.check.max_attempts {
                ProbeState::Failed { attempts }
            } else {
                ProbeState::Polling { attempts }
            };
        }
    }
}
