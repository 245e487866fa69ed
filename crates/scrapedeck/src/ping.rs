//! Backend health pings.
//!
//! Both backends may sleep when idle. [`ScrapedeckClient::keep_alive`]
//! pings them on a fixed cadence so the first real request doesn't pay
//! the wake-up cost.

use std::time::Duration;

use scrapedeck_session::TokenStore;
use scrapedeck_timer::{PeriodicConfig, Timer};
use scrapedeck_transport::{Call, HttpTransport};
use tracing::{info, warn};

use crate::ScrapedeckClient;

/// Per-backend timeout of a single ping.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cadence for [`ScrapedeckClient::keep_alive`].
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

const KEEP_ALIVE_TIMER: &str = "backend-keep-alive";

/// Result of pinging one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOutcome {
    pub base_url: String,
    /// `None` if no response arrived within [`PING_TIMEOUT`].
    pub status: Option<u16>,
}

impl PingOutcome {
    pub fn is_healthy(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

impl<S: TokenStore> ScrapedeckClient<S> {
    /// Pings the API and the playground at the same time. Never fails;
    /// unreachable backends report no status.
    pub async fn ping(&self) -> Vec<PingOutcome> {
        let (api, playground) = tokio::join!(ping_one(&self.api), ping_one(&self.playground));
        vec![api, playground]
    }

    /// Pings both backends now and then every `interval` until the
    /// returned timer is cancelled or dropped.
    pub fn keep_alive(&self, interval: Duration) -> Timer {
        let first = self.clone();
        tokio::spawn(async move {
            first.ping().await;
        });

        let client = self.clone();
        Timer::every(KEEP_ALIVE_TIMER, PeriodicConfig::with_period(interval), move || {
            let client = client.clone();
            async move {
                client.ping().await;
            }
        })
    }
}

async fn ping_one(http: &HttpTransport) -> PingOutcome {
    let call = Call::get("/").timeout(PING_TIMEOUT);
    let status = match http.exchange(&call).await {
        Ok((status, _)) => Some(status.as_u16()),
        Err(e) => {
            warn!(base_url = http.base_url(), error = %e, "ping failed");
            None
        }
    };
    let outcome = PingOutcome {
        base_url: http.base_url().to_owned(),
        status,
    };
    if outcome.is_healthy() {
        info!(base_url = http.base_url(), "ping succeeded");
    } else if let Some(status) = status {
        warn!(base_url = http.base_url(), status, "ping rejected");
    }
    outcome
}
