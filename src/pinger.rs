#![forbid(unsafe_code)]

//! Periodic liveness self-ping.
//!
//! Hosted deployments idle out when no traffic arrives; hitting our own
//! `/ping` route on a timer keeps the process warm. The task is best-effort:
//! every failure is swallowed, and a stop signal lets the binary join it on
//! graceful shutdown instead of leaking the task.

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};

pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the running ping loop.
pub struct LivenessPinger {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LivenessPinger {
    /// Starts pinging `<public_url>/ping` every `interval`.
    pub fn spawn(public_url: &str, interval: Duration) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let url = ping_url(public_url);
        let handle = tokio::spawn(run(url, interval, stop_rx));
        Self { stop, handle }
    }

    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

async fn run(url: String, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let agent = ureq::AgentBuilder::new().timeout(PING_TIMEOUT).build();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let agent = agent.clone();
                let url_for_ping = url.clone();
                let outcome = tokio::task::spawn_blocking(move || ping_once(&agent, &url_for_ping)).await;
                if !matches!(outcome, Ok(true)) {
                    log::debug!("liveness ping against {url} missed");
                }
            }
            _ = stop_rx.changed() => break,
        }
    }
}

fn ping_once(agent: &ureq::Agent, url: &str) -> bool {
    agent.get(url).call().is_ok()
}

fn ping_url(public_url: &str) -> String {
    format!("{}/ping", public_url.trim_end_matches('/'))
}
