//! Scanning for wands and turning matching peripherals into sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::WandError;
use crate::session::Session;
use crate::transport::Discovery;

/// Which discovered devices count as wands. At least one field must be
/// set before scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Exact advertised-name match.
    pub name: Option<String>,
    /// Advertised-name prefix match.
    pub prefix: Option<String>,
    /// Exact hardware-address match.
    pub mac: Option<String>,
}

impl Selector {
    pub fn with_name(name: impl Into<String>) -> Selector {
        Selector {
            name: Some(name.into()),
            ..Selector::default()
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Selector {
        Selector {
            prefix: Some(prefix.into()),
            ..Selector::default()
        }
    }

    pub fn with_mac(mac: impl Into<String>) -> Selector {
        Selector {
            mac: Some(mac.into()),
            ..Selector::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none() && self.mac.is_none()
    }

    /// Every configured criterion must match: `mode` counts the fields
    /// that are set, `found` the ones the device satisfies, and the
    /// device passes iff `found >= mode`.
    pub fn matches(&self, name: Option<&str>, address: &str) -> bool {
        let mut mode = 0;
        let mut found = 0;

        if let Some(wanted) = &self.name {
            mode += 1;
            if name == Some(wanted.as_str()) {
                found += 1;
            }
        }
        if let Some(prefix) = &self.prefix {
            mode += 1;
            if name.map_or(false, |n| n.starts_with(prefix.as_str())) {
                found += 1;
            }
        }
        if let Some(mac) = &self.mac {
            mode += 1;
            if address == mac {
                found += 1;
            }
        }

        found >= mode
    }
}

/// Scanner that produces [`Session`]s for matching wands. Owns only the
/// sessions it hands out; there is no process-wide registry.
pub struct Shop<D: Discovery> {
    discovery: D,
}

impl<D: Discovery> Shop<D> {
    pub fn new(discovery: D) -> Shop<D> {
        Shop { discovery }
    }

    /// Scans for `timeout`, wrapping every first-seen matching device in
    /// a session. With `auto_connect`, connects each produced session
    /// sequentially; a connect failure is logged and leaves that session
    /// in the result disconnected, without aborting the rest.
    pub async fn scan(
        &self,
        selector: &Selector,
        timeout: Duration,
        auto_connect: bool,
    ) -> Result<Vec<Arc<Session<D::Transport>>>, WandError> {
        self.scan_with_cancel(selector, timeout, auto_connect, &CancellationToken::new())
            .await
    }

    /// Like [`scan`](Shop::scan), but stops consuming discoveries when
    /// `cancel` fires and returns whatever was found so far.
    pub async fn scan_with_cancel(
        &self,
        selector: &Selector,
        timeout: Duration,
        auto_connect: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Session<D::Transport>>>, WandError> {
        if selector.is_empty() {
            return Err(WandError::NoSelectorProvided);
        }

        info!("Scanning for wands for {:?}...", timeout);
        let mut devices = self
            .discovery
            .discover(timeout)
            .await
            .map_err(|source| WandError::ScanFailed { source })?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut sessions = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scan cancelled after {} wand(s)", sessions.len());
                    break;
                }
                device = devices.next() => {
                    let Some(device) = device else { break };

                    if !selector.matches(device.identity.name.as_deref(), &device.identity.address) {
                        debug!("Skipping non-matching device {}", device.identity);
                        continue;
                    }
                    if !seen.insert(device.identity.address.clone()) {
                        continue;
                    }

                    info!("Found wand {}", device.identity);
                    sessions.push(Arc::new(Session::new(device.identity, device.transport)));
                }
            }
        }

        if auto_connect {
            for session in &sessions {
                if let Err(err) = session.connect().await {
                    warn!("Failed to connect to {}: {}", session.identity(), err);
                }
            }
        }

        Ok(sessions)
    }
}
