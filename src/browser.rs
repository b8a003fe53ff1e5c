//! Tab changes from the browser extension: debounced, localized and handed
//! to the arbiter as Chrome sessions.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::arbiter::ActivityArbiter;
use crate::clock::{parse_aware, UserLocalTime};
use crate::models::ChromeSession;
use crate::settings::SettingsStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabChange {
    pub tab_title: String,
    pub url: String,
    /// ISO-8601 with offset.
    pub start_time: String,
}

/// Host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|err| anyhow!("invalid tab url '{url}': {err}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("tab url '{url}' has no host"))?;
    Ok(host.strip_prefix("www.").unwrap_or(host).to_lowercase())
}

/// Holds the newest tab until it has survived the debounce window. A tab
/// replaced within the window is transient and never released.
#[derive(Debug)]
pub struct TabDebouncer {
    window: Duration,
    pending: Option<TabChange>,
    scheduled_at: Option<Instant>,
}

impl TabDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            scheduled_at: None,
        }
    }

    /// Returns the transient tab this one replaced, if any.
    pub fn push(&mut self, tab: TabChange, now: Instant) -> Option<TabChange> {
        self.scheduled_at = Some(now + self.window);
        self.pending.replace(tab)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduled_at
    }

    pub fn poll(&mut self, now: Instant) -> Option<TabChange> {
        match self.scheduled_at {
            Some(at) if now >= at => {
                self.scheduled_at = None;
                self.pending.take()
            }
            _ => None,
        }
    }
}

pub struct TabSessionFactory {
    local: UserLocalTime,
    settings: Arc<SettingsStore>,
}

impl TabSessionFactory {
    pub fn new(local: UserLocalTime, settings: Arc<SettingsStore>) -> Self {
        Self { local, settings }
    }

    pub fn to_session(&self, tab: &TabChange) -> Result<ChromeSession> {
        let start = parse_aware(&tab.start_time)?;
        let domain = domain_of(&tab.url)?;
        let productive = self.settings.classification().is_productive_domain(&domain);
        Ok(ChromeSession {
            domain,
            detail: tab.tab_title.clone(),
            start_time: self.local.localize(start),
            productive,
        })
    }
}

async fn release(tab: TabChange, factory: &Arc<TabSessionFactory>, arbiter: &Arc<ActivityArbiter>) {
    let factory = Arc::clone(factory);
    let arbiter = Arc::clone(arbiter);
    let outcome = tokio::task::spawn_blocking(move || {
        let session = factory.to_session(&tab)?;
        arbiter.set_chrome_state(session)
    })
    .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log_warn!("tab change rejected: {err}"),
        Err(err) => log_warn!("tab change task failed: {err}"),
    }
}

/// Debounces tab changes from `rx` and feeds survivors to the arbiter until
/// cancelled or the channel closes.
pub async fn run_tab_driver(
    mut rx: mpsc::Receiver<TabChange>,
    debounce: Duration,
    factory: Arc<TabSessionFactory>,
    arbiter: Arc<ActivityArbiter>,
    cancel: CancellationToken,
) {
    let mut debouncer = TabDebouncer::new(debounce);

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                log_info!("tab driver shutting down");
                break;
            }
            received = rx.recv() => match received {
                Some(tab) => {
                    if let Some(skipped) = debouncer.push(tab, Instant::now()) {
                        log_info!("skipping transient tab {}", skipped.url);
                    }
                }
                None => {
                    if let Some(tab) = debouncer.pending.take() {
                        release(tab, &factory, &arbiter).await;
                    }
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(tab) = debouncer.poll(Instant::now()) {
                    release(tab, &factory, &arbiter).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{is_kind, TrackerError};

    fn tab(url: &str) -> TabChange {
        TabChange {
            tab_title: "title".into(),
            url: url.into(),
            start_time: "2025-03-01T09:00:00Z".into(),
        }
    }

    #[test]
    fn domains_drop_www_and_case() {
        assert_eq!(domain_of("https://WWW.GitHub.com/rust-lang").unwrap(), "github.com");
        assert_eq!(domain_of("https://docs.rs/tokio").unwrap(), "docs.rs");
        assert!(domain_of("file:///tmp/x.html").is_err());
        assert!(domain_of("not a url").is_err());
    }

    #[test]
    fn successor_within_window_makes_a_tab_transient() {
        let start = Instant::now();
        let mut debouncer = TabDebouncer::new(Duration::from_millis(150));

        assert!(debouncer.push(tab("https://a.example"), start).is_none());
        let skipped = debouncer.push(tab("https://b.example"), start + Duration::from_millis(100));
        assert_eq!(skipped.unwrap().url, "https://a.example");

        assert!(debouncer.poll(start + Duration::from_millis(200)).is_none());
        let released = debouncer.poll(start + Duration::from_millis(250)).unwrap();
        assert_eq!(released.url, "https://b.example");
        assert!(debouncer.poll(start + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn tab_sessions_are_localized_and_classified() {
        let factory = TabSessionFactory::new(
            UserLocalTime::from_name("Asia/Tokyo").unwrap(),
            Arc::new(SettingsStore::new(None).unwrap()),
        );

        let session = factory.to_session(&tab("https://docs.rs/serde")).unwrap();
        assert_eq!(session.domain, "docs.rs");
        assert!(session.productive);
        assert_eq!(session.start_time.to_rfc3339(), "2025-03-01T18:00:00+09:00");

        let mut naive = tab("https://docs.rs/serde");
        naive.start_time = "2025-03-01T09:00:00".into();
        let err = factory.to_session(&naive).unwrap_err();
        assert!(is_kind(&err, |e| matches!(e, TrackerError::TimezoneUnaware(_))));
    }

    #[test]
    fn tab_change_record_uses_camel_case_fields() {
        let parsed: TabChange = serde_json::from_str(
            r#"{"tabTitle":"Rust","url":"https://rust-lang.org","startTime":"2025-03-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.tab_title, "Rust");
    }
}
