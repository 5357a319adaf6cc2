//! Protocol checkers, retry policy, and status classification.
//!
//! One probe strategy per target type; every probe produces a
//! [`CheckOutcome`] and never panics or aborts the process. Failures are
//! target-scoped: reachability problems classify as `down`, checker-internal
//! problems as `error`.

pub mod http;
pub mod net;
pub mod visual;
pub mod whois;

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::normalize::NormalizeRules;
use crate::store::{Store, Target, TargetKind};
use self::visual::{HeadlessBrowser, ScreenCapture};

/// Final classification of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
    Changed,
    Unchanged,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::Changed => "changed",
            Status::Unchanged => "unchanged",
            Status::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Status {
        match s {
            "up" => Status::Up,
            "down" => Status::Down,
            "changed" => Status::Changed,
            "unchanged" => Status::Unchanged,
            _ => Status::Error,
        }
    }

    /// States that stop the retry loop early.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Status::Up | Status::Unchanged | Status::Changed)
    }

    /// States that are handed to the notification dispatcher.
    pub fn is_alertable(&self) -> bool {
        matches!(self, Status::Down | Status::Changed | Status::Error)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one probe observed.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: Status,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    /// Extracted content; empty when the protocol has none.
    pub content: String,
    /// Hash of the normalized content.
    pub content_hash: String,
    pub error: Option<String>,
    pub tls_expiry: Option<chrono::DateTime<chrono::Utc>>,
    /// Whether the expected keyword was found; None when none is configured.
    pub body_match: Option<bool>,
    /// Visual diff percentage, for visual checks.
    pub diff_percent: Option<f64>,
}

impl CheckOutcome {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            status_code: None,
            response_time: Duration::ZERO,
            content: String::new(),
            content_hash: String::new(),
            error: None,
            tls_expiry: None,
            body_match: None,
            diff_percent: None,
        }
    }

    /// A `down` or `error` outcome carrying a message.
    pub fn failure(status: Status, error: impl Into<String>, elapsed: Duration) -> Self {
        let mut out = Self::new(status);
        out.error = Some(error.into());
        out.response_time = elapsed;
        out
    }
}

/// Classify content against the stored baseline hash: no baseline means the
/// first observation (`up`), otherwise the hashes decide changed/unchanged.
pub fn classify_content(hash: &str, baseline: Option<&str>) -> Status {
    match baseline {
        None => Status::Up,
        Some(prev) if prev != hash => Status::Changed,
        Some(_) => Status::Unchanged,
    }
}

/// Check whether a status code is in the accept-status spec.
/// Format: "200,201,300-399,404" — comma-separated codes or ranges.
/// An empty spec accepts 200..=399.
pub fn status_accepted(code: u16, spec: &str) -> bool {
    if spec.is_empty() {
        return (200..400).contains(&code);
    }
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.find('-') {
            Some(idx) if idx > 0 => {
                let lo = part[..idx].trim().parse::<u16>();
                let hi = part[idx + 1..].trim().parse::<u16>();
                if let (Ok(lo), Ok(hi)) = (lo, hi) {
                    if code >= lo && code <= hi {
                        return true;
                    }
                }
            }
            _ => {
                if part.parse::<u16>().map(|v| v == code).unwrap_or(false) {
                    return true;
                }
            }
        }
    }
    false
}

/// Re-invokes a probe on failure with a fixed delay between attempts.
///
/// Terminal-success states return immediately; the final attempt's result is
/// returned as-is. The delay is injectable so tests run without wall-clock
/// waits.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub async fn run<F, Fut>(&self, attempts: u32, mut probe: F) -> CheckOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CheckOutcome>,
    {
        let attempts = attempts.max(1);
        let mut outcome = probe().await;
        for _ in 1..attempts {
            if outcome.status.is_terminal_success() {
                return outcome;
            }
            tokio::time::sleep(self.delay).await;
            outcome = probe().await;
        }
        outcome
    }
}

/// Runs probes for targets: dispatch by type, retries, classification.
pub struct Checker {
    pub(crate) rules: NormalizeRules,
    pub(crate) retry: RetryPolicy,
    pub(crate) capture: Box<dyn ScreenCapture>,
    pub(crate) screenshot_dir: PathBuf,
}

impl Checker {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            rules: NormalizeRules::default(),
            retry: RetryPolicy::default(),
            capture: Box::new(HeadlessBrowser),
            screenshot_dir: data_dir.join("screenshots"),
        }
    }

    /// Replace the normalization rule list.
    pub fn with_rules(mut self, rules: NormalizeRules) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the retry policy (tests inject a zero delay).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the screenshot capture implementation.
    pub fn with_capture(mut self, capture: Box<dyn ScreenCapture>) -> Self {
        self.capture = capture;
        self
    }

    /// Run the full check for a target: retry loop around the probe, with
    /// classification against the latest stored snapshot. Persists nothing;
    /// the caller decides what to do with the outcome.
    pub async fn check(&self, store: &Store, target: &Target) -> CheckOutcome {
        self.retry
            .run(target.retries, || self.check_once(store, target))
            .await
    }

    async fn check_once(&self, store: &Store, target: &Target) -> CheckOutcome {
        match target.kind {
            TargetKind::Http => self.check_http(store, target).await,
            TargetKind::Tcp => net::check_tcp(target).await,
            TargetKind::Ping => net::check_ping(target).await,
            TargetKind::Dns => net::check_dns(store, target).await,
            TargetKind::Visual => self.check_visual(target).await,
            TargetKind::Whois => self.check_whois(store, target).await,
        }
    }
}
