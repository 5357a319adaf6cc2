//! TCP, ping, and DNS checkers.

use hickory_resolver::TokioAsyncResolver;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use url::Url;

use super::{classify_content, CheckOutcome, Status};
use crate::normalize::hash_content;
use crate::store::{Store, Target};

const TCP_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bare connect-with-timeout. The target URL is a host:port address.
pub(crate) async fn check_tcp(target: &Target) -> CheckOutcome {
    let start = Instant::now();
    let timeout = match target.timeout {
        0 => TCP_DEFAULT_TIMEOUT,
        secs => Duration::from_secs(secs),
    };

    let result = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&target.url)).await;
    let elapsed = start.elapsed();

    match result {
        Ok(Ok(_stream)) => {
            let mut out = CheckOutcome::new(Status::Up);
            out.response_time = elapsed;
            out
        }
        Ok(Err(e)) => CheckOutcome::failure(Status::Down, e.to_string(), elapsed),
        Err(_) => CheckOutcome::failure(Status::Down, "connection timed out", elapsed),
    }
}

/// One-packet reachability probe via the system `ping` binary with a fixed
/// short wait. A nonzero exit is `down`; a failure to launch the probe at
/// all is checker-internal.
pub(crate) async fn check_ping(target: &Target) -> CheckOutcome {
    let start = Instant::now();

    let output = tokio::process::Command::new("ping")
        .args(["-c", "1", "-W", "5"])
        .arg(&target.url)
        .output()
        .await;
    let elapsed = start.elapsed();

    match output {
        Ok(out) if out.status.success() => {
            let mut outcome = CheckOutcome::new(Status::Up);
            outcome.response_time = elapsed;
            outcome
        }
        Ok(_) => CheckOutcome::failure(Status::Down, "ping failed", elapsed),
        Err(e) => {
            CheckOutcome::failure(Status::Error, format!("failed to run ping: {e}"), elapsed)
        }
    }
}

/// Resolve the host and build a textual record of A/AAAA plus best-effort
/// MX/NS/TXT lookups, hashed for change detection (an NS change shows up as
/// `changed`). Resolution failure is `down` with a fixed hash so repeated
/// failures don't look like content changes.
pub(crate) async fn check_dns(store: &Store, target: &Target) -> CheckOutcome {
    let start = Instant::now();
    let host = dns_host(&target.url);

    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(r) => r,
        Err(e) => return CheckOutcome::failure(Status::Error, e.to_string(), start.elapsed()),
    };

    let lookup = resolver.lookup_ip(host.as_str()).await;
    let elapsed = start.elapsed();

    let addrs = match lookup {
        Ok(lookup) => lookup.iter().map(|ip| ip.to_string()).collect::<Vec<_>>(),
        Err(e) => {
            let mut out = CheckOutcome::failure(Status::Down, e.to_string(), elapsed);
            out.content = format!("Domain: {host}\nStatus: not resolving\nError: {e}");
            out.content_hash = hash_content("unresolved");
            return out;
        }
    };

    let mut content = String::new();
    let _ = writeln!(content, "Domain: {host}");
    let _ = writeln!(content, "Resolved: {}", addrs.join(", "));

    if let Ok(mx) = resolver.mx_lookup(host.as_str()).await {
        let hosts: Vec<String> = mx
            .iter()
            .map(|m| format!("{} (pri {})", m.exchange(), m.preference()))
            .collect();
        if !hosts.is_empty() {
            let _ = writeln!(content, "MX: {}", hosts.join(", "));
        }
    }
    if let Ok(ns) = resolver.ns_lookup(host.as_str()).await {
        let hosts: Vec<String> = ns.iter().map(|n| n.0.to_string()).collect();
        if !hosts.is_empty() {
            let _ = writeln!(content, "NS: {}", hosts.join(", "));
        }
    }
    if let Ok(txt) = resolver.txt_lookup(host.as_str()).await {
        let records: Vec<String> = txt.iter().map(|t| t.to_string()).collect();
        if !records.is_empty() {
            let _ = writeln!(content, "TXT: {}", records.join("; "));
        }
    }

    let mut outcome = CheckOutcome::new(Status::Up);
    outcome.response_time = elapsed;
    outcome.content_hash = hash_content(&content);
    outcome.content = content;

    let baseline = store.latest_snapshot_hash(target.id).ok().flatten();
    outcome.status = classify_content(&outcome.content_hash, baseline.as_deref());
    outcome
}

/// Strip scheme/path when a full URL was given instead of a bare hostname.
pub(crate) fn dns_host(raw: &str) -> String {
    if raw.contains("://") {
        if let Ok(url) = Url::parse(raw) {
            if let Some(host) = url.host_str() {
                return host.to_string();
            }
        }
    }
    raw.to_string()
}
