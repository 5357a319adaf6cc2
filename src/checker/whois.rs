//! WHOIS checker: registration data summaries and expiry warnings.

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use super::{classify_content, CheckOutcome, Checker, Status};
use crate::normalize::{hash_content, NormalizeRules};
use crate::store::{Store, Target};

const IANA_WHOIS: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const WHOIS_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const EXPIRY_WARNING_DAYS: i64 = 30;

/// Registration fields pulled out of a raw WHOIS response.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct WhoisInfo {
    pub registrar: Option<String>,
    pub created: Option<String>,
    pub expiry: Option<String>,
    pub status: Vec<String>,
    pub nameservers: Vec<String>,
}

impl WhoisInfo {
    fn is_empty(&self) -> bool {
        self.registrar.is_none()
            && self.created.is_none()
            && self.expiry.is_none()
            && self.status.is_empty()
            && self.nameservers.is_empty()
    }
}

impl Checker {
    pub(crate) async fn check_whois(&self, store: &Store, target: &Target) -> CheckOutcome {
        let start = Instant::now();
        let timeout = match target.timeout {
            0 => WHOIS_DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        };

        let domain = match registrable_domain(&target.url) {
            Ok(d) => d,
            Err(e) => {
                return CheckOutcome::failure(
                    Status::Error,
                    format!("failed to extract domain: {e}"),
                    start.elapsed(),
                );
            }
        };

        let raw = match query(&domain, timeout).await {
            Ok(r) => r,
            Err(e) => {
                return CheckOutcome::failure(
                    Status::Error,
                    format!("whois query failed: {e}"),
                    start.elapsed(),
                );
            }
        };
        let elapsed = start.elapsed();

        let info = parse_whois(&raw);
        if info.is_empty() {
            return CheckOutcome::failure(
                Status::Error,
                "failed to parse whois: no registration data found",
                elapsed,
            );
        }

        let content = format_whois(&domain, &info);

        let mut outcome = CheckOutcome::new(Status::Up);
        outcome.response_time = elapsed;
        outcome.content_hash = hash_content(&strip_volatile(&content));
        outcome.content = content;

        if let Some(days) = days_until_expiry(info.expiry.as_deref()) {
            if days < EXPIRY_WARNING_DAYS {
                outcome.error = Some(format!("domain expires in {days} days"));
            }
        }

        let baseline = store.latest_snapshot_hash(target.id).ok().flatten();
        outcome.status = classify_content(&outcome.content_hash, baseline.as_deref());
        outcome
    }
}

/// Extract the registrable domain from a URL: last two dot-separated labels
/// of the hostname, as a heuristic.
pub(crate) fn registrable_domain(raw: &str) -> Result<String, String> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| e.to_string())?;
    let host = url
        .host_str()
        .ok_or_else(|| "no hostname in URL".to_string())?;

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        Ok(parts[parts.len() - 2..].join("."))
    } else {
        Ok(host.to_string())
    }
}

/// Query the IANA root, following one `refer:` redirect to the registry's
/// own WHOIS server when present.
async fn query(domain: &str, timeout: Duration) -> std::io::Result<String> {
    let root = query_server(IANA_WHOIS, domain, timeout).await?;

    let referral = root.lines().find_map(|line| {
        let rest = line.strip_prefix("refer:")?;
        let server = rest.trim();
        (!server.is_empty()).then(|| server.to_string())
    });

    if let Some(server) = referral {
        if let Ok(resp) = query_server(&server, domain, timeout).await {
            return Ok(resp);
        }
    }
    Ok(root)
}

async fn query_server(server: &str, domain: &str, timeout: Duration) -> std::io::Result<String> {
    let io = async {
        let mut stream = tokio::net::TcpStream::connect((server, WHOIS_PORT)).await?;
        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    };
    tokio::time::timeout(timeout, io)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "whois query timed out"))?
}

/// Line-oriented field extraction over a raw WHOIS response.
pub(crate) fn parse_whois(raw: &str) -> WhoisInfo {
    let mut info = WhoisInfo::default();

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "registrar" => {
                if info.registrar.is_none() {
                    info.registrar = Some(value.to_string());
                }
            }
            "creation date" | "created" | "registered on" => {
                if info.created.is_none() {
                    info.created = Some(value.to_string());
                }
            }
            "registry expiry date" | "expiration date" | "expiry date" | "expires" => {
                if info.expiry.is_none() {
                    info.expiry = Some(value.to_string());
                }
            }
            "domain status" | "status" => {
                // Registries append a policy URL after the status token.
                let status = value.split_whitespace().next().unwrap_or(value);
                if !info.status.iter().any(|s| s == status) {
                    info.status.push(status.to_string());
                }
            }
            "name server" | "nserver" => {
                let ns = value.to_ascii_lowercase();
                if !info.nameservers.contains(&ns) {
                    info.nameservers.push(ns);
                }
            }
            _ => {}
        }
    }

    info
}

/// Format the parsed registration data into a readable summary.
pub(crate) fn format_whois(domain: &str, info: &WhoisInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Domain: {domain}");

    if let Some(registrar) = &info.registrar {
        let _ = writeln!(out, "Registrar: {registrar}");
    }
    if let Some(created) = &info.created {
        let _ = writeln!(out, "Created: {created}");
    }
    if let Some(expiry) = &info.expiry {
        match days_until_expiry(Some(expiry.as_str())) {
            Some(days) => {
                let _ = writeln!(out, "Expires: {expiry} ({days} days)");
            }
            None => {
                let _ = writeln!(out, "Expires: {expiry}");
            }
        }
    }
    if !info.status.is_empty() {
        let _ = writeln!(out, "Status: {}", info.status.join(", "));
    }
    if !info.nameservers.is_empty() {
        let _ = writeln!(out, "Nameservers: {}", info.nameservers.join(", "));
    }

    out
}

/// Days from now until the expiry date; WHOIS dates lead with YYYY-MM-DD.
fn days_until_expiry(expiry: Option<&str>) -> Option<i64> {
    let raw = expiry?;
    let date_part = raw.get(..10)?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date - Utc::now().date_naive()).num_days())
}

/// Frequently changing fields stripped before hashing, so registry update
/// timestamps and the day countdown don't register as content changes.
static WHOIS_VOLATILE: Lazy<NormalizeRules> = Lazy::new(|| {
    NormalizeRules::new(
        [
            r"Updated:\s*[^\n]+",
            r"Last updated on:\s*[^\n]+",
            r"Last Modified:\s*[^\n]+",
            r">>> Last update of.*",
            r"Record last updated.*",
            r"Database last updated.*",
            r"Query time:\s*[^\n]+",
            r"No match for.*",
            r"\(\d+ days\)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid builtin pattern"))
        .collect(),
    )
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub(crate) fn strip_volatile(content: &str) -> String {
    let stripped = WHOIS_VOLATILE.apply(content);
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}
