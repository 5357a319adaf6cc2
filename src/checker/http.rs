//! HTTP/HTTPS checker: request, content extraction, status resolution.

use chrono::{DateTime, Utc};
use jaq_interpret::{Ctx, FilterT, ParseCtx, RcIter, Val};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use url::Url;

use super::{classify_content, status_accepted, CheckOutcome, Checker, Status};
use crate::store::{Store, Target};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT_VALUE: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

impl Checker {
    pub(crate) async fn check_http(&self, store: &Store, target: &Target) -> CheckOutcome {
        let start = Instant::now();

        let timeout = match target.timeout {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        };

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(target.insecure);
        if target.no_follow {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        let client = match builder.build() {
            Ok(c) => c,
            Err(e) => return CheckOutcome::failure(Status::Error, e.to_string(), start.elapsed()),
        };

        let method = if target.method.is_empty() {
            reqwest::Method::GET
        } else {
            match reqwest::Method::from_bytes(target.method.to_uppercase().as_bytes()) {
                Ok(m) => m,
                Err(e) => {
                    return CheckOutcome::failure(Status::Error, e.to_string(), start.elapsed())
                }
            }
        };

        let mut req = client
            .request(method, &target.url)
            .header(USER_AGENT, USER_AGENT_VALUE);
        if !target.body.is_empty() {
            req = req
                .header(CONTENT_TYPE, "application/json")
                .body(target.body.clone());
        }
        // Custom headers are a JSON object; entries that don't parse are skipped.
        if !target.headers.is_empty() {
            if let Ok(custom) = serde_json::from_str::<HashMap<String, String>>(&target.headers) {
                for (k, v) in custom {
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(k.as_bytes()),
                        HeaderValue::from_str(&v),
                    ) {
                        req = req.header(name, value);
                    }
                }
            }
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return CheckOutcome::failure(Status::Down, e.to_string(), start.elapsed()),
        };
        let elapsed = start.elapsed();

        let code = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                return CheckOutcome::failure(
                    Status::Error,
                    format!("failed to read body: {e}"),
                    elapsed,
                )
            }
        };

        let mut outcome = CheckOutcome::new(Status::Up);
        outcome.status_code = Some(code);
        outcome.response_time = elapsed;

        if !target.insecure {
            outcome.tls_expiry = cert_expiry(&target.url, timeout).await;
        }

        // Content extraction: a structured filter takes priority over a
        // CSS selector; filter problems are checker-internal errors.
        let content = if !target.jq_filter.is_empty() {
            match apply_jq(&body, &target.jq_filter) {
                Ok(filtered) => filtered,
                Err(e) => {
                    outcome.status = Status::Error;
                    outcome.error = Some(e);
                    return outcome;
                }
            }
        } else if !target.selector.is_empty() {
            extract_selection(&body, &target.selector).unwrap_or(body)
        } else {
            body
        };

        outcome.content_hash = self.rules.hash(&content);

        if !target.expect.is_empty() {
            outcome.body_match = Some(content.contains(&target.expect));
        }
        outcome.content = content;

        let baseline = store.latest_snapshot_hash(target.id).ok().flatten();
        let (status, error) = resolve_http_status(
            code,
            &target.accept_status,
            &target.expect,
            outcome.body_match,
            &outcome.content_hash,
            baseline.as_deref(),
        );
        outcome.status = status;
        outcome.error = error;
        outcome
    }
}

/// Pure status resolution for an HTTP response: acceptance spec first, then
/// the expected keyword, then the hash-vs-baseline comparison.
pub(crate) fn resolve_http_status(
    code: u16,
    accept_spec: &str,
    expect: &str,
    body_match: Option<bool>,
    hash: &str,
    baseline: Option<&str>,
) -> (Status, Option<String>) {
    if !status_accepted(code, accept_spec) {
        return (Status::Down, Some(format!("HTTP {code}")));
    }
    if body_match == Some(false) {
        return (
            Status::Down,
            Some(format!("expected keyword {expect:?} not found")),
        );
    }
    (classify_content(hash, baseline), None)
}

/// Run a jq-style filter over a JSON body, joining outputs with newlines.
/// String results are emitted bare; everything else is pretty-printed JSON.
fn apply_jq(body: &str, filter: &str) -> Result<String, String> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| format!("response is not valid JSON: {e}"))?;

    let mut defs = ParseCtx::new(Vec::new());
    defs.insert_natives(jaq_core::core());
    defs.insert_defs(jaq_std::std());

    let (main, errs) = jaq_parse::parse(filter, jaq_parse::main());
    let main = match main {
        Some(main) if errs.is_empty() => main,
        _ => {
            let msg = errs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!("invalid jq filter: {msg}"));
        }
    };
    let compiled = defs.compile(main);
    if !defs.errs.is_empty() {
        return Err("invalid jq filter: undefined reference".to_string());
    }

    let inputs = RcIter::new(core::iter::empty());
    let mut filtered = Vec::new();
    for out in compiled.run((Ctx::new([], &inputs), Val::from(json))) {
        match out {
            Ok(Val::Str(s)) => filtered.push(s.to_string()),
            Ok(v) => {
                let v = serde_json::Value::from(v);
                filtered.push(serde_json::to_string_pretty(&v).unwrap_or_default());
            }
            Err(e) => return Err(format!("jq filter error: {e}")),
        }
    }
    Ok(filtered.join("\n"))
}

/// Select matching nodes and join their trimmed text, skipping embedded
/// style/script subtrees. Returns None when the selector is invalid or
/// matches nothing, so the caller keeps the full body.
fn extract_selection(body: &str, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let doc = Html::parse_document(body);
    let parts: Vec<String> = doc
        .select(&sel)
        .map(|el| element_text(el).trim().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Text of an element excluding style/script descendants, so CSS/JS doesn't
/// pollute extracted content.
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut stack: Vec<_> = el.children().rev().collect();
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(e) => {
                if e.name() != "style" && e.name() != "script" {
                    stack.extend(node.children().rev());
                }
            }
            _ => {}
        }
    }
    out
}

/// Best-effort TLS certificate expiry for an https URL. Failures (plain
/// http, handshake problems, unparsable certs) just yield None.
async fn cert_expiry(raw_url: &str, timeout: Duration) -> Option<DateTime<Utc>> {
    let url = Url::parse(raw_url).ok()?;
    if url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?.to_string();
    let port = url.port().unwrap_or(443);

    let mut roots = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.clone()).ok()?;

    let handshake = async {
        let tcp = tokio::net::TcpStream::connect((host.as_str(), port)).await.ok()?;
        connector.connect(server_name, tcp).await.ok()
    };
    let stream = tokio::time::timeout(timeout, handshake).await.ok()??;

    let (_, session) = stream.get_ref();
    let der = session.peer_certificates()?.first()?;
    let (_, cert) = x509_parser::prelude::parse_x509_certificate(der.as_ref()).ok()?;
    DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
}
