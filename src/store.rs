//! Persistent state: targets, check results, snapshots, notify channels.
//!
//! A `Store` is an explicitly constructed handle over a single SQLite
//! database. Engine components receive it by reference; there is no
//! process-wide global.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::checker::{CheckOutcome, Status};
use crate::error::{Result, VigilError};

/// Protocol used to probe a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Http,
    Tcp,
    Ping,
    Dns,
    Visual,
    Whois,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Http => "http",
            TargetKind::Tcp => "tcp",
            TargetKind::Ping => "ping",
            TargetKind::Dns => "dns",
            TargetKind::Visual => "visual",
            TargetKind::Whois => "whois",
        }
    }

    /// Parse a type string. Unknown types fall back to HTTP.
    pub fn parse(s: &str) -> TargetKind {
        match s {
            "http" | "https" => TargetKind::Http,
            "tcp" => TargetKind::Tcp,
            "ping" => TargetKind::Ping,
            "dns" => TargetKind::Dns,
            "visual" => TargetKind::Visual,
            "whois" => TargetKind::Whois,
            _ => TargetKind::Http,
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    /// Seconds between scheduled checks.
    #[serde(rename = "interval_seconds")]
    pub interval: u64,
    /// CSS selector for content extraction.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub selector: String,
    /// JSON object of custom request headers.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub headers: String,
    /// Keyword that must appear in the response.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expect: String,
    /// Per-target timeout in seconds.
    pub timeout: u64,
    /// Probe attempts before the last result is reported as-is.
    pub retries: u32,
    /// Visual diff threshold percentage.
    pub threshold: f64,
    /// Opaque conditional-notify expression, parsed elsewhere.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trigger_rule: String,
    /// jq expression applied to JSON responses.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jq_filter: String,
    /// HTTP method (GET when empty).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Request body for POST/PUT/PATCH.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Capture the first response instead of following redirects.
    pub no_follow: bool,
    /// Accepted status codes, e.g. "200-299,301".
    #[serde(skip_serializing_if = "String::is_empty")]
    pub accept_status: String,
    /// Skip TLS certificate validation.
    pub insecure: bool,
    pub created_at: DateTime<Utc>,
    pub paused: bool,
}

/// Fields for a new target; unset options take the stored defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTarget {
    pub name: String,
    pub url: String,
    pub kind: Option<TargetKind>,
    pub interval: Option<u64>,
    pub selector: String,
    pub headers: String,
    pub expect: String,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub threshold: Option<f64>,
    pub trigger_rule: String,
    pub jq_filter: String,
    pub method: String,
    pub body: String,
    pub no_follow: bool,
    pub accept_status: String,
    pub insecure: bool,
}

/// Immutable record of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub id: i64,
    pub target_id: i64,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_hash: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub checked_at: DateTime<Utc>,
}

/// Deduplicated, content-addressed record of observed content.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub target_id: i64,
    pub content: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// A named notification channel with opaque JSON configuration.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyConfig {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: String,
    pub enabled: bool,
}

/// Aggregate uptime numbers over a time window.
#[derive(Debug, Clone, Copy, Default)]
pub struct UptimeStats {
    pub total: i64,
    pub up: i64,
    pub avg_response_ms: f64,
}

/// Resolve the data directory: `$VIGIL_DATA_DIR`, XDG data dir, or `~/.vigil`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIGIL_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(base) = dirs::data_dir() {
        return base.join("vigil");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".vigil")
}

/// Database path inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vigil.db")
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'http',
    interval_seconds INTEGER NOT NULL DEFAULT 300,
    selector TEXT DEFAULT '',
    headers TEXT DEFAULT '',
    expect TEXT DEFAULT '',
    timeout INTEGER DEFAULT 30,
    retries INTEGER DEFAULT 1,
    threshold REAL DEFAULT 5.0,
    trigger_rule TEXT DEFAULT '',
    jq_filter TEXT DEFAULT '',
    method TEXT DEFAULT '',
    body TEXT DEFAULT '',
    no_follow INTEGER DEFAULT 0,
    accept_status TEXT DEFAULT '',
    insecure INTEGER DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    paused INTEGER DEFAULT 0,
    UNIQUE(url, type, selector)
);

CREATE TABLE IF NOT EXISTS check_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    status_code INTEGER DEFAULT 0,
    response_time_ms INTEGER DEFAULT 0,
    content_hash TEXT DEFAULT '',
    error TEXT DEFAULT '',
    checked_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (target_id) REFERENCES targets(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    hash TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (target_id) REFERENCES targets(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS notify_configs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    config TEXT NOT NULL,
    enabled INTEGER DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_results_target ON check_results(target_id, checked_at);
CREATE INDEX IF NOT EXISTS idx_snapshots_target ON snapshots(target_id, created_at);
";

const TARGET_COLUMNS: &str = "id, name, url, type, interval_seconds, selector, headers, expect, \
     timeout, retries, threshold, trigger_rule, jq_filter, method, body, no_follow, \
     accept_status, insecure, created_at, paused";

/// Handle over the SQLite database. Created at process start, dropped at
/// shutdown.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn add_target(&self, t: NewTarget) -> Result<Target> {
        let name = if t.name.is_empty() { t.url.clone() } else { t.name };
        let kind = t.kind.unwrap_or(TargetKind::Http);
        let interval = t.interval.unwrap_or(300);
        let timeout = match t.timeout {
            Some(v) if v > 0 => v,
            _ => 30,
        };
        let retries = match t.retries {
            Some(v) if v > 0 => v,
            _ => 1,
        };
        let threshold = match t.threshold {
            Some(v) if v > 0.0 => v,
            _ => 5.0,
        };

        self.conn
            .execute(
                "INSERT INTO targets (name, url, type, interval_seconds, selector, headers, expect, \
                 timeout, retries, threshold, trigger_rule, jq_filter, method, body, no_follow, \
                 accept_status, insecure) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    name,
                    t.url,
                    kind.as_str(),
                    interval as i64,
                    t.selector,
                    t.headers,
                    t.expect,
                    timeout as i64,
                    retries as i64,
                    threshold,
                    t.trigger_rule,
                    t.jq_filter,
                    t.method,
                    t.body,
                    t.no_follow as i64,
                    t.accept_status,
                    t.insecure as i64,
                ],
            )
            .map_err(|e| VigilError::Other(format!("failed to add target (may already exist): {e}")))?;

        let id = self.conn.last_insert_rowid();
        self.get_target(&id.to_string())
    }

    /// Look up a target by name, URL, or numeric id.
    pub fn get_target(&self, identifier: &str) -> Result<Target> {
        let id: i64 = identifier.parse().unwrap_or(-1);
        self.conn
            .query_row(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM targets WHERE name = ?1 OR url = ?1 OR id = ?2"
                ),
                params![identifier, id],
                row_to_target,
            )
            .optional()?
            .ok_or_else(|| VigilError::TargetNotFound(identifier.to_string()))
    }

    pub fn list_targets(&self) -> Result<Vec<Target>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_target)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_target(&self, t: &Target) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE targets SET name=?1, url=?2, type=?3, interval_seconds=?4, selector=?5, \
             headers=?6, expect=?7, timeout=?8, retries=?9, threshold=?10, trigger_rule=?11, \
             jq_filter=?12, method=?13, body=?14, no_follow=?15, accept_status=?16, insecure=?17 \
             WHERE id=?18",
            params![
                t.name,
                t.url,
                t.kind.as_str(),
                t.interval as i64,
                t.selector,
                t.headers,
                t.expect,
                t.timeout as i64,
                t.retries as i64,
                t.threshold,
                t.trigger_rule,
                t.jq_filter,
                t.method,
                t.body,
                t.no_follow as i64,
                t.accept_status,
                t.insecure as i64,
                t.id,
            ],
        )?;
        if n == 0 {
            return Err(VigilError::TargetNotFound(t.id.to_string()));
        }
        Ok(())
    }

    pub fn remove_target(&self, identifier: &str) -> Result<()> {
        let id: i64 = identifier.parse().unwrap_or(-1);
        let n = self.conn.execute(
            "DELETE FROM targets WHERE name = ?1 OR url = ?1 OR id = ?2",
            params![identifier, id],
        )?;
        if n == 0 {
            return Err(VigilError::TargetNotFound(identifier.to_string()));
        }
        Ok(())
    }

    pub fn set_paused(&self, identifier: &str, paused: bool) -> Result<()> {
        let id: i64 = identifier.parse().unwrap_or(-1);
        let n = self.conn.execute(
            "UPDATE targets SET paused = ?1 WHERE name = ?2 OR url = ?2 OR id = ?3",
            params![paused as i64, identifier, id],
        )?;
        if n == 0 {
            return Err(VigilError::TargetNotFound(identifier.to_string()));
        }
        Ok(())
    }

    pub fn save_check_result(
        &self,
        target_id: i64,
        outcome_status: Status,
        status_code: Option<u16>,
        response_time_ms: i64,
        content_hash: &str,
        error: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO check_results (target_id, status, status_code, response_time_ms, \
             content_hash, error) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                target_id,
                outcome_status.as_str(),
                status_code.map(i64::from).unwrap_or(0),
                response_time_ms,
                content_hash,
                error,
            ],
        )?;
        Ok(())
    }

    /// Most-recent-first check history for a target.
    pub fn check_history(&self, target_id: i64, limit: usize) -> Result<Vec<CheckResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, status, status_code, response_time_ms, content_hash, error, \
             checked_at FROM check_results WHERE target_id = ?1 \
             ORDER BY checked_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![target_id, limit as i64], |row| {
            Ok(CheckResult {
                id: row.get(0)?,
                target_id: row.get(1)?,
                status: Status::parse(&row.get::<_, String>(2)?),
                status_code: match row.get::<_, i64>(3)? {
                    0 => None,
                    v => Some(v as u16),
                },
                response_time_ms: row.get(4)?,
                content_hash: row.get(5)?,
                error: row.get(6)?,
                checked_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn save_snapshot(&self, target_id: i64, content: &str, hash: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO snapshots (target_id, content, hash) VALUES (?1, ?2, ?3)",
            params![target_id, content, hash],
        )?;
        Ok(())
    }

    /// Most-recent-first snapshots for a target.
    pub fn latest_snapshots(&self, target_id: i64, limit: usize) -> Result<Vec<Snapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, content, hash, created_at FROM snapshots \
             WHERE target_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![target_id, limit as i64], |row| {
            Ok(Snapshot {
                id: row.get(0)?,
                target_id: row.get(1)?,
                content: row.get(2)?,
                hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Hash of the most recent snapshot, the baseline for change detection.
    pub fn latest_snapshot_hash(&self, target_id: i64) -> Result<Option<String>> {
        Ok(self
            .latest_snapshots(target_id, 1)?
            .into_iter()
            .next()
            .map(|s| s.hash))
    }

    /// Append the check result and, when the observed content differs from
    /// the stored baseline, a new snapshot. Returns whether a snapshot was
    /// written.
    pub fn persist_outcome(&self, target: &Target, outcome: &CheckOutcome) -> Result<bool> {
        self.save_check_result(
            target.id,
            outcome.status,
            outcome.status_code,
            outcome.response_time.as_millis() as i64,
            &outcome.content_hash,
            outcome.error.as_deref().unwrap_or(""),
        )?;

        if outcome.content.is_empty() || outcome.content_hash.is_empty() {
            return Ok(false);
        }
        let baseline = self.latest_snapshot_hash(target.id)?;
        if baseline.as_deref() == Some(outcome.content_hash.as_str()) {
            return Ok(false);
        }
        self.save_snapshot(target.id, &outcome.content, &outcome.content_hash)?;
        Ok(true)
    }

    pub fn uptime_stats(&self, target_id: i64, since: DateTime<Utc>) -> Result<UptimeStats> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), \
             COALESCE(SUM(CASE WHEN status IN ('up','unchanged','changed') THEN 1 ELSE 0 END), 0), \
             COALESCE(AVG(response_time_ms), 0) \
             FROM check_results WHERE target_id = ?1 AND checked_at >= ?2",
            params![target_id, since],
            |row| {
                Ok(UptimeStats {
                    total: row.get(0)?,
                    up: row.get(1)?,
                    avg_response_ms: row.get(2)?,
                })
            },
        )?)
    }

    pub fn save_notify_config(&self, name: &str, kind: &str, config: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO notify_configs (name, type, config) VALUES (?1, ?2, ?3)",
            params![name, kind, config],
        )?;
        Ok(())
    }

    pub fn list_notify_configs(&self) -> Result<Vec<NotifyConfig>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, type, config, enabled FROM notify_configs ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(NotifyConfig {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                config: row.get(3)?,
                enabled: row.get::<_, i64>(4)? == 1,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn remove_notify_config(&self, identifier: &str) -> Result<()> {
        let id: i64 = identifier.parse().unwrap_or(-1);
        let n = self.conn.execute(
            "DELETE FROM notify_configs WHERE name = ?1 OR id = ?2",
            params![identifier, id],
        )?;
        if n == 0 {
            return Err(VigilError::Other(format!(
                "notification config not found: {identifier}"
            )));
        }
        Ok(())
    }
}

fn row_to_target(row: &Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        kind: TargetKind::parse(&row.get::<_, String>(3)?),
        interval: row.get::<_, i64>(4)?.max(0) as u64,
        selector: row.get(5)?,
        headers: row.get(6)?,
        expect: row.get(7)?,
        timeout: row.get::<_, i64>(8)?.max(0) as u64,
        retries: row.get::<_, i64>(9)?.max(0) as u32,
        threshold: row.get(10)?,
        trigger_rule: row.get(11)?,
        jq_filter: row.get(12)?,
        method: row.get(13)?,
        body: row.get(14)?,
        no_follow: row.get::<_, i64>(15)? == 1,
        accept_status: row.get(16)?,
        insecure: row.get::<_, i64>(17)? == 1,
        created_at: row.get(18)?,
        paused: row.get::<_, i64>(19)? == 1,
    })
}
