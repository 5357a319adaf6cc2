use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;

use vigil::checker::Checker;
use vigil::notify::{self, Channel, Event};
use vigil::scheduler::Scheduler;
use vigil::store::{self, NewTarget, Store, Target, TargetKind};
use vigil::{diff, Status};

#[tokio::main]
async fn main() -> Result<()> {
    vigil::init_logging();

    let matches = cli().get_matches();

    let data_dir = store::data_dir();
    let store = Store::open(&store::db_path(&data_dir))?;
    let checker = Checker::new(&data_dir);

    match matches.subcommand() {
        Some(("add", sub)) => cmd_add(&store, sub),
        Some(("list", _)) => cmd_list(&store),
        Some(("remove", sub)) => {
            store.remove_target(ident(sub))?;
            println!("Removed {}", ident(sub));
            Ok(())
        }
        Some(("pause", sub)) => {
            store.set_paused(ident(sub), true)?;
            println!("Paused {}", ident(sub));
            Ok(())
        }
        Some(("resume", sub)) => {
            store.set_paused(ident(sub), false)?;
            println!("Resumed {}", ident(sub));
            Ok(())
        }
        Some(("check", sub)) => cmd_check(&store, &checker, sub).await,
        Some(("daemon", _)) => cmd_daemon(&store, &checker).await,
        Some(("history", sub)) => cmd_history(&store, sub),
        Some(("diff", sub)) => cmd_diff(&store, sub),
        Some(("notify", sub)) => cmd_notify(&store, sub).await,
        _ => unreachable!("subcommand required"),
    }
}

fn cli() -> Command {
    Command::new("vigil")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-protocol uptime and content-change monitor")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("add")
                .about("Add a target to monitor")
                .arg(Arg::new("url").required(true).help("URL, host:port, or hostname"))
                .arg(Arg::new("name").short('n').long("name").help("Display name (defaults to the URL)"))
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .default_value("http")
                        .help("Check type: http, tcp, ping, dns, visual, whois"),
                )
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .default_value("300")
                        .help("Seconds between scheduled checks"),
                )
                .arg(Arg::new("selector").short('s').long("selector").help("CSS selector for content extraction"))
                .arg(Arg::new("headers").long("headers").help("Custom request headers as a JSON object"))
                .arg(Arg::new("expect").short('e').long("expect").help("Keyword that must appear in the response"))
                .arg(Arg::new("timeout").long("timeout").help("Per-check timeout in seconds"))
                .arg(Arg::new("retries").short('r').long("retries").help("Attempts before reporting a failure"))
                .arg(Arg::new("threshold").long("threshold").help("Visual diff threshold percentage"))
                .arg(Arg::new("trigger-if").long("trigger-if").help("Conditional trigger rule, stored as-is"))
                .arg(Arg::new("jq").long("jq").help("jq expression applied to JSON responses"))
                .arg(Arg::new("method").short('m').long("method").help("HTTP method (default GET)"))
                .arg(Arg::new("body").long("body").help("Request body for POST/PUT/PATCH"))
                .arg(
                    Arg::new("no-follow")
                        .long("no-follow")
                        .action(ArgAction::SetTrue)
                        .help("Don't follow redirects"),
                )
                .arg(Arg::new("accept-status").long("accept-status").help("Accepted status codes, e.g. \"200-299,301\""))
                .arg(
                    Arg::new("insecure")
                        .short('k')
                        .long("insecure")
                        .action(ArgAction::SetTrue)
                        .help("Skip TLS certificate validation"),
                ),
        )
        .subcommand(Command::new("list").about("List all targets"))
        .subcommand(
            Command::new("remove")
                .about("Remove a target")
                .arg(Arg::new("target").required(true).help("Target name, URL, or id")),
        )
        .subcommand(
            Command::new("pause")
                .about("Pause checks for a target")
                .arg(Arg::new("target").required(true)),
        )
        .subcommand(
            Command::new("resume")
                .about("Resume checks for a target")
                .arg(Arg::new("target").required(true)),
        )
        .subcommand(
            Command::new("check")
                .about("Run checks now (all targets or a specific one)")
                .arg(Arg::new("target").help("Target name, URL, or id")),
        )
        .subcommand(Command::new("daemon").about("Run scheduled checks until interrupted"))
        .subcommand(
            Command::new("history")
                .about("Show recent check results for a target")
                .arg(Arg::new("target").required(true))
                .arg(
                    Arg::new("limit")
                        .short('l')
                        .long("limit")
                        .default_value("20")
                        .help("Number of results to show"),
                ),
        )
        .subcommand(
            Command::new("diff")
                .about("Diff the two latest snapshots of a target")
                .arg(Arg::new("target").required(true))
                .arg(
                    Arg::new("plain")
                        .long("plain")
                        .action(ArgAction::SetTrue)
                        .help("No color codes (for piping)"),
                ),
        )
        .subcommand(
            Command::new("notify")
                .about("Manage notification channels")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("add")
                        .about("Add a notification channel")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .required(true)
                                .help("webhook, command, slack, telegram, or discord"),
                        )
                        .arg(Arg::new("config").required(true).help("Channel config as JSON")),
                )
                .subcommand(Command::new("list").about("List notification channels"))
                .subcommand(
                    Command::new("remove")
                        .about("Remove a notification channel")
                        .arg(Arg::new("channel").required(true).help("Channel name or id")),
                )
                .subcommand(Command::new("test").about("Send a test event to all enabled channels")),
        )
}

fn ident(sub: &ArgMatches) -> &str {
    sub.get_one::<String>("target").map(String::as_str).unwrap()
}

fn cmd_add(store: &Store, sub: &ArgMatches) -> Result<()> {
    let get = |key: &str| sub.get_one::<String>(key).cloned().unwrap_or_default();
    let parse_num = |key: &str| -> Option<u64> {
        sub.get_one::<String>(key).and_then(|v| v.parse().ok())
    };

    let target = store.add_target(NewTarget {
        name: get("name"),
        url: get("url"),
        kind: Some(TargetKind::parse(&get("type"))),
        interval: parse_num("interval"),
        selector: get("selector"),
        headers: get("headers"),
        expect: get("expect"),
        timeout: parse_num("timeout"),
        retries: parse_num("retries").map(|v| v as u32),
        threshold: sub
            .get_one::<String>("threshold")
            .and_then(|v| v.parse().ok()),
        trigger_rule: get("trigger-if"),
        jq_filter: get("jq"),
        method: get("method"),
        body: get("body"),
        no_follow: sub.get_flag("no-follow"),
        accept_status: get("accept-status"),
        insecure: sub.get_flag("insecure"),
    })?;

    print!(
        "Added {} ({}) — {} every {}s",
        target.name.bold(),
        target.url,
        target.kind,
        target.interval
    );
    if !target.selector.is_empty() {
        print!(" | selector: {}", target.selector);
    }
    if !target.expect.is_empty() {
        print!(" | expect: {:?}", target.expect);
    }
    if !target.trigger_rule.is_empty() {
        print!(" | trigger: {}", target.trigger_rule);
    }
    println!();
    Ok(())
}

fn cmd_list(store: &Store) -> Result<()> {
    let targets = store.list_targets()?;
    if targets.is_empty() {
        println!("No targets configured. Use 'vigil add <url>' to start.");
        return Ok(());
    }
    for t in targets {
        let last = store.check_history(t.id, 1)?;
        let status = last
            .first()
            .map(|r| status_label(r.status))
            .unwrap_or_else(|| "—".normal().to_string());
        let paused = if t.paused { " [paused]".dimmed().to_string() } else { String::new() };
        println!(
            "{:>4}  {}  {} ({}, every {}s){}",
            t.id,
            status,
            t.name.bold(),
            t.kind,
            t.interval,
            paused
        );
    }
    Ok(())
}

async fn cmd_check(store: &Store, checker: &Checker, sub: &ArgMatches) -> Result<()> {
    let targets: Vec<Target> = match sub.get_one::<String>("target") {
        Some(ident) => vec![store.get_target(ident)?],
        None => store.list_targets()?,
    };
    if targets.is_empty() {
        println!("No targets to check. Use 'vigil add <url>' first.");
        return Ok(());
    }

    for target in targets.iter().filter(|t| !t.paused) {
        let outcome = checker.check(store, target).await;
        store.persist_outcome(target, &outcome)?;

        print!(
            "{} {} ({}) — {} [{}ms]",
            status_icon(outcome.status),
            target.name,
            target.url,
            outcome.status,
            outcome.response_time.as_millis()
        );
        if let Some(err) = &outcome.error {
            print!(" ({err})");
        }
        if let Some(expiry) = outcome.tls_expiry {
            let days = (expiry - chrono::Utc::now()).num_days();
            print!(" [TLS: {days}d]");
        }
        println!();

        if outcome.status.is_alertable() {
            let event = Event::from_check(target, &outcome);
            notify::dispatch(store, &event).await;
        }
    }
    Ok(())
}

async fn cmd_daemon(store: &Store, checker: &Checker) -> Result<()> {
    println!("vigil daemon started — Ctrl+C to stop");

    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });

    Scheduler::default().run(store, checker, rx).await;
    println!("vigil daemon stopped");
    Ok(())
}

fn cmd_history(store: &Store, sub: &ArgMatches) -> Result<()> {
    let target = store.get_target(ident(sub))?;
    let limit = sub
        .get_one::<String>("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    let results = store.check_history(target.id, limit)?;
    if results.is_empty() {
        println!("No checks recorded for {} yet.", target.name);
        return Ok(());
    }
    for r in results {
        print!(
            "{}  {} {}  [{}ms]",
            r.checked_at.format("%Y-%m-%d %H:%M:%S"),
            status_icon(r.status),
            r.status,
            r.response_time_ms
        );
        if let Some(code) = r.status_code {
            print!(" HTTP {code}");
        }
        if !r.error.is_empty() {
            print!(" ({})", r.error);
        }
        println!();
    }

    let since = chrono::Utc::now() - chrono::Duration::hours(24);
    let stats = store.uptime_stats(target.id, since)?;
    if stats.total > 0 {
        let pct = stats.up as f64 / stats.total as f64 * 100.0;
        println!(
            "\n24h: {:.1}% up ({} checks, avg {:.0}ms)",
            pct, stats.total, stats.avg_response_ms
        );
    }
    Ok(())
}

fn cmd_diff(store: &Store, sub: &ArgMatches) -> Result<()> {
    let target = store.get_target(ident(sub))?;
    let snaps = store.latest_snapshots(target.id, 2)?;
    if snaps.len() < 2 {
        println!(
            "Need at least two snapshots to diff ({} recorded).",
            snaps.len()
        );
        return Ok(());
    }

    let newer = &snaps[0];
    let older = &snaps[1];
    let result = diff::diff(&older.content, &newer.content);
    if sub.get_flag("plain") {
        print!("{}", diff::format_plain(&result));
    } else {
        let old_name = older.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let new_name = newer.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        print!("{}", diff::format_unified(&result, &old_name, &new_name));
    }
    if result.has_changes {
        println!("{}", result.summary.dimmed());
    }
    Ok(())
}

async fn cmd_notify(store: &Store, sub: &ArgMatches) -> Result<()> {
    match sub.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let kind = sub.get_one::<String>("type").unwrap();
            let config = sub.get_one::<String>("config").unwrap();
            // Validate up front so a broken channel never sits in the store.
            Channel::parse(kind, config)?;
            store.save_notify_config(name, kind, config)?;
            println!("Added {kind} notification '{name}'");
            Ok(())
        }
        Some(("list", _)) => {
            let configs = store.list_notify_configs()?;
            if configs.is_empty() {
                println!("No notification channels configured.");
                return Ok(());
            }
            for c in configs {
                let state = if c.enabled { "enabled".green() } else { "disabled".dimmed() };
                println!("{:>4}  {}  {} ({})", c.id, state, c.name.bold(), c.kind);
            }
            Ok(())
        }
        Some(("remove", sub)) => {
            let ident = sub.get_one::<String>("channel").unwrap();
            store.remove_notify_config(ident)?;
            println!("Removed notification '{ident}'");
            Ok(())
        }
        Some(("test", _)) => {
            let event = Event::new(
                "test",
                "https://example.com",
                Status::Down,
                Some("test notification"),
            );
            let delivered = notify::dispatch(store, &event).await;
            println!("Delivered test event to {delivered} channel(s)");
            Ok(())
        }
        _ => unreachable!("subcommand required"),
    }
}

fn status_icon(status: Status) -> String {
    match status {
        Status::Up | Status::Unchanged => "✓".green().to_string(),
        Status::Changed => "△".yellow().to_string(),
        Status::Down | Status::Error => "✗".red().to_string(),
    }
}

fn status_label(status: Status) -> String {
    match status {
        Status::Up | Status::Unchanged => status.as_str().green().to_string(),
        Status::Changed => status.as_str().yellow().to_string(),
        Status::Down | Status::Error => status.as_str().red().to_string(),
    }
}
