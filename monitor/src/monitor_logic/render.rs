//! Terminal rendering of engine notifications.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use cosmic_core::{ConnectionState, ConnectionStats, DataSnapshot, GuardianType};

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn badge(state: ConnectionState) -> ColoredString {
    let label = state.as_str().to_uppercase();
    let label = label.as_str();
    match state {
        ConnectionState::Connected => label.green().bold(),
        ConnectionState::Connecting | ConnectionState::Reconnecting => label.yellow().bold(),
        ConnectionState::Disconnected => label.dimmed(),
        ConnectionState::Error => label.red().bold(),
    }
}

fn score(value: f64) -> ColoredString {
    let text = format!("{:>5.1}%", value * 100.0);
    let text = text.as_str();
    if value >= 0.8 {
        text.green()
    } else if value >= 0.5 {
        text.yellow()
    } else {
        text.red()
    }
}

pub fn state_line(state: ConnectionState) -> String {
    format!("[{}] connection {}", timestamp(), badge(state))
}

/// One header line plus one line per guardian, in guardian order.
pub fn snapshot_lines(snapshot: &DataSnapshot) -> Vec<String> {
    let health = &snapshot.system_health;
    let stale = if snapshot.is_stale {
        " STALE".red().bold().to_string()
    } else {
        String::new()
    };

    let mut lines = vec![format!(
        "[{}] revision #{} overall {} | active {}/{} | critical {} | philosophy {}{}",
        timestamp(),
        snapshot.update_count,
        score(health.overall_score),
        health.guardians_active,
        GuardianType::ALL.len(),
        health.critical_issues,
        score(health.philosophy_alignment),
        stale
    )];

    for guardian in GuardianType::ALL {
        let line = match snapshot.report(guardian) {
            Some(report) => format!(
                "    {:<13} {} {:>3} recommendation(s){}",
                guardian.as_str(),
                score(report.score),
                report.recommendations.len(),
                if report.is_active() { "" } else { " (inactive)" }
            ),
            None => format!("    {:<13} {}", guardian.as_str(), "no report".dimmed()),
        };
        lines.push(line);
    }
    lines
}

pub fn stale_line(last_updated: DateTime<Utc>) -> String {
    format!(
        "[{}] {} no update since {}",
        timestamp(),
        "STALE".red().bold(),
        last_updated.with_timezone(&chrono::Local).format("%H:%M:%S")
    )
}

pub fn stats_line(state: ConnectionState, stats: &ConnectionStats) -> String {
    let retry = match stats.next_retry_at {
        Some(at) => {
            let secs = (at - Utc::now()).num_milliseconds().max(0) as f64 / 1000.0;
            format!(" | retry #{} in {:.1}s", stats.reconnect_attempts, secs)
        }
        None => String::new(),
    };
    format!(
        "[{}] {} | events {} | latency {:.0}ms{}",
        timestamp(),
        badge(state),
        stats.total_events_received,
        stats.average_latency,
        retry
    )
}
