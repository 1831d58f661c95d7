use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sm_servers::{FleetOverview, HostOverview};

/// Every JSON answer carries the time it was produced; statuses are
/// snapshots and are never cached.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    generated_at: DateTime<Utc>,
    result: &'a T,
}

pub fn json<T: Serialize>(result: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&Envelope {
        generated_at: Utc::now(),
        result,
    })?)
}

pub fn overview_text(overview: &FleetOverview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", overview.title);
    let _ = writeln!(out, "{}", "=".repeat(overview.title.chars().count()));

    if overview.hosts.is_empty() {
        out.push_str("(no servers configured)\n");
    }
    for host in &overview.hosts {
        host_text(&mut out, host);
    }
    out
}

fn host_text(out: &mut String, host: &HostOverview) {
    let state = match (&host.status, &host.error) {
        (Some(status), _) => status.to_string(),
        (None, Some(error)) => format!("error: {}", error),
        (None, None) => "unknown".to_string(),
    };
    let _ = writeln!(
        out,
        "{:<16} {:<28} {:<16} {}",
        host.unique_identifier, host.title, host.address, state
    );

    for service in &host.services {
        let state = match (&service.status, &service.error) {
            (Some(status), _) => status.to_string(),
            (None, Some(error)) => format!("error: {}", error),
            (None, None) => "unknown".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<14} {:<28} {}",
            service.unique_identifier, service.title, state
        );
    }
}
