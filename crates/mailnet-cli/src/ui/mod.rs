use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mailnet_graph::{BuildReport, GraphSummary};
use serde::Serialize;
use std::time::Duration;

/// Print success message
pub fn success(msg: &str) {
    eprintln!("{} {}", style("✔").green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✖").red(), msg);
}

/// Print info message (indented)
pub fn info(msg: &str) {
    println!("  {}", msg);
}

/// Print a header/title
pub fn header(msg: &str) {
    println!();
    println!("  {}", style(msg).bold());
    println!();
}

/// Query results go to stdout as pretty JSON
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create a spinner for indeterminate progress
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn build_report(report: &BuildReport) {
    header("Build");
    info(&format!("Aliases resolved:          {}", report.aliases_inserted));
    info(&format!(
        "Threads processed:         {} of {}",
        report.threads_processed, report.threads_seen
    ));
    if report.oversized_threads > 0 {
        info(&format!(
            "Oversized threads:         {}",
            style(report.oversized_threads).yellow()
        ));
    }
    info(&format!("Co-participant edges:      {}", report.co_participant_edges));
    info(&format!(
        "Forwarded headers:         {} messages, {} mentions",
        report.messages_with_forwarded_headers, report.mentions_extracted
    ));
    info(&format!("Forwarded edges:           {}", report.forwarded_edges));
    info(&format!("Direct email edges:        {}", report.direct_edges));
    info(&format!(
        "Profiles:                  {} ({} addresses folded into {})",
        report.profiles_built, report.folded_addresses, report.merged_identities
    ));
}

pub fn summary(summary: &GraphSummary) {
    header("Relationships by type");
    for stats in &summary.by_type {
        info(&format!(
            "{:<16} {:>8} edges  {:>10} total weight",
            stats.relationship_type.as_str(),
            stats.edge_count,
            stats.total_weight
        ));
    }
    println!();
    info(&format!("Relationships: {}", summary.total_relationships));
    info(&format!("Profiles:      {}", summary.total_profiles));
    info(&format!("Aliases:       {}", summary.total_aliases));
    info(&format!("Mentions:      {}", summary.total_mentions));

    if summary.top_connected.is_empty() {
        return;
    }
    header("Most connected");
    for profile in &summary.top_connected {
        info(&format!(
            "{:<32} {:>5} connections  {:>6} messages  {}",
            profile.canonical_name,
            profile.total_connections,
            profile.total_messages,
            style(&profile.role).dim()
        ));
    }
    println!();
}
