//! gridmedic-report — CSV and HTML summaries of a [`ClusterVerdict`].
//!
//! Pure consumers of the verdict: fixed column order, one row per node,
//! the same rendering rules the operations dashboards expect — nodes
//! whose diagnosis never ran render as `SSH Fail`, fully healthy nodes
//! as `All_Success`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use gridmedic_diag::{CheckKind, CheckResult, CheckStatus};
use gridmedic_orchestrator::{ClusterVerdict, NodeReport};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Column headers, in the order every renderer uses.
pub const HEADERS: [&str; 8] = [
    "Node",
    "Hardware",
    "NCCL BW (MB/s)",
    "NCCL Multi BW (MB/s)",
    "Reboot Count",
    "Lifecycle",
    "Action",
    "Overall",
];

/// Flatten one node report into the fixed column set.
fn row(report: &NodeReport) -> Vec<String> {
    let hardware = check(report, CheckKind::Hardware);
    let single = check(report, CheckKind::NcclSingle);
    let multi = check(report, CheckKind::NcclMulti);

    vec![
        report.result.node.clone(),
        hardware.map(status_cell).unwrap_or_else(|| "N/A".to_string()),
        single.map(metric_cell).unwrap_or_else(|| "N/A".to_string()),
        multi.map(metric_cell).unwrap_or_else(|| "N/A".to_string()),
        report.history.attempt_count.to_string(),
        format!("{:?}", report.history.lifecycle),
        format!("{:?}", report.action),
        overall_cell(report),
    ]
}

fn check(report: &NodeReport, kind: CheckKind) -> Option<&CheckResult> {
    report.result.checks.iter().find(|c| c.kind == kind)
}

fn status_cell(check: &CheckResult) -> String {
    match check.status {
        CheckStatus::Pass => "Passed".to_string(),
        CheckStatus::Fail(_) => "Failed".to_string(),
        CheckStatus::Unmeasurable => "Unmeasurable".to_string(),
        CheckStatus::Skipped => "Skip".to_string(),
    }
}

/// Bandwidth checks render their figure when they measured one.
fn metric_cell(check: &CheckResult) -> String {
    match (check.status, check.metric) {
        (CheckStatus::Skipped, _) => "Skip".to_string(),
        (_, Some(bw)) => format!("{bw:.2}"),
        (CheckStatus::Pass, None) => "Passed".to_string(),
        (CheckStatus::Unmeasurable, None) | (CheckStatus::Fail(_), None) => "N/A".to_string(),
    }
}

fn overall_cell(report: &NodeReport) -> String {
    if report.result.is_passing() {
        "All_Success".to_string()
    } else if report.result.is_unreachable() {
        "SSH Fail".to_string()
    } else {
        "Fail".to_string()
    }
}

/// Render the verdict as CSV, header row first.
pub fn render_csv(verdict: &ClusterVerdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", HEADERS.join(","));
    for report in &verdict.nodes {
        let _ = writeln!(out, "{}", row(report).join(","));
    }
    out
}

/// Render the verdict as a standalone HTML page.
pub fn render_html(title: &str, verdict: &ClusterVerdict) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  <title>{title}</title>\n  <style>\n    table {{ border-collapse: collapse; width: 100%; }}\n    th, td {{ border: 1px solid #ccc; padding: 6px; text-align: center; }}\n    tr.ssh-fail td {{ background-color: #f2f2f2; color: #888; }}\n    td.all-success {{ color: green; font-weight: bold; }}\n    td.fail {{ color: red; font-weight: bold; }}\n  </style>\n</head>\n<body>\n  <h1>{title}</h1>\n  <table>\n    <tr>"
    );
    for header in HEADERS {
        let _ = write!(out, "<th>{header}</th>");
    }
    out.push_str("</tr>\n");

    for report in &verdict.nodes {
        let cells = row(report);
        let overall = cells.last().map(String::as_str).unwrap_or("");
        let tr_class = if overall == "SSH Fail" {
            " class=\"ssh-fail\""
        } else {
            ""
        };
        let _ = write!(out, "    <tr{tr_class}>");
        for (i, cell) in cells.iter().enumerate() {
            let td_class = if i == cells.len() - 1 {
                match cell.as_str() {
                    "All_Success" => " class=\"all-success\"",
                    "Fail" => " class=\"fail\"",
                    _ => "",
                }
            } else {
                ""
            };
            let _ = write!(out, "<td{td_class}>{cell}</td>");
        }
        out.push_str("</tr>\n");
    }

    out.push_str("  </table>\n</body>\n</html>");
    out
}

/// Write both summary files into `dir`, creating it if needed.
///
/// Returns the CSV and HTML paths.
pub fn write_summary(verdict: &ClusterVerdict, dir: &Path) -> ReportResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;

    let csv_path = dir.join("cluster_health_summary.csv");
    fs::write(&csv_path, render_csv(verdict))?;
    info!(path = %csv_path.display(), "csv summary written");

    let html_path = dir.join("cluster_health_summary.html");
    fs::write(&html_path, render_html("Cluster Health Summary", verdict))?;
    info!(path = %html_path.display(), "html summary written");

    Ok((csv_path, html_path))
}
