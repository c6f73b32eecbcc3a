//! Tabular rendering of a finished matrix

use anyhow::Result;
use linkctl_core::{ClassifiedResult, MatrixReport, ProbeStatus};
use std::io::{self, Write};

const LOG_WIDTH: usize = 60;

/// First line of a probe log, cut to fit the LOG column
fn log_excerpt(detail: &str) -> String {
    let line = detail.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= LOG_WIDTH {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(LOG_WIDTH - 3).collect();
    cut.push_str("...");
    cut
}

fn write_table<'a, W: Write>(out: &mut W, title: &str, rows: impl Iterator<Item = &'a ClassifiedResult>, with_log: bool) -> io::Result<()> {
    let rows: Vec<_> = rows.collect();
    if rows.is_empty() {
        return Ok(());
    }

    writeln!(out, "{} ({}):", title, rows.len())?;
    if with_log {
        writeln!(out, "{:<5} {:<30} {:<30} {:<40} {:<10} {}", "S/N", "SRC_NODE_NAME", "DST_NODE_NAME", "TARGET_IP", "RESULT", "LOG")?;
        writeln!(out, "{}", "-".repeat(120 + LOG_WIDTH))?;
    } else {
        writeln!(out, "{:<5} {:<30} {:<30} {:<40} {:<10}", "S/N", "SRC_NODE_NAME", "DST_NODE_NAME", "TARGET_IP", "RESULT")?;
        writeln!(out, "{}", "-".repeat(119))?;
    }

    for (index, row) in rows.iter().enumerate() {
        write!(
            out,
            "{:<5} {:<30} {:<30} {:<40} {:<10}",
            index + 1,
            row.source_node,
            row.dest_node,
            row.target_address.to_string(),
            row.status.label()
        )?;
        if with_log {
            write!(out, " {}", log_excerpt(&row.detail))?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

pub fn write_report<W: Write>(out: &mut W, report: &MatrixReport) -> io::Result<()> {
    write_table(out, "Succeeded", report.with_status(ProbeStatus::Success), false)?;
    write_table(out, "Exceptions", report.with_status(ProbeStatus::ExecutionError), true)?;
    write_table(out, "Failed", report.with_status(ProbeStatus::ProbeFailed), true)?;

    let summary = report.summary();
    writeln!(
        out,
        "Checked {} pairs: {} succeeded, {} failed, {} exceptions",
        summary.total(),
        summary.succeeded,
        summary.probe_failed,
        summary.execution_errors
    )
}

pub fn print_report(report: &MatrixReport) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, report)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkctl_core::{ProbeOutcome, ProbeStatus};

    fn result(src: &str, dst: &str, ip: &str, status: ProbeStatus, detail: &str) -> ClassifiedResult {
        ClassifiedResult::new(
            src,
            dst,
            ip.parse().unwrap(),
            ProbeOutcome {
                status,
                detail: detail.to_string(),
            },
        )
    }

    fn render(report: &MatrixReport) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, report).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_report_groups_by_status() {
        let report = MatrixReport::new(vec![
            result("node-1", "node-2", "10.0.0.2", ProbeStatus::Success, ""),
            result("node-1", "node-3", "10.0.0.3", ProbeStatus::ProbeFailed, "100% packet loss"),
            result("node-2", "node-3", "10.0.0.3", ProbeStatus::ExecutionError, "container not found\nmore context"),
        ]);
        let text = render(&report);

        assert!(text.contains("Succeeded (1):"));
        assert!(text.contains("Exceptions (1):"));
        assert!(text.contains("Failed (1):"));
        assert!(text.contains("100% packet loss"));
        assert!(text.contains("container not found"));
        assert!(!text.contains("more context"));
        assert!(text.contains("Checked 3 pairs: 1 succeeded, 1 failed, 1 exceptions"));

        let exceptions = text.find("Exceptions").unwrap();
        let failed = text.find("Failed (").unwrap();
        assert!(exceptions < failed);
    }

    #[test]
    fn test_empty_tables_are_omitted() {
        let report = MatrixReport::new(vec![result("node-1", "node-2", "10.0.0.2", ProbeStatus::Success, "")]);
        let text = render(&report);

        assert!(!text.contains("Exceptions"));
        assert!(!text.contains("LOG"));
    }

    #[test]
    fn test_log_excerpt_truncates() {
        let long = "x".repeat(200);
        let excerpt = log_excerpt(&long);
        assert_eq!(excerpt.chars().count(), LOG_WIDTH);
        assert!(excerpt.ends_with("..."));
        assert_eq!(log_excerpt("\n  short \n"), "short");
    }
}
