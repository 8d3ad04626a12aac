use std::collections::HashSet;
use std::fmt::Write;
use std::path::Path;

use anyhow::Context;

use crate::history::RollingHistory;
use crate::models::SectorScore;
use crate::profile::DomainProfile;
use crate::risk;
use crate::store::ReportStore;

pub fn build_report(
    profile: &DomainProfile,
    history: &RollingHistory,
    reports: &ReportStore,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Operations Report", title_case(&profile.name));
    match history.latest() {
        Some(latest) => {
            let _ = writeln!(
                output,
                "Latest tick {} ({} of {} snapshots retained)",
                latest.timestamp.format("%Y-%m-%d %H:%M"),
                history.len(),
                history.capacity()
            );
        }
        None => {
            let _ = writeln!(output, "No ticks recorded yet.");
            return output;
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Figures");
    if let Some(latest) = history.latest() {
        let agg = &latest.aggregates;
        let delta = history
            .avg_delta()
            .map(|d| format!(" ({d:+.1} since previous tick)"))
            .unwrap_or_default();
        let _ = writeln!(output, "- Average score {:.1}{}", agg.avg, delta);
        let _ = writeln!(output, "- Peak sector score {:.1}", agg.max);
        let _ = writeln!(
            output,
            "- {} sector(s) above alert threshold {:.0}",
            agg.alert_count, profile.alert_threshold
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Sectors");
    if let Some(latest) = history.latest() {
        let worst = risk::select_for_service(&latest.scores, 5);
        for sector in worst {
            if let Some(score) = latest.scores.iter().find(|s| s.sector == sector) {
                let _ = writeln!(output, "- {}", describe(score));
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");
    let _ = writeln!(output, "| time | avg | max | alerts |");
    let _ = writeln!(output, "|---|---|---|---|");
    for snapshot in history.as_series() {
        let _ = writeln!(
            output,
            "| {} | {:.1} | {:.1} | {} |",
            snapshot.timestamp.format("%H:%M"),
            snapshot.aggregates.avg,
            snapshot.aggregates.max,
            snapshot.aggregates.alert_count
        );
    }

    let summaries = reports.summarize_by_issue();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Citizen Report Mix");
    if summaries.is_empty() {
        let _ = writeln!(output, "No citizen reports this session.");
    } else {
        let reporting: HashSet<_> = reports.all().iter().map(|r| &r.sector).collect();
        let _ = writeln!(
            output,
            "{} report(s) across {} sector(s)",
            reports.len(),
            reporting.len()
        );
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports (avg severity {:.1})",
                summary.issue, summary.count, summary.avg_severity
            );
        }
    }

    let recent = reports.recent(5);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Citizen Reports");
    if recent.is_empty() {
        let _ = writeln!(output, "No citizen reports this session.");
    } else {
        for report in recent {
            let _ = writeln!(
                output,
                "- {} {} (severity {}) on {}: {}",
                report.sector,
                report.issue,
                report.severity,
                report.submitted_at.format("%Y-%m-%d %H:%M"),
                report.comment
            );
        }
    }

    output
}

pub fn describe(score: &SectorScore) -> String {
    format!(
        "{} score {:.1} ({})",
        score.sector, score.scaled_score, score.band
    )
}

/// Write the history series oldest-first, one row per snapshot and one
/// column per sector.
pub fn export_history_csv(history: &RollingHistory, out: &Path) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(out)
        .with_context(|| format!("failed to create {}", out.display()))?;

    let mut header = vec![
        "timestamp".to_string(),
        "avg".to_string(),
        "max".to_string(),
        "alert_count".to_string(),
    ];
    if let Some(first) = history.as_series().next() {
        header.extend(first.scores.iter().map(|s| s.sector.to_string()));
    }
    writer.write_record(&header)?;

    let mut rows = 0;
    for snapshot in history.as_series() {
        let mut record = vec![
            snapshot.timestamp.to_rfc3339(),
            format!("{:.3}", snapshot.aggregates.avg),
            format!("{:.3}", snapshot.aggregates.max),
            snapshot.aggregates.alert_count.to_string(),
        ];
        record.extend(snapshot.scores.iter().map(|s| format!("{:.3}", s.scaled_score)));
        writer.write_record(&record)?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
