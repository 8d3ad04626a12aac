use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{CitizenReport, IssueSummary, Sector};
use crate::profile::{DomainProfile, IncidentRule, SeedReport};

/// Session-scoped list of citizen reports. Scoring only reads from it.
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    sectors: Vec<Sector>,
    issue_types: Vec<String>,
    reports: Vec<CitizenReport>,
}

impl ReportStore {
    /// An empty `issue_types` list accepts any issue.
    pub fn new(sectors: Vec<Sector>, issue_types: Vec<String>) -> Self {
        Self {
            sectors,
            issue_types,
            reports: Vec::new(),
        }
    }

    pub fn for_profile(profile: &DomainProfile) -> Self {
        Self::new(profile.sectors(), profile.issue_types.clone())
    }

    pub fn seed_defaults(
        &mut self,
        seeds: &[SeedReport],
        at: DateTime<Utc>,
    ) -> Result<usize, ReportError> {
        for seed in seeds {
            self.submit(&seed.sector, &seed.issue, seed.severity, &seed.comment, at)?;
        }
        Ok(seeds.len())
    }

    pub fn submit(
        &mut self,
        sector: &str,
        issue: &str,
        severity: u8,
        comment: &str,
        at: DateTime<Utc>,
    ) -> Result<Uuid, ReportError> {
        let report = CitizenReport {
            id: Uuid::new_v4(),
            sector: Sector::new(sector),
            issue: issue.to_string(),
            severity,
            comment: comment.to_string(),
            submitted_at: at,
        };
        let id = report.id;
        self.insert(report)?;
        Ok(id)
    }

    /// Returns `false` when a report with the same id is already stored.
    fn insert(&mut self, report: CitizenReport) -> Result<bool, ReportError> {
        if !self.sectors.contains(&report.sector) {
            return Err(ReportError::UnknownSector(report.sector.to_string()));
        }
        if !self.issue_types.is_empty() && !self.issue_types.contains(&report.issue) {
            return Err(ReportError::UnknownIssue(report.issue));
        }
        if !(1..=5).contains(&report.severity) {
            return Err(ReportError::SeverityOutOfRange(report.severity));
        }
        if self.reports.iter().any(|r| r.id == report.id) {
            return Ok(false);
        }

        debug!(id = %report.id, sector = %report.sector, issue = %report.issue, "report stored");
        self.reports.push(report);
        Ok(true)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<CitizenReport, ReportError> {
        let index = self
            .reports
            .iter()
            .position(|r| r.id == id)
            .ok_or(ReportError::NotFound(id))?;
        Ok(self.reports.remove(index))
    }

    pub fn all(&self) -> &[CitizenReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Sum of severities per sector. Sectors without reports are absent.
    pub fn severity_by_sector(&self) -> HashMap<Sector, u32> {
        let mut sums = HashMap::new();
        for report in &self.reports {
            *sums.entry(report.sector.clone()).or_insert(0) += u32::from(report.severity);
        }
        sums
    }

    pub fn incidents_by_sector(&self, rule: &IncidentRule) -> HashSet<Sector> {
        self.reports
            .iter()
            .filter(|r| r.issue == rule.issue && r.severity >= rule.min_severity)
            .map(|r| r.sector.clone())
            .collect()
    }

    /// Import reports from CSV with columns
    /// `sector,issue,severity,comment,submitted_at,id` (the last two optional).
    pub fn import_csv(&mut self, csv_path: &Path) -> anyhow::Result<usize> {
        #[derive(serde::Deserialize)]
        struct CsvRow {
            sector: String,
            issue: String,
            severity: u8,
            #[serde(default)]
            comment: String,
            #[serde(default)]
            submitted_at: Option<DateTime<Utc>>,
            #[serde(default)]
            id: Option<Uuid>,
        }

        let mut reader = csv::Reader::from_path(csv_path)
            .with_context(|| format!("failed to open {}", csv_path.display()))?;
        let mut inserted = 0usize;

        for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row = result.with_context(|| format!("bad report row {}", line + 1))?;
            let report = CitizenReport {
                id: row.id.unwrap_or_else(Uuid::new_v4),
                sector: Sector::new(row.sector),
                issue: row.issue,
                severity: row.severity,
                comment: row.comment,
                submitted_at: row.submitted_at.unwrap_or_else(Utc::now),
            };

            if self
                .insert(report)
                .with_context(|| format!("rejected report row {}", line + 1))?
            {
                inserted += 1;
            }
        }

        info!(path = %csv_path.display(), inserted, "imported citizen reports");
        Ok(inserted)
    }

    /// Report count and mean severity per issue type, most frequent first.
    pub fn summarize_by_issue(&self) -> Vec<IssueSummary> {
        let mut map: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
        for report in &self.reports {
            let entry = map.entry(report.issue.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += u32::from(report.severity);
        }

        let mut summaries: Vec<IssueSummary> = map
            .into_iter()
            .map(|(issue, (count, total_severity))| IssueSummary {
                issue: issue.to_string(),
                count,
                avg_severity: total_severity as f64 / count as f64,
            })
            .collect();

        summaries.sort_by(|a, b| b.count.cmp(&a.count));
        summaries
    }

    /// The `n` newest reports, newest first.
    pub fn recent(&self, n: usize) -> Vec<&CitizenReport> {
        let mut reports: Vec<&CitizenReport> = self.reports.iter().collect();
        reports.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        reports.truncate(n);
        reports
    }
}
