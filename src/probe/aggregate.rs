//! Folder-wide probing and result aggregation.
//!
//! All active targets are probed concurrently with a task per target; the
//! join preserves the caller's ordering, so row N of the output always
//! corresponds to target N of the input, probed or skipped.

use std::time::Duration;

use serde::Serialize;

use super::{ProbeOutcome, Prober};
use crate::db::Node;

/// Reason reported for nodes that were not probed.
pub const INACTIVE_REASON: &str = "Node inactive";

/// One probing target: identity, display label, URL, active flag.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
}

impl From<&Node> for Target {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            url: node.url.clone(),
            active: node.active,
        }
    }
}

/// Per-target row of a folder test.
///
/// Inactive targets have `tested == false`, a fixed `reason`, and no probe
/// fields. Probed targets carry the [`ProbeOutcome`] fields inline plus the
/// fetch mode, and optionally per-node statistics across repeated runs.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub tested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fetch: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
}

impl TargetReport {
    fn skipped(target: &Target) -> Self {
        Self {
            id: target.id,
            name: target.name.clone(),
            url: target.url.clone(),
            active: false,
            tested: false,
            reason: Some(INACTIVE_REASON),
            ok: None,
            status_code: None,
            elapsed_ms: None,
            error: None,
            fetch: "skipped",
            avg_ms: None,
            min_ms: None,
            max_ms: None,
            errors: None,
        }
    }

    fn tested(target: &Target, outcome: ProbeOutcome, fetch: &'static str) -> Self {
        Self {
            id: target.id,
            name: target.name.clone(),
            url: target.url.clone(),
            active: true,
            tested: true,
            reason: None,
            ok: Some(outcome.ok),
            status_code: outcome.status_code,
            elapsed_ms: Some(outcome.elapsed_ms),
            error: outcome.error,
            fetch,
            avg_ms: None,
            min_ms: None,
            max_ms: None,
            errors: None,
        }
    }

    /// Fill the statistics fields for a one-off probe: the single sample is
    /// its own average, minimum and maximum.
    pub fn with_single_run_stats(mut self) -> Self {
        if self.tested {
            self.avg_ms = self.elapsed_ms;
            self.min_ms = self.elapsed_ms;
            self.max_ms = self.elapsed_ms;
            self.errors = Some(if self.ok == Some(true) { 0 } else { 1 });
        }
        self
    }
}

/// Probe a single target, honoring its active flag.
pub async fn probe_target(prober: &Prober, target: &Target, timeout: Duration) -> TargetReport {
    if !target.active {
        return TargetReport::skipped(target);
    }
    let outcome = prober.probe_url(&target.url, timeout).await;
    TargetReport::tested(target, outcome, "single")
}

/// Probe all active targets concurrently and report in input order.
///
/// Every input target yields exactly one output row: inactive targets are
/// skipped rows, active ones get a probe outcome. The call returns only
/// after every dispatched probe has finished.
pub async fn probe_targets(
    prober: &Prober,
    targets: &[Target],
    timeout: Duration,
) -> Vec<TargetReport> {
    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        if target.active {
            let prober = prober.clone();
            let url = target.url.clone();
            handles.push(Some(tokio::spawn(async move {
                prober.probe_url(&url, timeout).await
            })));
        } else {
            handles.push(None);
        }
    }

    let mut reports = Vec::with_capacity(targets.len());
    for (target, handle) in targets.iter().zip(handles) {
        let report = match handle {
            None => TargetReport::skipped(target),
            Some(handle) => {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => ProbeOutcome {
                        ok: false,
                        status_code: None,
                        elapsed_ms: 0,
                        error: Some(format!("probe task failed: {}", e)),
                    },
                };
                TargetReport::tested(target, outcome, "parallel")
            }
        };
        reports.push(report);
    }
    reports
}

/// One probe sample taken during a repeated folder test.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub target_id: i64,
    pub label: String,
    pub ok: bool,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Repeat a folder test `rounds` times.
///
/// Returns the rows from the last round, with per-node statistics across all
/// rounds attached, plus every individual measurement (for charting).
pub async fn probe_rounds(
    prober: &Prober,
    targets: &[Target],
    timeout: Duration,
    rounds: u32,
) -> (Vec<TargetReport>, Vec<Measurement>) {
    let rounds = rounds.max(1);
    let mut measurements = Vec::new();
    let mut last = Vec::new();

    for _ in 0..rounds {
        let reports = probe_targets(prober, targets, timeout).await;
        for r in reports.iter().filter(|r| r.tested) {
            measurements.push(Measurement {
                target_id: r.id,
                label: r.name.clone(),
                ok: r.ok == Some(true),
                status_code: r.status_code,
                elapsed_ms: r.elapsed_ms.unwrap_or(0),
                error: r.error.clone(),
            });
        }
        last = reports;
    }

    attach_run_stats(&mut last, &measurements);
    (last, measurements)
}

/// Attach avg/min/max latency and error counts computed over all
/// measurements to the matching tested rows.
fn attach_run_stats(reports: &mut [TargetReport], measurements: &[Measurement]) {
    if measurements.is_empty() {
        return;
    }
    for report in reports.iter_mut().filter(|r| r.tested) {
        let samples: Vec<u64> = measurements
            .iter()
            .filter(|m| m.target_id == report.id)
            .map(|m| m.elapsed_ms)
            .collect();
        if !samples.is_empty() {
            let sum: u64 = samples.iter().sum();
            report.avg_ms = Some(((sum as f64) / (samples.len() as f64)).round() as u64);
            report.min_ms = samples.iter().copied().min();
            report.max_ms = samples.iter().copied().max();
        }
        report.errors = Some(
            measurements
                .iter()
                .filter(|m| m.target_id == report.id && !m.ok)
                .count() as u64,
        );
    }
}

/// Display classification of a summary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Ok,
    Fail,
    Skipped,
}

impl EntryStatus {
    /// Fixed color code used by the chart and result table.
    pub fn color(self) -> &'static str {
        match self {
            EntryStatus::Ok => "#198754",
            EntryStatus::Fail => "#dc3545",
            EntryStatus::Skipped => "#6c757d",
        }
    }
}

/// One renderable data point of an [`AggregateSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub id: i64,
    pub label: String,
    pub status: EntryStatus,
    pub color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Reduction of a set of probe rows into counts, average latency and
/// per-row display entries.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub count_total: usize,
    pub count_measured: usize,
    /// Mean measured latency rounded to the nearest millisecond. `None`
    /// (not zero) when nothing was measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ms: Option<u64>,
    pub entries: Vec<SummaryEntry>,
}

/// Summarize folder test rows, preserving their order.
pub fn summarize(reports: &[TargetReport]) -> AggregateSummary {
    let entries: Vec<SummaryEntry> = reports
        .iter()
        .map(|r| {
            let status = if !r.tested {
                EntryStatus::Skipped
            } else if r.ok == Some(true) {
                EntryStatus::Ok
            } else {
                EntryStatus::Fail
            };
            SummaryEntry {
                id: r.id,
                label: r.name.clone(),
                status,
                color: status.color(),
                elapsed_ms: if r.tested { r.elapsed_ms } else { None },
            }
        })
        .collect();

    finish_summary(entries)
}

/// Summarize individual measurements from a repeated test. Every
/// measurement was actually probed, so all entries count as measured.
pub fn summarize_measurements(measurements: &[Measurement]) -> AggregateSummary {
    let entries: Vec<SummaryEntry> = measurements
        .iter()
        .map(|m| {
            let status = if m.ok { EntryStatus::Ok } else { EntryStatus::Fail };
            SummaryEntry {
                id: m.target_id,
                label: m.label.clone(),
                status,
                color: status.color(),
                elapsed_ms: Some(m.elapsed_ms),
            }
        })
        .collect();

    finish_summary(entries)
}

fn finish_summary(entries: Vec<SummaryEntry>) -> AggregateSummary {
    let measured: Vec<u64> = entries.iter().filter_map(|e| e.elapsed_ms).collect();
    let avg_ms = if measured.is_empty() {
        None
    } else {
        let sum: u64 = measured.iter().sum();
        Some(((sum as f64) / (measured.len() as f64)).round() as u64)
    };

    AggregateSummary {
        count_total: entries.len(),
        count_measured: measured.len(),
        avg_ms,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Stub HTTP server answering every connection with the given status
    /// line after an optional delay.
    async fn stub_server(status_line: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}/", addr)
    }

    fn target(id: i64, name: &str, url: &str, active: bool) -> Target {
        Target {
            id,
            name: name.to_string(),
            url: url.to_string(),
            active,
        }
    }

    #[tokio::test]
    async fn test_output_order_matches_input() {
        let ok_url = stub_server("HTTP/1.1 200 OK", Duration::ZERO).await;
        let prober = Prober::new().unwrap();
        let targets = vec![
            target(1, "a", &ok_url, true),
            target(2, "b", "http://no-such-host.invalid/", true),
            target(3, "c", "http://irrelevant.invalid/", false),
            target(4, "d", &ok_url, true),
        ];

        let reports = probe_targets(&prober, &targets, Duration::from_secs(5)).await;
        assert_eq!(reports.len(), 4);
        let ids: Vec<i64> = reports.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        assert_eq!(reports[0].ok, Some(true));
        assert_eq!(reports[0].status_code, Some(200));

        assert_eq!(reports[1].ok, Some(false));
        assert!(reports[1].status_code.is_none());
        assert!(reports[1].error.is_some());

        assert!(!reports[2].tested);
        assert_eq!(reports[2].reason, Some(INACTIVE_REASON));
        assert!(reports[2].elapsed_ms.is_none());
        assert_eq!(reports[2].fetch, "skipped");

        assert_eq!(reports[3].fetch, "parallel");
    }

    #[tokio::test]
    async fn test_inactive_target_never_probed() {
        let prober = Prober::new().unwrap();
        // URL is not even parseable; a skipped target must not touch it
        let targets = vec![target(1, "bad", "::::not a url::::", false)];
        let reports = probe_targets(&prober, &targets, Duration::from_secs(1)).await;
        assert!(!reports[0].tested);
        assert!(reports[0].error.is_none());
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let prober = Prober::new().unwrap();
        let reports = probe_targets(&prober, &[], Duration::from_secs(1)).await;
        assert!(reports.is_empty());

        let summary = summarize(&reports);
        assert_eq!(summary.count_total, 0);
        assert_eq!(summary.count_measured, 0);
        assert!(summary.avg_ms.is_none());
        assert!(summary.entries.is_empty());
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let delay = Duration::from_millis(250);
        let url = stub_server("HTTP/1.1 200 OK", delay).await;
        let prober = Prober::new().unwrap();
        let targets: Vec<Target> = (0..4)
            .map(|i| target(i, &format!("t{}", i), &url, true))
            .collect();

        let start = Instant::now();
        let reports = probe_targets(&prober, &targets, Duration::from_secs(5)).await;
        let elapsed = start.elapsed();

        assert!(reports.iter().all(|r| r.ok == Some(true)));
        // Serial execution would take at least 4 * 250ms
        assert!(
            elapsed < Duration::from_millis(800),
            "probes appear serialized: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_probe_rounds_stats() {
        let ok_url = stub_server("HTTP/1.1 200 OK", Duration::ZERO).await;
        let err_url = stub_server("HTTP/1.1 500 Internal Server Error", Duration::ZERO).await;
        let prober = Prober::new().unwrap();
        let targets = vec![
            target(1, "good", &ok_url, true),
            target(2, "bad", &err_url, true),
            target(3, "off", &ok_url, false),
        ];

        let (rows, measurements) =
            probe_rounds(&prober, &targets, Duration::from_secs(5), 3).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(measurements.len(), 6); // 2 active * 3 rounds

        assert_eq!(rows[0].errors, Some(0));
        assert!(rows[0].avg_ms.is_some());
        assert!(rows[0].min_ms.unwrap() <= rows[0].max_ms.unwrap());

        assert_eq!(rows[1].errors, Some(3));
        assert_eq!(rows[1].status_code, Some(500));

        assert!(!rows[2].tested);
        assert!(rows[2].avg_ms.is_none());
    }

    #[test]
    fn test_summarize_classification_and_avg() {
        let reports = vec![
            TargetReport {
                id: 1,
                name: "a".into(),
                url: "http://a/".into(),
                active: true,
                tested: true,
                reason: None,
                ok: Some(true),
                status_code: Some(200),
                elapsed_ms: Some(10),
                error: None,
                fetch: "parallel",
                avg_ms: None,
                min_ms: None,
                max_ms: None,
                errors: None,
            },
            TargetReport {
                id: 2,
                name: "b".into(),
                url: "http://b/".into(),
                active: true,
                tested: true,
                reason: None,
                ok: Some(false),
                status_code: None,
                elapsed_ms: Some(15),
                error: Some("connect error".into()),
                fetch: "parallel",
                avg_ms: None,
                min_ms: None,
                max_ms: None,
                errors: None,
            },
            TargetReport {
                id: 3,
                name: "c".into(),
                url: "http://c/".into(),
                active: false,
                tested: false,
                reason: Some(INACTIVE_REASON),
                ok: None,
                status_code: None,
                elapsed_ms: None,
                error: None,
                fetch: "skipped",
                avg_ms: None,
                min_ms: None,
                max_ms: None,
                errors: None,
            },
        ];

        let summary = summarize(&reports);
        assert_eq!(summary.count_total, 3);
        assert_eq!(summary.count_measured, 2);
        // mean of 10 and 15 rounds to 13 (12.5 rounds half-up)
        assert_eq!(summary.avg_ms, Some(13));

        assert_eq!(summary.entries[0].status, EntryStatus::Ok);
        assert_eq!(summary.entries[0].color, "#198754");
        assert_eq!(summary.entries[1].status, EntryStatus::Fail);
        assert_eq!(summary.entries[1].color, "#dc3545");
        assert_eq!(summary.entries[2].status, EntryStatus::Skipped);
        assert_eq!(summary.entries[2].color, "#6c757d");
        assert!(summary.entries[2].elapsed_ms.is_none());
    }

    #[test]
    fn test_single_run_stats() {
        let report = TargetReport {
            id: 1,
            name: "a".into(),
            url: "http://a/".into(),
            active: true,
            tested: true,
            reason: None,
            ok: Some(false),
            status_code: Some(503),
            elapsed_ms: Some(42),
            error: None,
            fetch: "single",
            avg_ms: None,
            min_ms: None,
            max_ms: None,
            errors: None,
        }
        .with_single_run_stats();

        assert_eq!(report.avg_ms, Some(42));
        assert_eq!(report.min_ms, Some(42));
        assert_eq!(report.max_ms, Some(42));
        assert_eq!(report.errors, Some(1));
    }
}
