use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use uptally_domain::{EntityId, Report, Summary};
use uptally_ports::Exporter;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Prints a human-readable rendering of each report, one line per entity.
#[derive(Clone)]
pub struct StdoutExporter {
    out: SharedWriter,
}

impl Default for StdoutExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutExporter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }
}

#[async_trait]
impl Exporter for StdoutExporter {
    async fn export(&self, report: &Report) -> Result<()> {
        let lines = render(report);
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("stdout exporter lock poisoned"))?;
        for line in &lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}

pub fn render(report: &Report) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.len() + 1);
    let sources = report
        .source_counts()
        .into_iter()
        .map(|(source, count)| format!("{source}={count}"))
        .collect::<Vec<_>>()
        .join(",");
    lines.push(format!(
        "report generated_at={} ready={} entities={} sources=[{}]",
        report.generated_at.to_rfc3339(),
        report.ready,
        report.len(),
        sources
    ));
    for (id, summary) in &report.summaries {
        lines.push(render_summary(id, summary));
    }
    lines
}

fn render_summary(id: &EntityId, summary: &Summary) -> String {
    let availability = summary
        .availability()
        .map(|ratio| format!("{:.2}%", ratio * 100.0))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{id} up={} down={} availability={availability} first_available={} \
         interruptions={} mean_up={} latest_up={} recoveries={} mean_down={} latest_down={}",
        human(summary.up_time),
        human(summary.down_time),
        human(summary.time_to_first_available),
        summary.interruption_count,
        human(summary.mean_up_between_interruptions),
        human(summary.latest_up_between_interruptions),
        summary.recovery_count,
        human(summary.mean_down_between_recoveries),
        human(summary.latest_down_between_recoveries),
    )
}

fn human(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample() -> Report {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut summaries = BTreeMap::new();
        summaries.insert(
            EntityId::new("jobsets", "team-a.trainer"),
            Summary {
                up_time: Duration::from_secs(3 * 3600),
                down_time: Duration::from_secs(3600),
                time_to_first_available: Duration::from_secs(3600),
                ..Summary::default()
            },
        );
        summaries.insert(EntityId::new("nodes", "pool-a-1"), Summary::default());
        Report::new(now, summaries)
    }

    #[test]
    fn human_durations() {
        assert_eq!(human(Duration::ZERO), "0s");
        assert_eq!(human(Duration::from_secs(59)), "59s");
        assert_eq!(human(Duration::from_secs(61)), "1m01s");
        assert_eq!(human(Duration::from_secs(3 * 3600 + 5)), "3h00m05s");
    }

    #[test]
    fn renders_header_and_one_line_per_entity() {
        let lines = render(&sample());
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "report generated_at=2024-06-01T12:00:00+00:00 ready=true entities=2 sources=[jobsets=1,nodes=1]"
        );
        assert!(lines[1].starts_with("jobsets/team-a.trainer up=3h00m00s down=1h00m00s availability=75.00%"));
        assert!(lines[2].contains("availability=n/a"));
    }

    #[tokio::test]
    async fn writes_rendered_report() {
        let captured = Captured::default();
        let exporter = StdoutExporter::with_writer(Box::new(captured.clone()));
        exporter.export(&sample()).await.unwrap();

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));
    }
}
