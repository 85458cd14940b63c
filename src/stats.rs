//! Round-trip statistics for a client run.
//!
//! Collects one sample per reply and derives min/max/avg, percentiles, jitter
//! and standard deviation, printable as text or JSON.

use std::time::Duration;

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for machine consumption.
    Json,
}

/// Round trips seen during a run, in arrival order.
#[derive(Default)]
pub struct RttCollector {
    rtts: Vec<Duration>,
    out_of_order: u32,
}

impl RttCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reply. `in_order` is the server's verdict on its sequence.
    pub fn record(&mut self, rtt: Duration, in_order: bool) {
        self.rtts.push(rtt);
        if !in_order {
            self.out_of_order += 1;
        }
    }

    /// Summarizes the replies recorded against `pings_sent` requests.
    pub fn snapshot(&self, pings_sent: u32) -> StatsSnapshot {
        let mut sorted = self.rtts.clone();
        sorted.sort_unstable();
        let rank = |p| nearest_rank(&sorted, p).map(millis);
        let total: Duration = sorted.iter().sum();

        StatsSnapshot {
            pings_sent,
            replies: sorted.len() as u32,
            out_of_order: self.out_of_order,
            min_rtt_ms: sorted.first().copied().map(millis),
            max_rtt_ms: sorted.last().copied().map(millis),
            avg_rtt_ms: (!sorted.is_empty()).then(|| millis(total) / sorted.len() as f64),
            median_rtt_ms: rank(50.0),
            p95_rtt_ms: rank(95.0),
            p99_rtt_ms: rank(99.0),
            jitter_ms: jitter(&self.rtts).map(millis),
            std_dev_ms: std_dev_ms(&self.rtts),
        }
    }
}

/// `p` in 0.0..=100.0 over an ascending slice.
fn nearest_rank(sorted: &[Duration], p: f64) -> Option<Duration> {
    let last = sorted.len().checked_sub(1)?;
    let idx = ((p / 100.0) * last as f64).round() as usize;
    Some(sorted[idx.min(last)])
}

/// Mean |RTT_i - RTT_{i-1}| in arrival order.
fn jitter(rtts: &[Duration]) -> Option<Duration> {
    if rtts.len() < 2 {
        return None;
    }
    let total: Duration = rtts
        .windows(2)
        .map(|pair| pair[1].max(pair[0]) - pair[1].min(pair[0]))
        .sum();
    Some(total / (rtts.len() - 1) as u32)
}

/// Population standard deviation.
fn std_dev_ms(rtts: &[Duration]) -> Option<f64> {
    if rtts.len() < 2 {
        return None;
    }
    let n = rtts.len() as f64;
    let mean = rtts.iter().copied().map(millis).sum::<f64>() / n;
    let variance = rtts
        .iter()
        .map(|rtt| (millis(*rtt) - mean).powi(2))
        .sum::<f64>()
        / n;
    Some(variance.sqrt())
}

fn millis(rtt: Duration) -> f64 {
    rtt.as_secs_f64() * 1_000.0
}

/// Summary of a client run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub pings_sent: u32,
    pub replies: u32,
    /// Replies where the server's sequence disagreed with the client's.
    pub out_of_order: u32,
    pub min_rtt_ms: Option<f64>,
    pub max_rtt_ms: Option<f64>,
    pub avg_rtt_ms: Option<f64>,
    pub median_rtt_ms: Option<f64>,
    pub p95_rtt_ms: Option<f64>,
    pub p99_rtt_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
}

impl StatsSnapshot {
    /// Renders the summary in the given format.
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.render_text(),
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    pub fn print(&self, format: OutputFormat) {
        println!("{}", self.render(format));
    }

    fn render_text(&self) -> String {
        let mut lines = vec![
            "--- sping statistics ---".to_string(),
            format!("Pings sent: {}", self.pings_sent),
            format!("Replies: {}", self.replies),
            format!("Out of order: {}", self.out_of_order),
        ];
        let timings = [
            ("Min RTT", self.min_rtt_ms),
            ("Max RTT", self.max_rtt_ms),
            ("Avg RTT", self.avg_rtt_ms),
            ("Median RTT", self.median_rtt_ms),
            ("P95 RTT", self.p95_rtt_ms),
            ("P99 RTT", self.p99_rtt_ms),
            ("Jitter", self.jitter_ms),
            ("Std Dev", self.std_dev_ms),
        ];
        for (label, value) in timings {
            if let Some(v) = value {
                lines.push(format!("{}: {:.3} ms", label, v));
            }
        }
        lines.join("\n")
    }
}
