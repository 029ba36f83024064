//! Prometheus metrics for the service.
//!
//! Registered on a private `prometheus::Registry` and rendered in the text
//! exposition format at `GET /metrics`.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,

    /// Completed races, labelled by fate or error kind.
    pub races: IntCounterVec,

    /// Race duration in seconds, labelled like `races`.
    pub race_duration: HistogramVec,

    /// Chat completion requests, labelled by mode (stream/unary) and status.
    pub chat_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let races = IntCounterVec::new(
            Opts::new("aio_race_races_total", "Races run by the coordinator"),
            &["outcome"],
        )?;
        let race_duration = HistogramVec::new(
            HistogramOpts::new("aio_race_race_duration_seconds", "Wall time of a race")
                .buckets(prometheus::exponential_buckets(0.01, 2.0, 12)?),
            &["outcome"],
        )?;
        let chat_requests = IntCounterVec::new(
            Opts::new("aio_race_chat_requests_total", "Chat completion requests"),
            &["mode", "status"],
        )?;

        registry.register(Box::new(races.clone()))?;
        registry.register(Box::new(race_duration.clone()))?;
        registry.register(Box::new(chat_requests.clone()))?;

        Ok(Self {
            registry,
            races,
            race_duration,
            chat_requests,
        })
    }

    pub fn record_race(&self, outcome: &str, seconds: f64) {
        self.races.with_label_values(&[outcome]).inc();
        self.race_duration
            .with_label_values(&[outcome])
            .observe(seconds);
    }

    pub fn record_chat(&self, mode: &str, status: &str) {
        self.chat_requests.with_label_values(&[mode, status]).inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_race("cancelled", 1.0);
        metrics.record_chat("unary", "ok");

        let text = metrics.render().unwrap();
        assert!(text.contains("aio_race_races_total{outcome=\"cancelled\"} 1"));
        assert!(text.contains("aio_race_chat_requests_total{mode=\"unary\",status=\"ok\"} 1"));
    }
}
