//! Prometheus metrics registry for crashspool
//!
//! Provides typed counters, gauges and histograms for every observable
//! operation in the spool: ingestion, quota eviction, upload attempts and
//! retention sweeps.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: reports accepted into the spool
    pub reports_ingested_total: IntCounter,
    /// Counter: reports deleted by retention sweeps, by reason
    pub reports_purged_total: IntCounterVec,
    /// Counter: upload attempts by (outcome, crash_type)
    pub uploads_total: IntCounterVec,
    /// Gauge: reports currently in the spool per lifecycle state
    pub reports_in_spool: IntGaugeVec,
    /// Histogram: upload attempt duration in seconds, by outcome
    pub upload_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("crashspool".to_string()), None)?;

        let reports_ingested_total = IntCounter::new(
            "reports_ingested_total",
            "Reports accepted into the spool",
        )?;
        registry.register(Box::new(reports_ingested_total.clone()))?;

        let reports_purged_total = IntCounterVec::new(
            Opts::new(
                "reports_purged_total",
                "Reports deleted by retention sweeps",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(reports_purged_total.clone()))?;

        let uploads_total = IntCounterVec::new(
            Opts::new("uploads_total", "Upload attempts by outcome"),
            &["outcome", "crash_type"],
        )?;
        registry.register(Box::new(uploads_total.clone()))?;

        let reports_in_spool = IntGaugeVec::new(
            Opts::new("reports_in_spool", "Reports in the spool by state"),
            &["state"],
        )?;
        registry.register(Box::new(reports_in_spool.clone()))?;

        let upload_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "upload_duration_seconds",
                "Upload attempt duration in seconds",
            )
            .buckets(vec![0.5, 2.0, 10.0, 60.0, f64::INFINITY]),
            &["outcome"],
        )?;
        registry.register(Box::new(upload_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            reports_ingested_total,
            reports_purged_total,
            uploads_total,
            reports_in_spool,
            upload_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record one accepted ingestion.
    pub fn record_ingested(&self) {
        self.reports_ingested_total.inc();
    }

    /// Record reports deleted by a sweep for the given reason.
    pub fn record_purged(&self, reason: &str, count: u64) {
        self.reports_purged_total
            .with_label_values(&[reason])
            .inc_by(count);
    }

    /// Record one upload attempt outcome.
    pub fn record_upload(&self, outcome: &str, crash_type: &str) {
        self.uploads_total
            .with_label_values(&[outcome, crash_type])
            .inc();
    }

    /// Observe one upload attempt duration.
    pub fn observe_upload_duration(&self, outcome: &str, duration_secs: f64) {
        self.upload_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    /// Set the gauge of spooled reports per state.
    pub fn set_reports_in_spool(&self, state: &str, count: i64) {
        self.reports_in_spool.with_label_values(&[state]).set(count);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
