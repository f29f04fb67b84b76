//! Thin wrappers around `prometheus` registration, grouped here so that
//! every component builds its metrics the same way instead of reaching for
//! `prometheus::Opts` directly.

use std::borrow::{Borrow, Cow};

use prometheus::{Encoder, HistogramOpts, Opts, TextEncoder};
pub use prometheus::{
    Histogram, HistogramTimer, HistogramVec as PrometheusHistogramVec, IntCounter,
    IntCounterVec as PrometheusIntCounterVec, IntGauge, IntGaugeVec as PrometheusIntGaugeVec,
};

pub struct OwnedPrometheusLabels<const N: usize> {
    labels: [Cow<'static, str>; N],
}

impl<const N: usize> OwnedPrometheusLabels<N> {
    pub fn new(labels: [Cow<'static, str>; N]) -> Self {
        Self { labels }
    }

    pub fn borrow_labels(&self) -> [&str; N] {
        let mut labels = [""; N];
        for (i, label) in self.labels.iter().enumerate() {
            labels[i] = label.borrow();
        }
        labels
    }
}

#[derive(Clone)]
pub struct IntCounterVec<const N: usize> {
    underlying: PrometheusIntCounterVec,
}

impl<const N: usize> IntCounterVec<N> {
    pub fn with_label_values(&self, label_values: [&str; N]) -> IntCounter {
        self.underlying.with_label_values(&label_values)
    }
}

#[derive(Clone)]
pub struct HistogramVec<const N: usize> {
    underlying: PrometheusHistogramVec,
}

impl<const N: usize> HistogramVec<N> {
    pub fn with_label_values(&self, label_values: [&str; N]) -> Histogram {
        self.underlying.with_label_values(&label_values)
    }
}

pub fn new_counter(name: &str, description: &str, namespace: &str) -> IntCounter {
    let opts = Opts::new(name, description).namespace(namespace);
    let counter = IntCounter::with_opts(opts).expect("failed to create counter");
    prometheus::register(Box::new(counter.clone())).expect("failed to register counter");
    counter
}

pub fn new_counter_vec<const N: usize>(
    name: &str,
    description: &str,
    namespace: &str,
    label_names: [&str; N],
) -> IntCounterVec<N> {
    let opts = Opts::new(name, description).namespace(namespace);
    let underlying =
        PrometheusIntCounterVec::new(opts, &label_names).expect("failed to create counter vec");
    prometheus::register(Box::new(underlying.clone())).expect("failed to register counter vec");
    IntCounterVec { underlying }
}

pub fn new_gauge(name: &str, description: &str, namespace: &str) -> IntGauge {
    let opts = Opts::new(name, description).namespace(namespace);
    let gauge = IntGauge::with_opts(opts).expect("failed to create gauge");
    prometheus::register(Box::new(gauge.clone())).expect("failed to register gauge");
    gauge
}

pub fn new_histogram(name: &str, description: &str, namespace: &str) -> Histogram {
    let opts = HistogramOpts::new(name, description).namespace(namespace);
    let histogram = Histogram::with_opts(opts).expect("failed to create histogram");
    prometheus::register(Box::new(histogram.clone())).expect("failed to register histogram");
    histogram
}

pub fn new_histogram_vec<const N: usize>(
    name: &str,
    description: &str,
    namespace: &str,
    label_names: [&str; N],
) -> HistogramVec<N> {
    let opts = HistogramOpts::new(name, description).namespace(namespace);
    let underlying =
        PrometheusHistogramVec::new(opts, &label_names).expect("failed to create histogram vec");
    prometheus::register(Box::new(underlying.clone())).expect("failed to register histogram vec");
    HistogramVec { underlying }
}

/// Drop-based gauge increment/decrement, for tracking "number of requests
/// currently in this phase" without a matching inc/dec at every return site.
pub struct GaugeGuard(&'static IntGauge);

impl GaugeGuard {
    pub fn from_gauge(gauge: &'static IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Renders the process-global registry in the Prometheus text exposition
/// format. Carried as instrumentation plumbing even though the scrape
/// *endpoint* itself is out of scope.
pub fn metrics_text_payload() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let _ = encoder.encode(&metric_families, &mut buffer);
    String::from_utf8_lossy(&buffer).to_string()
}
