use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct Metrics {
    // Queries
    pub queries_total: AtomicU64,
    pub query_rejections_total: AtomicU64,
    pub filters_ignored_total: AtomicU64,
    pub query_micros_total: AtomicU64,

    // Import
    pub import_runs_total: AtomicU64,
    pub countries_added_total: AtomicU64,
    pub cities_added_total: AtomicU64,
    pub import_rows_skipped_total: AtomicU64,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub fn record_query_duration(elapsed: Duration) {
    let m = metrics();
    m.queries_total.fetch_add(1, Ordering::Relaxed);
    m.query_micros_total.fetch_add(
        u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        Ordering::Relaxed,
    );
}

pub fn record_query_rejected() {
    metrics()
        .query_rejections_total
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_filter_ignored() {
    metrics()
        .filters_ignored_total
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_import(countries: u64, cities: u64, skipped: u64) {
    let m = metrics();
    m.import_runs_total.fetch_add(1, Ordering::Relaxed);
    m.countries_added_total
        .fetch_add(countries, Ordering::Relaxed);
    m.cities_added_total.fetch_add(cities, Ordering::Relaxed);
    m.import_rows_skipped_total
        .fetch_add(skipped, Ordering::Relaxed);
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    let counters = [
        ("queries_total", &m.queries_total),
        ("query_rejections_total", &m.query_rejections_total),
        ("filters_ignored_total", &m.filters_ignored_total),
        ("query_micros_total", &m.query_micros_total),
        ("import_runs_total", &m.import_runs_total),
        ("countries_added_total", &m.countries_added_total),
        ("cities_added_total", &m.cities_added_total),
        ("import_rows_skipped_total", &m.import_rows_skipped_total),
    ];
    for (name, value) in counters {
        let _ = writeln!(
            s,
            "# TYPE {name} counter\n{name} {}",
            value.load(Ordering::Relaxed)
        );
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_counter() {
        record_import(1, 2, 0);
        let text = render_prometheus();
        assert!(text.contains("# TYPE queries_total counter"));
        assert!(text.contains("# TYPE import_rows_skipped_total counter"));
        // counters are process-wide, other tests may have added to them
        assert!(metrics().cities_added_total.load(Ordering::Relaxed) >= 2);
    }
}
