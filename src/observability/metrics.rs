use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trips_started_total: IntCounter,
    pub trips_completed_total: IntCounterVec,
    pub ticket_scans_total: IntCounterVec,
    pub active_trips: IntGauge,
    pub scan_latency_seconds: Histogram,
    pub assignment_releases_total: IntCounterVec,
    pub release_queue_depth: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trips_started_total = IntCounter::new("trips_started_total", "Trips started")
            .expect("valid trips_started_total metric");

        let trips_completed_total = IntCounterVec::new(
            Opts::new("trips_completed_total", "Trips completed by reason"),
            &["reason"],
        )
        .expect("valid trips_completed_total metric");

        let ticket_scans_total = IntCounterVec::new(
            Opts::new("ticket_scans_total", "Ticket scans by outcome"),
            &["outcome"],
        )
        .expect("valid ticket_scans_total metric");

        let active_trips = IntGauge::new("active_trips", "Trips currently in progress")
            .expect("valid active_trips metric");

        let scan_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "scan_latency_seconds",
                "Latency of ticket scan processing in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )
        .expect("valid scan_latency_seconds metric");

        let assignment_releases_total = IntCounterVec::new(
            Opts::new(
                "assignment_releases_total",
                "Assignment release attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid assignment_releases_total metric");

        let release_queue_depth =
            IntGauge::new("release_queue_depth", "Deferred assignment releases waiting")
                .expect("valid release_queue_depth metric");

        registry
            .register(Box::new(trips_started_total.clone()))
            .expect("register trips_started_total");
        registry
            .register(Box::new(trips_completed_total.clone()))
            .expect("register trips_completed_total");
        registry
            .register(Box::new(ticket_scans_total.clone()))
            .expect("register ticket_scans_total");
        registry
            .register(Box::new(active_trips.clone()))
            .expect("register active_trips");
        registry
            .register(Box::new(scan_latency_seconds.clone()))
            .expect("register scan_latency_seconds");
        registry
            .register(Box::new(assignment_releases_total.clone()))
            .expect("register assignment_releases_total");
        registry
            .register(Box::new(release_queue_depth.clone()))
            .expect("register release_queue_depth");

        Self {
            registry,
            trips_started_total,
            trips_completed_total,
            ticket_scans_total,
            active_trips,
            scan_latency_seconds,
            assignment_releases_total,
            release_queue_depth,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
