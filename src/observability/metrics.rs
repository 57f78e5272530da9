use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_total: IntCounterVec,
    pub active_searches: IntGauge,
    pub match_latency_seconds: HistogramVec,
    pub available_drivers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_total = IntCounterVec::new(
            Opts::new("rides_total", "Ride transitions by resulting status"),
            &["status"],
        )
        .expect("valid rides_total metric");

        let active_searches = IntGauge::new(
            "active_searches",
            "Rides currently searching with open driver offers",
        )
        .expect("valid active_searches metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Time from ride request to match resolution in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let available_drivers = IntGauge::new(
            "available_drivers",
            "Drivers currently marked available in the registry",
        )
        .expect("valid available_drivers metric");

        registry
            .register(Box::new(rides_total.clone()))
            .expect("register rides_total");
        registry
            .register(Box::new(active_searches.clone()))
            .expect("register active_searches");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(available_drivers.clone()))
            .expect("register available_drivers");

        Self {
            registry,
            rides_total,
            active_searches,
            match_latency_seconds,
            available_drivers,
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
