use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_fanout_total: IntCounterVec,
    pub claims_total: IntCounterVec,
    pub responses_total: IntCounterVec,
    pub publish_failures_total: IntCounterVec,
    pub pending_requests: IntGauge,
    pub expired_requests_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_fanout_total = IntCounterVec::new(
            Opts::new(
                "dispatch_fanout_total",
                "Booking requests dispatched, by mode",
            ),
            &["mode"],
        )
        .expect("valid dispatch_fanout_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let responses_total = IntCounterVec::new(
            Opts::new("responses_total", "Driver responses recorded, by kind"),
            &["kind"],
        )
        .expect("valid responses_total metric");

        let publish_failures_total = IntCounterVec::new(
            Opts::new(
                "publish_failures_total",
                "Best-effort publishes that failed, by channel kind",
            ),
            &["channel_kind"],
        )
        .expect("valid publish_failures_total metric");

        let pending_requests =
            IntGauge::new("pending_requests", "Delivery requests awaiting a claim")
                .expect("valid pending_requests metric");

        let expired_requests_total = IntCounter::new(
            "expired_requests_total",
            "Pending requests aged out by the expiry sweep",
        )
        .expect("valid expired_requests_total metric");

        registry
            .register(Box::new(dispatch_fanout_total.clone()))
            .expect("register dispatch_fanout_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(responses_total.clone()))
            .expect("register responses_total");
        registry
            .register(Box::new(publish_failures_total.clone()))
            .expect("register publish_failures_total");
        registry
            .register(Box::new(pending_requests.clone()))
            .expect("register pending_requests");
        registry
            .register(Box::new(expired_requests_total.clone()))
            .expect("register expired_requests_total");

        Self {
            registry,
            dispatch_fanout_total,
            claims_total,
            responses_total,
            publish_failures_total,
            pending_requests,
            expired_requests_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
