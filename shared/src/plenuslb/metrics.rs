use log::info;
use prometheus::Encoder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

/// Environment variable name for the shared metrics/health port.
const METRICS_PORT_LABEL: &str = "METRICS_PORT";
const DEFAULT_METRICS_PORT: u16 = 8080;

/// Shared liveness/readiness state, flipped by the owning binary
/// (controller on leader-gain/loss, agent on startup-complete).
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .expect("couldn't encode prometheus metrics");
    let res =
        String::from_utf8(buffer).expect("prometheus metrics could not be converted to String");
    Ok(res)
}

/// Serves `/metrics`, `/health`, and `/ready` over one HTTP listener, per
/// SPEC_FULL.md §2a/§6. `/health` is always 200 once the server is up;
/// `/ready` reflects `health.is_ready()`, returning 423 when not ready.
pub async fn run_metrics_server(
    health: HealthState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let port = match std::env::var(METRICS_PORT_LABEL) {
        Ok(p) => p.parse::<u16>()?,
        Err(_) => DEFAULT_METRICS_PORT,
    };
    info!(
        "starting metrics/health server on port {} at /metrics, /health, /ready",
        port
    );

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let health_route = warp::path!("health").map(|| warp::reply::with_status(
        "ok",
        warp::http::StatusCode::OK,
    ));
    let ready_health = health.clone();
    let ready_route = warp::path!("ready").map(move || {
        if ready_health.is_ready() {
            warp::reply::with_status("ready", warp::http::StatusCode::OK)
        } else {
            warp::reply::with_status("not ready", warp::http::StatusCode::from_u16(423).unwrap())
        }
    });

    let routes = metrics_route.or(health_route).or(ready_route);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_defaults_to_not_ready() {
        let h = HealthState::new();
        assert!(!h.is_ready());
        h.set_ready(true);
        assert!(h.is_ready());
    }
}
