//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connections waiting on the main queue.
    pub main_queue_depth: usize,
    /// Connections waiting on the events queue.
    pub events_queue_depth: usize,
    /// Whether the interpreter is evaluating.
    pub busy: bool,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    main_queue_depth: usize,
    events_queue_depth: usize,
    busy: bool,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        main_queue_depth,
        events_queue_depth,
        busy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0, false);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, 0, false);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn queue_depths_tracked() {
        let resp = health_check(Instant::now(), 3, 1, true);
        assert_eq!(resp.main_queue_depth, 3);
        assert_eq!(resp.events_queue_depth, 1);
        assert!(resp.busy);
    }
}
