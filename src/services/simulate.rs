//! Simulator — stand-in latency and success for "external" calls.
//!
//! DESIGN
//! ======
//! Publishing, connection tests, invitations, domain purchases and similar
//! operations have no real backend. Each one awaits `Simulator::call`, which
//! sleeps for the configured latency and then rolls against the configured
//! success rate. Tests build a simulator with zero latency and a fixed rate.

use std::time::{Duration, Instant};

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Simulator {
    latency: Duration,
    success_rate: f64,
}

/// Outcome of one simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOutcome {
    pub success: bool,
    pub latency_ms: u64,
}

impl Simulator {
    /// A NaN rate is treated as always failing.
    #[must_use]
    pub fn new(latency: Duration, success_rate: f64) -> Self {
        let success_rate = if success_rate.is_nan() { 0.0 } else { success_rate.clamp(0.0, 1.0) };
        Self { latency, success_rate }
    }

    /// Zero latency, every call succeeds.
    #[must_use]
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, 1.0)
    }

    /// Zero latency, every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::new(Duration::ZERO, 0.0)
    }

    #[must_use]
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    #[must_use]
    pub fn roll(&self) -> bool {
        if self.success_rate >= 1.0 {
            return true;
        }
        if self.success_rate <= 0.0 {
            return false;
        }
        rand::rng().random_bool(self.success_rate)
    }

    /// Sleep for the simulated latency, then roll for success.
    pub async fn call(&self) -> SimOutcome {
        let started = Instant::now();
        self.delay().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        SimOutcome { success: self.roll(), latency_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instant_always_succeeds() {
        let sim = Simulator::instant();
        for _ in 0..20 {
            assert!(sim.call().await.success);
        }
    }

    #[tokio::test]
    async fn failing_never_succeeds() {
        let sim = Simulator::failing();
        for _ in 0..20 {
            assert!(!sim.call().await.success);
        }
    }

    #[test]
    fn success_rate_is_clamped() {
        assert!(Simulator::new(Duration::ZERO, 7.0).roll());
        assert!(!Simulator::new(Duration::ZERO, -2.0).roll());
    }

    #[test]
    fn nan_rate_never_succeeds() {
        let sim = Simulator::new(Duration::ZERO, f64::NAN);
        for _ in 0..20 {
            assert!(!sim.roll());
        }
    }

    #[tokio::test]
    async fn call_waits_for_latency() {
        let sim = Simulator::new(Duration::from_millis(20), 1.0);
        let outcome = sim.call().await;
        assert!(outcome.success);
        assert!(outcome.latency_ms >= 20);
    }
}
