//! Rate/Chaos Engine.
//!
//! Decides, per call, whether a simulated fault replaces normal execution.
//! Deterministic toggles (network, auth) dominate the sliding-window rate
//! limit, which dominates the probabilistic fault table.
//!
//! Each app gets its own `Mutex<AppTraffic>`; calls against different apps
//! never contend on the same lock. The fault table and the random source are
//! engine-wide and are only held for the duration of a single scan.

use crate::app::RateLimitProfile;
use crate::clock::{self, Clock};
use crate::fault::{Fault, RATE_LIMIT_FALLBACK_RETRY_AFTER_SECS};
use crate::types::FaultKind;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const BURST_WINDOW_SECS: i64 = 10;
pub const MINUTE_WINDOW_SECS: i64 = 60;
pub const MAX_FAULT_PROBABILITY: f64 = 0.95;
pub const MAX_CHAOS_LEVEL: f64 = 2.0;

// ---------------------------------------------------------------------------
// FaultProfile
// ---------------------------------------------------------------------------

/// Ordered `(kind, probability)` table. The order is always `FaultKind::all()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultProfile {
    entries: Vec<(FaultKind, f64)>,
}

impl FaultProfile {
    pub fn baseline() -> Self {
        Self {
            entries: FaultKind::all()
                .iter()
                .map(|&k| (k, k.baseline_probability()))
                .collect(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            entries: FaultKind::all().iter().map(|&k| (k, 0.0)).collect(),
        }
    }

    /// Build a table from arbitrary pairs. Kinds not mentioned get 0.0;
    /// probabilities are clamped to `[0, 1]`.
    pub fn from_pairs(pairs: &[(FaultKind, f64)]) -> Self {
        let mut profile = Self::disabled();
        for &(kind, p) in pairs {
            profile.set(kind, p);
        }
        profile
    }

    pub fn entries(&self) -> &[(FaultKind, f64)] {
        &self.entries
    }

    pub fn probability(&self, kind: FaultKind) -> f64 {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, kind: FaultKind, probability: f64) {
        let p = clamp_unit(probability);
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 = p;
        }
    }

    /// Every entry multiplied by `level`, capped at `MAX_FAULT_PROBABILITY`.
    pub fn scaled(&self, level: f64) -> Self {
        let level = clamp_chaos_level(level);
        Self {
            entries: self
                .entries
                .iter()
                .map(|&(k, p)| (k, (p * level).min(MAX_FAULT_PROBABILITY)))
                .collect(),
        }
    }
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self::baseline()
    }
}

fn clamp_unit(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

pub fn clamp_chaos_level(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, MAX_CHAOS_LEVEL)
    }
}

// ---------------------------------------------------------------------------
// AppTraffic
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct AppTraffic {
    limits: Option<RateLimitProfile>,
    /// Non-decreasing; entries older than the minute window are pruned lazily.
    requests: VecDeque<DateTime<Utc>>,
    authenticated: bool,
    network_available: bool,
}

impl Default for AppTraffic {
    fn default() -> Self {
        Self {
            limits: None,
            requests: VecDeque::new(),
            authenticated: true,
            network_available: true,
        }
    }
}

impl AppTraffic {
    fn prune(&mut self, now: DateTime<Utc>) {
        let window = Duration::seconds(MINUTE_WINDOW_SECS);
        while let Some(&oldest) = self.requests.front() {
            if now - oldest >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn push(&mut self, now: DateTime<Utc>) {
        let ts = match self.requests.back() {
            Some(&last) if last > now => last,
            _ => now,
        };
        self.requests.push_back(ts);
    }

    fn count_within(&self, now: DateTime<Utc>, secs: i64) -> usize {
        let window = Duration::seconds(secs);
        self.requests
            .iter()
            .rev()
            .take_while(|&&ts| now - ts < window)
            .count()
    }

    fn rate_limit_exceeded(&self, now: DateTime<Utc>) -> bool {
        let Some(limits) = self.limits else {
            return false;
        };
        self.count_within(now, BURST_WINDOW_SECS) >= limits.burst_limit as usize
            || self.count_within(now, MINUTE_WINDOW_SECS) >= limits.requests_per_min as usize
    }

    /// Whole seconds until the oldest live timestamp leaves the minute window.
    fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        match self.requests.front() {
            Some(&oldest) => {
                let remaining = Duration::seconds(MINUTE_WINDOW_SECS) - (now - oldest);
                remaining.num_seconds().max(0) as u64
            }
            None => RATE_LIMIT_FALLBACK_RETRY_AFTER_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// ChaosEngine
// ---------------------------------------------------------------------------

pub struct ChaosEngine {
    apps: RwLock<HashMap<String, Arc<Mutex<AppTraffic>>>>,
    baseline: RwLock<FaultProfile>,
    active: RwLock<FaultProfile>,
    chaos_level: RwLock<f64>,
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
}

impl Default for ChaosEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosEngine {
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            baseline: RwLock::new(FaultProfile::baseline()),
            active: RwLock::new(FaultProfile::baseline()),
            chaos_level: RwLock::new(1.0),
            rng: Mutex::new(StdRng::from_entropy()),
            clock: clock::system(),
        }
    }

    /// Use a seeded random source so fault draws are reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the table `set_chaos_level` scales from. Also becomes the
    /// active table.
    pub fn with_baseline(self, baseline: FaultProfile) -> Self {
        *self.active.write() = baseline.clone();
        *self.baseline.write() = baseline;
        self
    }

    fn traffic(&self, app_name: &str) -> Arc<Mutex<AppTraffic>> {
        if let Some(t) = self.apps.read().get(app_name) {
            return Arc::clone(t);
        }
        let mut apps = self.apps.write();
        Arc::clone(apps.entry(app_name.to_string()).or_default())
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn configure(&self, app_name: &str, requests_per_min: u32, burst_limit: u32) {
        let traffic = self.traffic(app_name);
        traffic.lock().limits = Some(RateLimitProfile {
            requests_per_min,
            burst_limit,
        });
    }

    pub fn set_auth_state(&self, app_name: &str, authenticated: bool) {
        self.traffic(app_name).lock().authenticated = authenticated;
    }

    pub fn set_network_state(&self, app_name: &str, available: bool) {
        self.traffic(app_name).lock().network_available = available;
    }

    /// Rescale the baseline table by `level` (clamped to `[0, 2]`). Not
    /// cumulative: each call starts from the baseline.
    pub fn set_chaos_level(&self, level: f64) {
        let level = clamp_chaos_level(level);
        let scaled = self.baseline.read().scaled(level);
        *self.active.write() = scaled;
        *self.chaos_level.write() = level;
        tracing::debug!(level, "chaos level set");
    }

    /// Override individual entries of the active table, keeping its order.
    pub fn update_fault_profile(&self, overrides: &[(FaultKind, f64)]) {
        let mut active = self.active.write();
        for &(kind, p) in overrides {
            active.set(kind, p);
        }
    }

    pub fn fault_profile(&self) -> FaultProfile {
        self.active.read().clone()
    }

    pub fn chaos_level(&self) -> f64 {
        *self.chaos_level.read()
    }

    pub fn rate_limit(&self, app_name: &str) -> Option<RateLimitProfile> {
        self.apps.read().get(app_name).and_then(|t| t.lock().limits)
    }

    pub fn is_authenticated(&self, app_name: &str) -> bool {
        self.apps
            .read()
            .get(app_name)
            .map(|t| t.lock().authenticated)
            .unwrap_or(true)
    }

    pub fn is_network_available(&self, app_name: &str) -> bool {
        self.apps
            .read()
            .get(app_name)
            .map(|t| t.lock().network_available)
            .unwrap_or(true)
    }

    // -----------------------------------------------------------------------
    // Traffic
    // -----------------------------------------------------------------------

    pub fn record_request(&self, app_name: &str) {
        let now = self.clock.now();
        let traffic = self.traffic(app_name);
        let mut t = traffic.lock();
        t.prune(now);
        t.push(now);
    }

    /// Requests still inside the minute window.
    pub fn request_count(&self, app_name: &str) -> usize {
        let now = self.clock.now();
        self.apps
            .read()
            .get(app_name)
            .map(|t| t.lock().count_within(now, MINUTE_WINDOW_SECS))
            .unwrap_or(0)
    }

    pub fn is_rate_limited(&self, app_name: &str) -> bool {
        let now = self.clock.now();
        let traffic = self.traffic(app_name);
        let mut t = traffic.lock();
        t.prune(now);
        t.rate_limit_exceeded(now)
    }

    // -----------------------------------------------------------------------
    // Decision
    // -----------------------------------------------------------------------

    /// Return the fault this call must fail with, if any.
    pub fn decide(&self, app_name: &str, action_name: &str) -> Option<Fault> {
        let now = self.clock.now();
        let (limit, retry_after) = {
            let traffic = self.traffic(app_name);
            let mut t = traffic.lock();
            t.prune(now);

            if !t.network_available {
                return Some(Fault::template(
                    FaultKind::NetworkUnreachable,
                    app_name,
                    action_name,
                ));
            }
            if !t.authenticated {
                return Some(Fault::template(FaultKind::AuthExpired, app_name, action_name));
            }

            let limit = t.limits.map(|l| l.requests_per_min);
            let retry_after = t.retry_after(now);
            if t.rate_limit_exceeded(now) {
                return Some(Fault::rate_limited(app_name, action_name, limit, retry_after));
            }
            (limit, retry_after)
        };

        let fired = {
            let profile = self.active.read();
            let mut rng = self.rng.lock();
            profile
                .entries()
                .iter()
                .find(|&&(_, p)| rng.gen::<f64>() < p)
                .map(|&(kind, _)| kind)
        }?;

        Some(match fired {
            FaultKind::RateLimit => Fault::rate_limited(app_name, action_name, limit, retry_after),
            kind => Fault::template(kind, app_name, action_name),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn quiet_engine(clock: &ManualClock) -> ChaosEngine {
        let engine = ChaosEngine::new()
            .with_seed(7)
            .with_clock(Arc::new(clock.clone()));
        engine.set_chaos_level(0.0);
        engine
    }

    #[test]
    fn burst_limit_trips_rate_limit() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        engine.configure("TaskPad", 100, 3);

        for _ in 0..3 {
            engine.record_request("TaskPad");
        }
        let fault = engine.decide("TaskPad", "create_task").expect("rate limited");
        assert_eq!(fault.kind, FaultKind::RateLimit);
        assert_eq!(fault.retry_after, Some(60));
        assert_eq!(fault.details["limit"], 100);
    }

    #[test]
    fn under_burst_limit_is_admitted() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        engine.configure("TaskPad", 100, 3);
        engine.record_request("TaskPad");
        engine.record_request("TaskPad");
        assert!(engine.decide("TaskPad", "create_task").is_none());
    }

    #[test]
    fn minute_window_trips_without_burst() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        engine.configure("SheetForge", 4, 100);

        for _ in 0..4 {
            engine.record_request("SheetForge");
            clock.advance(Duration::seconds(11));
        }
        // 44s elapsed, all four still within the minute.
        let fault = engine.decide("SheetForge", "get_sheet").expect("rate limited");
        assert_eq!(fault.kind, FaultKind::RateLimit);
        assert_eq!(fault.retry_after, Some(16));
    }

    #[test]
    fn window_ages_out_after_a_minute() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        engine.configure("TaskPad", 100, 2);
        engine.record_request("TaskPad");
        engine.record_request("TaskPad");
        assert!(engine.decide("TaskPad", "list_tasks").is_some());

        clock.advance(Duration::seconds(61));
        engine.record_request("TaskPad");
        assert!(engine.decide("TaskPad", "list_tasks").is_none());
        assert_eq!(engine.request_count("TaskPad"), 1);
    }

    #[test]
    fn retry_after_is_floored_at_zero() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        engine.configure("TaskPad", 2, 100);
        engine.record_request("TaskPad");
        clock.advance(Duration::milliseconds(59_500));
        engine.record_request("TaskPad");
        let fault = engine.decide("TaskPad", "list_tasks").expect("rate limited");
        assert_eq!(fault.retry_after, Some(0));
    }

    #[test]
    fn unconfigured_app_is_never_rate_limited() {
        let clock = ManualClock::default();
        let engine = quiet_engine(&clock);
        for _ in 0..500 {
            engine.record_request("Unknown");
        }
        assert!(!engine.is_rate_limited("Unknown"));
        assert!(engine.decide("Unknown", "anything").is_none());
    }

    #[test]
    fn deterministic_faults_take_precedence() {
        let clock = ManualClock::default();
        let engine = ChaosEngine::new()
            .with_seed(1)
            .with_clock(Arc::new(clock.clone()))
            .with_baseline(FaultProfile::from_pairs(&[(FaultKind::ServerError, 1.0)]));
        engine.configure("MailoMailer", 1, 1);
        engine.record_request("MailoMailer");

        engine.set_network_state("MailoMailer", false);
        engine.set_auth_state("MailoMailer", false);
        let fault = engine.decide("MailoMailer", "send_email").unwrap();
        assert_eq!(fault.kind, FaultKind::NetworkUnreachable);

        engine.set_network_state("MailoMailer", true);
        let fault = engine.decide("MailoMailer", "send_email").unwrap();
        assert_eq!(fault.kind, FaultKind::AuthExpired);

        engine.set_auth_state("MailoMailer", true);
        let fault = engine.decide("MailoMailer", "send_email").unwrap();
        assert_eq!(fault.kind, FaultKind::RateLimit);

        clock.advance(Duration::seconds(61));
        let fault = engine.decide("MailoMailer", "send_email").unwrap();
        assert_eq!(fault.kind, FaultKind::ServerError);
        assert_eq!(fault.retry_after, Some(5));
    }

    #[test]
    fn first_matching_kind_wins() {
        let engine = ChaosEngine::new().with_seed(3).with_baseline(FaultProfile::from_pairs(&[
            (FaultKind::InvalidInput, 1.0),
            (FaultKind::PartialFailure, 1.0),
        ]));
        let fault = engine.decide("App", "do_thing").unwrap();
        assert_eq!(fault.kind, FaultKind::PartialFailure);
    }

    #[test]
    fn chaos_level_scales_and_caps() {
        let engine = ChaosEngine::new();
        engine.set_chaos_level(2.0);
        for &(kind, p) in engine.fault_profile().entries() {
            let expected = (kind.baseline_probability() * 2.0).min(MAX_FAULT_PROBABILITY);
            assert!((p - expected).abs() < 1e-12, "{kind}: {p}");
        }

        // Not cumulative.
        engine.set_chaos_level(2.0);
        assert!((engine.fault_profile().probability(FaultKind::InvalidInput) - 0.2).abs() < 1e-12);

        engine.set_chaos_level(0.0);
        assert!(engine.fault_profile().entries().iter().all(|&(_, p)| p == 0.0));
    }

    #[test]
    fn chaos_level_caps_at_max_probability() {
        let engine = ChaosEngine::new()
            .with_baseline(FaultProfile::from_pairs(&[(FaultKind::ServerError, 0.8)]));
        engine.set_chaos_level(2.0);
        assert_eq!(
            engine.fault_profile().probability(FaultKind::ServerError),
            MAX_FAULT_PROBABILITY
        );
    }

    #[test]
    fn chaos_level_out_of_range_is_clamped() {
        let engine = ChaosEngine::new();
        engine.set_chaos_level(7.5);
        assert_eq!(engine.chaos_level(), MAX_CHAOS_LEVEL);
        engine.set_chaos_level(-1.0);
        assert_eq!(engine.chaos_level(), 0.0);
    }

    #[test]
    fn zero_chaos_never_fires() {
        let engine = ChaosEngine::new();
        engine.set_chaos_level(0.0);
        for _ in 0..1_000 {
            assert!(engine.decide("App", "get_thing").is_none());
        }
    }

    #[test]
    fn update_fault_profile_overrides_in_place() {
        let engine = ChaosEngine::new();
        engine.update_fault_profile(&[(FaultKind::ServerError, 0.5), (FaultKind::RateLimit, 3.0)]);
        let profile = engine.fault_profile();
        assert_eq!(profile.probability(FaultKind::ServerError), 0.5);
        assert_eq!(profile.probability(FaultKind::RateLimit), 1.0);
        assert_eq!(profile.entries()[0].0, FaultKind::RateLimit);
    }

    #[test]
    fn same_seed_same_decisions() {
        let run = |seed: u64| -> Vec<Option<FaultKind>> {
            let engine = ChaosEngine::new().with_seed(seed);
            engine.set_chaos_level(2.0);
            (0..200)
                .map(|_| engine.decide("App", "get_thing").map(|f| f.kind))
                .collect()
        };
        assert_eq!(run(42), run(42));
        assert!(run(42).iter().any(Option::is_some));
    }

    #[test]
    fn toggles_default_to_healthy() {
        let engine = ChaosEngine::new();
        assert!(engine.is_authenticated("Fresh"));
        assert!(engine.is_network_available("Fresh"));
        assert!(engine.rate_limit("Fresh").is_none());
        engine.configure("Fresh", 10, 2);
        engine.configure("Fresh", 20, 4);
        assert_eq!(
            engine.rate_limit("Fresh"),
            Some(RateLimitProfile {
                requests_per_min: 20,
                burst_limit: 4
            })
        );
    }

    #[test]
    fn concurrent_record_request_loses_nothing() {
        let engine = ChaosEngine::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        engine.record_request("Busy");
                    }
                });
            }
        });
        assert_eq!(engine.request_count("Busy"), 800);
    }
}
