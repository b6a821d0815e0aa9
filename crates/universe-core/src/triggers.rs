//! Polling, webhook and scheduled triggers.
//!
//! Polling and scheduled triggers become due once `frequency` has elapsed
//! since they last fired (immediately if they never have); `tick` fires
//! everything due. Webhook triggers fire only through `fire_webhook`.
//! Callbacks run with no lock held, and their failures are logged.

use crate::clock::{self, Clock};
use crate::state::ListenerError;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_FREQUENCY_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Polling,
    Webhook,
    Scheduled,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Polling => "polling",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Scheduled => "scheduled",
        }
    }

    fn is_timed(self) -> bool {
        matches!(self, TriggerKind::Polling | TriggerKind::Scheduled)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What a callback receives when its trigger fires.
#[derive(Debug, Clone)]
pub struct TriggerFire {
    pub trigger_id: String,
    pub app: String,
    pub kind: TriggerKind,
    /// Webhook body; `None` for timed triggers.
    pub payload: Option<Value>,
    pub fired_at: DateTime<Utc>,
}

pub type TriggerCallback =
    Arc<dyn Fn(&TriggerFire) -> std::result::Result<Value, ListenerError> + Send + Sync>;

struct Trigger {
    id: String,
    app: String,
    kind: TriggerKind,
    frequency: Duration,
    enabled: bool,
    last_fired: Option<DateTime<Utc>>,
    fire_count: u64,
    callback: TriggerCallback,
}

impl Trigger {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.kind.is_timed()
            && self
                .last_fired
                .map_or(true, |last| now - last >= self.frequency)
    }

    fn mark_fired(&mut self, now: DateTime<Utc>, payload: Option<Value>) -> (TriggerFire, TriggerCallback) {
        self.last_fired = Some(now);
        self.fire_count += 1;
        let fire = TriggerFire {
            trigger_id: self.id.clone(),
            app: self.app.clone(),
            kind: self.kind,
            payload,
            fired_at: now,
        };
        (fire, Arc::clone(&self.callback))
    }

    fn info(&self) -> TriggerInfo {
        TriggerInfo {
            id: self.id.clone(),
            app: self.app.clone(),
            kind: self.kind,
            frequency_secs: self.frequency.num_seconds().max(0) as u64,
            enabled: self.enabled,
            last_fired: self.last_fired,
            fire_count: self.fire_count,
            endpoint: webhook_path(self),
        }
    }
}

fn webhook_path(trigger: &Trigger) -> Option<String> {
    (trigger.kind == TriggerKind::Webhook)
        .then(|| format!("/webhook/{}/{}", trigger.app, trigger.id))
}

/// Read-only view of a registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub id: String,
    pub app: String,
    pub kind: TriggerKind,
    pub frequency_secs: u64,
    pub enabled: bool,
    pub last_fired: Option<DateTime<Utc>>,
    pub fire_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

// ---------------------------------------------------------------------------
// TriggerSystem
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TriggerTable {
    /// Registration order.
    triggers: Vec<Trigger>,
    next_seq: u64,
}

impl TriggerTable {
    fn get_mut(&mut self, id: &str) -> Option<&mut Trigger> {
        self.triggers.iter_mut().find(|t| t.id == id)
    }
}

pub struct TriggerSystem {
    table: Mutex<TriggerTable>,
    clock: Arc<dyn Clock>,
}

impl Default for TriggerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerSystem {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(TriggerTable::default()),
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the new trigger's id, `"{app}_{kind}_{n}"`. `n` never repeats
    /// within one system, even after unregistering.
    pub fn register<F>(
        &self,
        app_name: &str,
        kind: TriggerKind,
        frequency_secs: Option<u64>,
        callback: F,
    ) -> String
    where
        F: Fn(&TriggerFire) -> std::result::Result<Value, ListenerError> + Send + Sync + 'static,
    {
        let secs = frequency_secs.unwrap_or(DEFAULT_FREQUENCY_SECS);
        let mut table = self.table.lock();
        let id = format!("{app_name}_{kind}_{}", table.next_seq);
        table.next_seq += 1;
        table.triggers.push(Trigger {
            id: id.clone(),
            app: app_name.to_string(),
            kind,
            frequency: Duration::seconds(secs.min(u32::MAX as u64) as i64),
            enabled: true,
            last_fired: None,
            fire_count: 0,
            callback: Arc::new(callback),
        });
        tracing::debug!(trigger = %id, app = app_name, %kind, "registered trigger");
        id
    }

    pub fn unregister(&self, trigger_id: &str) -> bool {
        let mut table = self.table.lock();
        let before = table.triggers.len();
        table.triggers.retain(|t| t.id != trigger_id);
        table.triggers.len() != before
    }

    pub fn enable(&self, trigger_id: &str) -> bool {
        self.set_enabled(trigger_id, true)
    }

    pub fn disable(&self, trigger_id: &str) -> bool {
        self.set_enabled(trigger_id, false)
    }

    fn set_enabled(&self, trigger_id: &str, enabled: bool) -> bool {
        match self.table.lock().get_mut(trigger_id) {
            Some(t) => {
                t.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn webhook_endpoint(&self, trigger_id: &str) -> Option<String> {
        let table = self.table.lock();
        table
            .triggers
            .iter()
            .find(|t| t.id == trigger_id)
            .and_then(webhook_path)
    }

    pub fn app_triggers(&self, app_name: &str) -> Vec<TriggerInfo> {
        self.table
            .lock()
            .triggers
            .iter()
            .filter(|t| t.app == app_name)
            .map(Trigger::info)
            .collect()
    }

    /// Fire an enabled webhook trigger with `payload`. `None` when the id is
    /// unknown, not a webhook, disabled, or the callback failed.
    pub fn fire_webhook(&self, trigger_id: &str, payload: Value) -> Option<Value> {
        let now = self.clock.now();
        let (fire, callback) = {
            let mut table = self.table.lock();
            let trigger = table.get_mut(trigger_id)?;
            if trigger.kind != TriggerKind::Webhook || !trigger.enabled {
                return None;
            }
            trigger.mark_fired(now, Some(payload))
        };
        invoke(&fire, &callback)
    }

    /// Fire every enabled polling or scheduled trigger that is due at `now`.
    /// Returns the ids fired, in registration order.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<String> {
        let due: Vec<(TriggerFire, TriggerCallback)> = {
            let mut table = self.table.lock();
            table
                .triggers
                .iter_mut()
                .filter(|t| t.is_due(now))
                .map(|t| t.mark_fired(now, None))
                .collect()
        };

        due.iter()
            .map(|(fire, callback)| {
                invoke(fire, callback);
                fire.trigger_id.clone()
            })
            .collect()
    }

    /// Call `tick` every `period` until `shutdown` completes.
    pub async fn run<S>(&self, period: std::time::Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick(self.clock.now());
                }
            }
        }
        tracing::debug!("trigger loop stopped");
    }
}

fn invoke(fire: &TriggerFire, callback: &TriggerCallback) -> Option<Value> {
    match catch_unwind(AssertUnwindSafe(|| callback(fire))) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(trigger = %fire.trigger_id, app = %fire.app, error = %e, "trigger callback failed");
            None
        }
        Err(_) => {
            tracing::warn!(trigger = %fire.trigger_id, app = %fire.app, "trigger callback panicked");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&TriggerFire) -> std::result::Result<Value, ListenerError> + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &TriggerFire| -> std::result::Result<Value, ListenerError> {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
    }

    #[test]
    fn ids_follow_app_kind_sequence() {
        let system = TriggerSystem::new();
        let a = system.register("TaskPad", TriggerKind::Polling, None, |_| Ok(Value::Null));
        let b = system.register("TaskPad", TriggerKind::Webhook, None, |_| Ok(Value::Null));
        assert_eq!(a, "TaskPad_polling_0");
        assert_eq!(b, "TaskPad_webhook_1");

        assert!(system.unregister(&a));
        let c = system.register("TaskPad", TriggerKind::Scheduled, Some(5), |_| Ok(Value::Null));
        assert_eq!(c, "TaskPad_scheduled_2");
        assert!(!system.unregister(&a));
    }

    #[test]
    fn polling_fires_when_frequency_elapses() {
        let clock = ManualClock::default();
        let system = TriggerSystem::new().with_clock(Arc::new(clock.clone()));
        let (count, cb) = counter();
        let id = system.register("MailoMailer", TriggerKind::Polling, Some(30), cb);

        assert_eq!(system.tick(clock.now()), vec![id.clone()]);
        assert!(system.tick(clock.now()).is_empty());

        clock.advance(Duration::seconds(29));
        assert!(system.tick(clock.now()).is_empty());
        clock.advance(Duration::seconds(1));
        assert_eq!(system.tick(clock.now()).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let info = &system.app_triggers("MailoMailer")[0];
        assert_eq!(info.fire_count, 2);
        assert_eq!(info.last_fired, Some(clock.now()));
        assert!(info.endpoint.is_none());
    }

    #[test]
    fn disabled_triggers_do_not_fire() {
        let clock = ManualClock::default();
        let system = TriggerSystem::new().with_clock(Arc::new(clock.clone()));
        let (count, cb) = counter();
        let id = system.register("TaskPad", TriggerKind::Scheduled, Some(1), cb);

        assert!(system.disable(&id));
        assert!(system.tick(clock.now()).is_empty());
        assert!(system.enable(&id));
        assert_eq!(system.tick(clock.now()).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!system.enable("nope"));
    }

    #[test]
    fn webhooks_fire_only_on_demand() {
        let system = TriggerSystem::new();
        let id = system.register("AutoBooker Calendar", TriggerKind::Webhook, None, |fire| {
            Ok(json!({ "echo": fire.payload.clone() }))
        });
        assert_eq!(
            system.webhook_endpoint(&id).unwrap(),
            format!("/webhook/AutoBooker Calendar/{id}")
        );
        assert!(system.tick(Utc::now()).is_empty());

        let out = system.fire_webhook(&id, json!({ "event": "booked" })).unwrap();
        assert_eq!(out["echo"]["event"], "booked");

        system.disable(&id);
        assert!(system.fire_webhook(&id, json!({})).is_none());
    }

    #[test]
    fn fire_webhook_ignores_timed_triggers() {
        let system = TriggerSystem::new();
        let id = system.register("TaskPad", TriggerKind::Polling, None, |_| Ok(json!(1)));
        assert!(system.fire_webhook(&id, json!({})).is_none());
        assert!(system.webhook_endpoint(&id).is_none());
        assert!(system.fire_webhook("missing", json!({})).is_none());
    }

    #[test]
    fn callback_failures_are_contained() {
        let clock = ManualClock::default();
        let system = TriggerSystem::new().with_clock(Arc::new(clock.clone()));
        system.register("TaskPad", TriggerKind::Polling, None, |_| Err("upstream down".into()));
        system.register("TaskPad", TriggerKind::Polling, None, |_| panic!("bad callback"));
        let (count, cb) = counter();
        system.register("TaskPad", TriggerKind::Polling, None, cb);

        assert_eq!(system.tick(clock.now()).len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_register_more_triggers() {
        let system = Arc::new(TriggerSystem::new());
        let inner = Arc::clone(&system);
        system.register("TaskPad", TriggerKind::Polling, None, move |_| {
            inner.register("TaskPad", TriggerKind::Webhook, None, |_| Ok(Value::Null));
            Ok(Value::Null)
        });
        system.tick(Utc::now());
        assert_eq!(system.app_triggers("TaskPad").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_stops_on_shutdown() {
        let system = Arc::new(TriggerSystem::new());
        let (count, cb) = counter();
        system.register("TaskPad", TriggerKind::Polling, Some(0), cb);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let looped = Arc::clone(&system);
        let handle = tokio::spawn(async move {
            looped
                .run(std::time::Duration::from_secs(1), async move {
                    let _ = rx.await;
                })
                .await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
