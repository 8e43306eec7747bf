//! The scheduler: orchestrates the store, the time calculator, and the timer
//! host. Registration with conflict resolution, the central scheduling pass,
//! snooze, completion, and ignored-alert batching all live here.
//!
//! One mutex guards the whole scheduler state. Decisions are made under the
//! lock; listener callbacks are invoked after it is released, so listeners
//! may re-enter the public API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use belltower_core::config::AlertsConfig;
use belltower_core::error::{AlertsError, ConflictReason, Result};
use chrono::{DateTime, FixedOffset};

use crate::events::{AlertEvent, EventSink};
use crate::host::{TimerEvent, TimerHandle, TimerHost};
use crate::item::{AlertItem, AlertKind, AlertSnapshot, AlertSpec};
use crate::store::AlertStore;
use crate::timecalc;

/// Scheduling callbacks delivered to the ringing lifecycle. They arrive on
/// the timer thread, outside the scheduler's state lock.
pub trait AlertsListener: Send + Sync {
    fn on_fire(&self, token: &str);
    fn on_asset_pending(&self, token: &str);
    fn on_duration_elapsed(&self, token: &str);
}

struct SchedulerState {
    store: AlertStore,
    /// Tokens whose fire instants landed inside the current coalescing
    /// window, keyed by service id.
    pending_ignored: HashMap<String, Vec<String>>,
    ignore_timer: Option<TimerHandle>,
    snooze_window_timer: Option<TimerHandle>,
    /// Alarm that rang most recently and can still be snoozed.
    recent_alarm: Option<String>,
    enabled: bool,
}

/// The alert scheduling engine.
pub struct AlertScheduler {
    state: Mutex<SchedulerState>,
    host: TimerHost,
    config: AlertsConfig,
    offset: FixedOffset,
    /// Held weakly; the lifecycle owns the scheduler, not the reverse.
    listener: RwLock<Option<Weak<dyn AlertsListener>>>,
    events: Arc<dyn EventSink>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AlertScheduler {
    /// Boot the engine: starts the timer thread and wires its expiries back
    /// into this scheduler.
    pub fn start(config: AlertsConfig, events: Arc<dyn EventSink>) -> Result<Arc<Self>> {
        let offset = timecalc::reference_offset(config.utc_offset_hours)?;
        let host = TimerHost::start()?;
        let scheduler = Arc::new(Self {
            state: Mutex::new(SchedulerState {
                store: AlertStore::new(),
                pending_ignored: HashMap::new(),
                ignore_timer: None,
                snooze_window_timer: None,
                recent_alarm: None,
                enabled: true,
            }),
            host,
            config,
            offset,
            listener: RwLock::new(None),
            events,
        });
        let weak = Arc::downgrade(&scheduler);
        scheduler.host.set_dispatch(move |event| {
            if let Some(s) = weak.upgrade() {
                s.handle_timer_event(event);
            }
        });
        Ok(scheduler)
    }

    pub fn set_listener(&self, listener: &Arc<dyn AlertsListener>) {
        let mut slot = self
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::downgrade(listener));
    }

    fn listener(&self) -> Option<Arc<dyn AlertsListener>> {
        self.listener
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Register a decoded alert directive. On success the alert is stored
    /// and a scheduling pass runs; on rejection nothing is mutated.
    pub fn register(&self, spec: AlertSpec) -> Result<String> {
        let schedule = timecalc::normalize(&spec.scheduled_time, spec.repeat.as_ref(), self.offset)?;
        let token = spec.token.clone();
        let mut st = lock(&self.state);
        if st.store.contains(&token) {
            tracing::warn!(%token, "token already registered");
            return Err(AlertsError::DuplicateToken(token));
        }
        let seq = st.store.next_seq();
        let item = AlertItem::new(spec, schedule, &self.config, seq);
        tracing::info!(
            token = %item.token(),
            kind = %item.kind.as_str(),
            time = %item.spec.scheduled_time,
            days = %item.schedule.days,
            active = item.active,
            "register alert"
        );

        let losers = Self::check_conflicts(&st.store, &item)?;
        for loser in losers {
            if let Some(existing) = st.store.get_mut(&loser) {
                tracing::info!(token = %loser, "deactivated by broader alert");
                existing.deactivate();
            }
        }
        st.store.insert(item)?;
        let arm_failures = self.reschedule_locked(&mut st, timecalc::now_in(self.offset));
        if arm_failures.contains(&token) {
            // Fatal to this registration only; other items stay deactivated
            // with the failure logged.
            st.store.remove(&token);
            return Err(AlertsError::TimerHost(format!(
                "could not arm fire timer for {token}"
            )));
        }
        Ok(token)
    }

    /// Duplicate/overlap rules between the new item and every active item of
    /// the same kind sharing its time of day and at least one weekday.
    /// Returns the tokens the new item displaces.
    fn check_conflicts(store: &AlertStore, target: &AlertItem) -> Result<Vec<String>> {
        let mut displaced = Vec::new();
        // Deactivated newcomers never conflict.
        if !target.active {
            return Ok(displaced);
        }
        for existing in store.iter_by_creation_order() {
            if !existing.active
                || existing.kind != target.kind
                || existing.schedule.time_of_day != target.schedule.time_of_day
                || !existing.schedule.days.overlaps(target.schedule.days)
            {
                continue;
            }

            if existing.repeats() {
                if !target.repeats() {
                    return Err(AlertsError::Rejected(ConflictReason::RepeatingAtSameTime));
                }
                if existing.schedule.days == target.schedule.days {
                    return Err(AlertsError::Rejected(ConflictReason::IdenticalDaySet));
                }
                if target.schedule.days.count() <= existing.schedule.days.count() {
                    return Err(AlertsError::Rejected(ConflictReason::NarrowerDaySet));
                }
                // Strictly broader day set wins.
                displaced.push(existing.token().to_string());
            } else if target.repeats() {
                // A repeating alert replaces a one-shot at the same time.
                displaced.push(existing.token().to_string());
            } else if existing.fire_epoch() == target.fire_epoch() {
                return Err(AlertsError::Rejected(ConflictReason::IdenticalInstant));
            }
        }
        Ok(displaced)
    }

    /// Remove an alert. Returns whether the token was known.
    pub fn remove(&self, token: &str) -> bool {
        let mut st = lock(&self.state);
        if st.recent_alarm.as_deref() == Some(token) {
            st.recent_alarm = None;
            if let Some(t) = st.snooze_window_timer.take() {
                t.cancel();
            }
        }
        match st.store.remove(token) {
            Some(_) => {
                tracing::info!(%token, "removed alert");
                true
            }
            None => {
                tracing::warn!(%token, "remove: unknown token");
                false
            }
        }
    }

    /// Re-arm an alert to fire after `secs`, overriding its recurrence for
    /// one cycle without altering it.
    pub fn snooze(&self, token: &str, secs: u32) -> Result<()> {
        if secs == 0 {
            return Err(AlertsError::MalformedSchedule(
                "snooze duration must be positive".into(),
            ));
        }
        let mut st = lock(&self.state);
        let Some(item) = st.store.get_mut(token) else {
            return Err(AlertsError::NotFound(token.to_string()));
        };
        tracing::info!(%token, secs, "snooze");
        item.done();
        // Eligible to fire again even if the previous cycle deactivated it;
        // the stored payload's activation flag is left as-is.
        item.active = true;
        item.snooze_secs = secs;
        self.reschedule_locked(&mut st, timecalc::now_in(self.offset));
        Ok(())
    }

    /// Drop every alert and cancel all timers.
    pub fn reset(&self) {
        let mut st = lock(&self.state);
        tracing::info!(count = st.store.len(), "reset all alerts");
        for mut item in st.store.drain() {
            item.done();
        }
        st.pending_ignored.clear();
        if let Some(t) = st.ignore_timer.take() {
            t.cancel();
        }
        if let Some(t) = st.snooze_window_timer.take() {
            t.cancel();
        }
        st.recent_alarm = None;
    }

    /// Recompute and arm timers for every active alert against the current
    /// time.
    pub fn reschedule(&self) {
        let mut st = lock(&self.state);
        self.reschedule_locked(&mut st, timecalc::now_in(self.offset));
    }

    /// Scheduling pass against a fixed reference instant.
    pub fn reschedule_at(&self, now: DateTime<FixedOffset>) {
        let mut st = lock(&self.state);
        self.reschedule_locked(&mut st, now);
    }

    /// Returns the tokens whose fire timer could not be armed; they are
    /// deactivated in place and the caller decides whether that is fatal.
    fn reschedule_locked(&self, st: &mut SchedulerState, now: DateTime<FixedOffset>) -> Vec<String> {
        tracing::debug!(base = %now, "scheduling pass");
        let tokens = st.store.tokens_by_creation_order();
        let mut prev: Option<(i64, String)> = None;
        let mut arm_failures = Vec::new();

        for token in tokens {
            let Some(item) = st.store.get_mut(&token) else {
                continue;
            };
            item.ignored = false;
            if !item.active {
                continue;
            }

            let fire_at = match item.pending_fire_at {
                // Armed by a previous pass; keep its instant for tie-breaks.
                Some(at) => at,
                None => {
                    let delay = if item.snooze_secs > 0 {
                        i64::from(item.snooze_secs)
                    } else {
                        timecalc::next_fire_after(now, &item.schedule)
                    };
                    if delay < 0 {
                        // Overdue one-shot, e.g. scheduled across a reboot.
                        // Never fire retroactively.
                        tracing::info!(%token, delay, "overdue alert, deactivating");
                        item.deactivate();
                        continue;
                    }

                    if item.asset_lead_secs > 0 {
                        let lead = (delay - i64::from(item.asset_lead_secs)).max(1) as u64;
                        match self.host.arm_once(lead, TimerEvent::Asset(token.clone())) {
                            Ok(h) => item.asset_timer = Some(h),
                            Err(e) => {
                                tracing::error!(%token, error = %e, "failed to arm asset timer")
                            }
                        }
                    }
                    match self.host.arm_once(delay as u64, TimerEvent::Fire(token.clone())) {
                        Ok(h) => item.fire_timer = Some(h),
                        Err(e) => {
                            tracing::error!(%token, error = %e, "failed to arm fire timer");
                            item.deactivate();
                            arm_failures.push(token.clone());
                            continue;
                        }
                    }
                    let at = now.timestamp() + delay;
                    item.pending_fire_at = Some(at);
                    tracing::debug!(%token, delay, fire_at = at, "armed");
                    at
                }
            };

            // Two alerts on the same instant: the earlier-created one yields.
            if let Some((prev_at, prev_token)) = &prev {
                if *prev_at == fire_at {
                    tracing::info!(token = %prev_token, "coincident fire instant, marking ignored");
                    if let Some(earlier) = st.store.get_mut(prev_token) {
                        earlier.ignored = true;
                    }
                }
            }
            prev = Some((fire_at, token));
        }
        arm_failures
    }

    /// Entry point for every expiry delivered by the timer host. Runs on the
    /// timer thread.
    fn handle_timer_event(&self, event: TimerEvent) {
        match event {
            TimerEvent::Fire(token) => self.on_fire_timeout(&token),
            TimerEvent::Asset(token) => self.on_asset_timeout(&token),
            TimerEvent::Duration(token) => self.on_duration_timeout(&token),
            TimerEvent::IgnoreFlush => self.flush_ignored(),
            TimerEvent::SnoozeWindow => self.on_snooze_window_elapsed(),
        }
    }

    fn on_fire_timeout(&self, token: &str) {
        tracing::info!(%token, "fire timeout");
        {
            let mut st = lock(&self.state);
            let Some(item) = st.store.get_mut(token) else {
                // Cancellation cannot suppress an expiry already in flight.
                tracing::warn!(%token, "fire for unknown token, dropping");
                return;
            };
            item.fire_timer = None;
            let repeats = item.repeats();
            let ignored = item.ignored;
            let is_alarm = item.kind == AlertKind::Alarm;

            if !st.enabled {
                tracing::info!(%token, "alerts disabled, completing silently");
                if !repeats {
                    if let Some(item) = st.store.get_mut(token) {
                        item.deactivate();
                    }
                }
                if is_alarm && !ignored {
                    st.recent_alarm = Some(token.to_string());
                }
                self.complete_locked(&mut st, token, false);
                return;
            }

            if ignored {
                self.queue_ignored_locked(&mut st, token);
                return;
            }

            if !repeats {
                if let Some(item) = st.store.get_mut(token) {
                    item.deactivate();
                }
            }
            if let Some(t) = st.snooze_window_timer.take() {
                t.cancel();
            }
            st.recent_alarm = if is_alarm {
                Some(token.to_string())
            } else {
                None
            };
        }
        if let Some(listener) = self.listener() {
            listener.on_fire(token);
        }
    }

    fn on_asset_timeout(&self, token: &str) {
        tracing::info!(%token, "asset lead timeout");
        {
            let mut st = lock(&self.state);
            let Some(item) = st.store.get_mut(token) else {
                return;
            };
            item.asset_timer = None;
        }
        if let Some(listener) = self.listener() {
            listener.on_asset_pending(token);
        }
    }

    fn on_duration_timeout(&self, token: &str) {
        tracing::info!(%token, "ring duration elapsed");
        {
            let mut st = lock(&self.state);
            let Some(item) = st.store.get_mut(token) else {
                return;
            };
            item.duration_timer = None;
        }
        if let Some(listener) = self.listener() {
            listener.on_duration_elapsed(token);
        }
    }

    /// Batch an ignored fire into the coalescing window, keyed by service id.
    fn queue_ignored_locked(&self, st: &mut SchedulerState, token: &str) {
        let Some(item) = st.store.get(token) else {
            return;
        };
        let ps_id = item.ps_id().to_string();
        tracing::info!(%token, %ps_id, "ignored fire, batching");
        st.pending_ignored
            .entry(ps_id)
            .or_default()
            .push(token.to_string());
        if st.ignore_timer.is_none() {
            let window = u64::from(self.config.ignore_batch_window_secs);
            match self.host.arm_once(window, TimerEvent::IgnoreFlush) {
                Ok(h) => st.ignore_timer = Some(h),
                Err(e) => tracing::error!(error = %e, "failed to arm ignore window"),
            }
        }
    }

    /// Close of the coalescing window: one batched notification per service
    /// id, then completion for every collected token.
    fn flush_ignored(&self) {
        let batches;
        {
            let mut st = lock(&self.state);
            st.ignore_timer = None;
            batches = std::mem::take(&mut st.pending_ignored);
            for (ps_id, tokens) in &batches {
                tracing::info!(%ps_id, count = tokens.len(), "flush ignored alerts");
                for token in tokens {
                    // Repeating items stay eligible and are re-armed by the
                    // pass inside completion; one-shots are done for good.
                    if let Some(item) = st.store.get_mut(token) {
                        if !item.repeats() {
                            item.deactivate();
                        }
                    }
                    self.complete_locked(&mut st, token, false);
                }
            }
        }
        for (ps_id, tokens) in batches {
            self.events.emit(AlertEvent::AlertIgnored {
                play_service_id: ps_id,
                tokens,
            });
        }
    }

    fn on_snooze_window_elapsed(&self) {
        let mut st = lock(&self.state);
        tracing::info!(alarm = ?st.recent_alarm, "snooze window elapsed");
        st.snooze_window_timer = None;
        st.recent_alarm = None;
    }

    /// Finish an alert's current cycle: clear timers and any snooze request,
    /// drop non-Alarm kinds outright, optionally open the post-ring snooze
    /// availability window, then run a scheduling pass.
    pub fn complete(&self, token: &str, start_snooze_window: bool) {
        let mut st = lock(&self.state);
        self.complete_locked(&mut st, token, start_snooze_window);
    }

    fn complete_locked(&self, st: &mut SchedulerState, token: &str, start_snooze_window: bool) {
        if let Some(t) = st.snooze_window_timer.take() {
            t.cancel();
        }
        let kind = match st.store.get_mut(token) {
            Some(item) => {
                item.done();
                Some(item.kind)
            }
            None => None,
        };
        match kind {
            Some(AlertKind::Alarm) => {
                // Only the alarm that rang most recently earns the window; a
                // superseded ring completing must not arm it for its
                // replacement.
                if start_snooze_window && st.recent_alarm.as_deref() == Some(token) {
                    let window = u64::from(self.config.snooze_availability_secs);
                    match self.host.arm_once(window, TimerEvent::SnoozeWindow) {
                        Ok(h) => {
                            tracing::info!(%token, window, "snooze availability window open");
                            st.snooze_window_timer = Some(h);
                        }
                        Err(e) => tracing::error!(error = %e, "failed to arm snooze window"),
                    }
                }
            }
            Some(_) => {
                st.recent_alarm = None;
                st.store.remove(token);
            }
            None => {}
        }
        self.reschedule_locked(st, timecalc::now_in(self.offset));
    }

    /// Arm (or re-arm) the minimum ring duration timer for a ringing alert.
    pub fn start_duration(&self, token: &str) {
        let mut st = lock(&self.state);
        let Some(item) = st.store.get_mut(token) else {
            return;
        };
        if let Some(t) = item.duration_timer.take() {
            t.cancel();
        }
        let secs = u64::from(item.duration_secs);
        match self.host.arm_once(secs, TimerEvent::Duration(token.to_string())) {
            Ok(h) => item.duration_timer = Some(h),
            Err(e) => tracing::error!(%token, error = %e, "failed to arm duration timer"),
        }
    }

    /// Alarm that rang most recently; snooze still applies to it while the
    /// availability window is open.
    pub fn recently_active_alarm(&self) -> Option<String> {
        lock(&self.state).recent_alarm.clone()
    }

    pub fn snapshot(&self, token: &str) -> Option<AlertSnapshot> {
        lock(&self.state).store.get(token).map(AlertSnapshot::of)
    }

    pub fn alert_count(&self) -> usize {
        lock(&self.state).store.len()
    }

    /// Master switch. While disabled, fires complete silently: no listener
    /// callbacks, though non-ignored alarms are still remembered as recently
    /// active.
    pub fn set_enabled(&self, enabled: bool) {
        let mut st = lock(&self.state);
        tracing::info!(enabled, "alerts enabled switch");
        st.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Context projection of registered alert payloads. With `context_only`,
    /// deactivated Timer/Sleep/Action items are skipped.
    pub fn alert_list(&self, context_only: bool) -> Vec<serde_json::Value> {
        let st = lock(&self.state);
        st.store
            .iter_by_creation_order()
            .into_iter()
            .filter(|i| !context_only || i.kind == AlertKind::Alarm || i.active)
            .filter_map(|i| serde_json::to_value(&i.spec).ok())
            .collect()
    }

    /// Trace the current alert table.
    pub fn dump(&self) {
        let st = lock(&self.state);
        tracing::info!(count = st.store.len(), "alert table");
        for item in st.store.iter_by_creation_order() {
            tracing::info!(
                token = %item.token(),
                kind = %item.kind.as_str(),
                time = %item.spec.scheduled_time,
                days = %item.schedule.days,
                active = item.active,
                ignored = item.ignored,
                pending = ?item.pending_fire_at,
                "alert"
            );
        }
    }

    /// Stop the timer host; pending expiries are dropped.
    pub fn shutdown(&self) {
        self.host.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::RepeatSpec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AlertEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: AlertEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        fn events(&self) -> Vec<AlertEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        fires: Mutex<Vec<String>>,
    }

    impl AlertsListener for RecordingListener {
        fn on_fire(&self, token: &str) {
            self.fires.lock().unwrap().push(token.to_string());
        }
        fn on_asset_pending(&self, _token: &str) {}
        fn on_duration_elapsed(&self, _token: &str) {}
    }

    fn engine() -> (Arc<AlertScheduler>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler =
            AlertScheduler::start(AlertsConfig::default(), sink.clone()).unwrap();
        (scheduler, sink)
    }

    fn weekly_spec(token: &str, time: &str, days: &[&str]) -> AlertSpec {
        let repeat = if days.is_empty() {
            RepeatSpec {
                repeat_type: "DAILY".into(),
                days_of_week: vec![],
            }
        } else {
            RepeatSpec {
                repeat_type: "WEEKLY".into(),
                days_of_week: days.iter().map(|d| d.to_string()).collect(),
            }
        };
        AlertSpec {
            token: token.into(),
            play_service_id: "ps".into(),
            alert_type: AlertKind::Alarm,
            scheduled_time: time.into(),
            repeat: Some(repeat),
            activation: true,
            alarm_resource_type: None,
            asset_required_in_milliseconds: None,
            min_duration_in_sec: None,
        }
    }

    fn once_spec(token: &str, kind: AlertKind, datetime: &str) -> AlertSpec {
        AlertSpec {
            token: token.into(),
            play_service_id: "ps".into(),
            alert_type: kind,
            scheduled_time: datetime.into(),
            repeat: None,
            activation: true,
            alarm_resource_type: None,
            asset_required_in_milliseconds: None,
            min_duration_in_sec: None,
        }
    }

    const WEEKDAY_LIST: &[&str] = &["MON", "TUE", "WED", "THU", "FRI"];
    const WEEKEND_LIST: &[&str] = &["SAT", "SUN"];

    #[test]
    fn weekday_and_weekend_coexist_both_orders() {
        let (s, _) = engine();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        s.register(weekly_spec("we", "13:00:00", WEEKEND_LIST)).unwrap();
        assert!(s.snapshot("wd").unwrap().active);
        assert!(s.snapshot("we").unwrap().active);

        let (s, _) = engine();
        s.register(weekly_spec("we", "13:00:00", WEEKEND_LIST)).unwrap();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        assert!(s.snapshot("we").unwrap().active);
        assert!(s.snapshot("wd").unwrap().active);
    }

    #[test]
    fn narrower_overlapping_set_is_rejected() {
        let (s, _) = engine();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        let err = s.register(weekly_spec("fri", "13:00:00", &["FRI"])).unwrap_err();
        assert!(matches!(
            err,
            AlertsError::Rejected(ConflictReason::NarrowerDaySet)
        ));
        assert_eq!(s.alert_count(), 1);
    }

    #[test]
    fn broader_set_deactivates_narrower_existing() {
        let (s, _) = engine();
        s.register(weekly_spec("fri", "13:00:00", &["FRI"])).unwrap();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        assert!(!s.snapshot("fri").unwrap().active);
        assert!(s.snapshot("wd").unwrap().active);
    }

    #[test]
    fn everyday_beats_weekday_but_not_the_reverse() {
        let (s, _) = engine();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        s.register(weekly_spec("all", "13:00:00", &[])).unwrap();
        assert!(!s.snapshot("wd").unwrap().active);
        assert!(s.snapshot("all").unwrap().active);

        let (s, _) = engine();
        s.register(weekly_spec("all", "13:00:00", &[])).unwrap();
        assert!(s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).is_err());
    }

    #[test]
    fn identical_day_set_is_rejected() {
        let (s, _) = engine();
        s.register(weekly_spec("a", "06:30:00", &[])).unwrap();
        let err = s.register(weekly_spec("b", "06:30:00", &[])).unwrap_err();
        assert!(matches!(
            err,
            AlertsError::Rejected(ConflictReason::IdenticalDaySet)
        ));
    }

    #[test]
    fn repeating_displaces_one_shot_but_not_the_reverse() {
        let (s, _) = engine();
        s.register(once_spec("once", AlertKind::Alarm, "2031-01-01T13:00:00")).unwrap();
        s.register(weekly_spec("all", "13:00:00", &[])).unwrap();
        assert!(!s.snapshot("once").unwrap().active);
        assert!(s.snapshot("all").unwrap().active);

        let (s, _) = engine();
        s.register(weekly_spec("all", "13:00:00", &[])).unwrap();
        let err = s
            .register(once_spec("once", AlertKind::Alarm, "2031-01-01T13:00:00"))
            .unwrap_err();
        assert!(matches!(
            err,
            AlertsError::Rejected(ConflictReason::RepeatingAtSameTime)
        ));
    }

    #[test]
    fn identical_one_shot_instant_is_rejected() {
        let (s, _) = engine();
        s.register(once_spec("a", AlertKind::Alarm, "2031-01-01T13:00:00")).unwrap();
        let err = s
            .register(once_spec("b", AlertKind::Alarm, "2031-01-01T13:00:00"))
            .unwrap_err();
        assert!(matches!(
            err,
            AlertsError::Rejected(ConflictReason::IdenticalInstant)
        ));
    }

    #[test]
    fn different_kinds_never_conflict() {
        let (s, _) = engine();
        let mut action = weekly_spec("act", "13:00:00", &[]);
        action.alert_type = AlertKind::Action;
        s.register(weekly_spec("alarm", "13:00:00", &[])).unwrap();
        s.register(action).unwrap();
        assert!(s.snapshot("alarm").unwrap().active);
        assert!(s.snapshot("act").unwrap().active);
    }

    #[test]
    fn deactivated_newcomer_skips_conflict_resolution() {
        let (s, _) = engine();
        s.register(weekly_spec("wd", "13:00:00", WEEKDAY_LIST)).unwrap();
        let mut off = weekly_spec("fri", "13:00:00", &["FRI"]);
        off.activation = false;
        s.register(off).unwrap();
        assert!(s.snapshot("wd").unwrap().active);
        assert!(!s.snapshot("fri").unwrap().active);
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let (s, _) = engine();
        s.register(weekly_spec("tok", "06:00:00", &[])).unwrap();
        let err = s.register(weekly_spec("tok", "07:00:00", &[])).unwrap_err();
        assert!(matches!(err, AlertsError::DuplicateToken(_)));
    }

    #[test]
    fn overdue_one_shot_is_deactivated_not_fired() {
        let (s, _) = engine();
        s.register(once_spec("old", AlertKind::Alarm, "2021-04-30T15:07:05")).unwrap();
        let snap = s.snapshot("old").unwrap();
        assert!(!snap.active);
        assert!(snap.pending_fire_at.is_none());
    }

    #[test]
    fn coincident_instants_yield_to_latest_created() {
        let (s, sink) = engine();
        let listener = Arc::new(RecordingListener::default());
        let as_listener: Arc<dyn AlertsListener> = listener.clone();
        s.set_listener(&as_listener);

        s.register(once_spec("t1", AlertKind::Timer, "2031-01-01T13:00:00")).unwrap();
        s.register(once_spec("t2", AlertKind::Action, "2031-01-01T13:00:00")).unwrap();
        s.register(once_spec("t3", AlertKind::Alarm, "2031-01-01T13:00:00")).unwrap();

        assert!(s.snapshot("t1").unwrap().ignored);
        assert!(s.snapshot("t2").unwrap().ignored);
        assert!(!s.snapshot("t3").unwrap().ignored);

        // Simulate the three coincident expiries in creation order.
        s.on_fire_timeout("t1");
        s.on_fire_timeout("t2");
        s.on_fire_timeout("t3");
        assert_eq!(*listener.fires.lock().unwrap(), vec!["t3"]);

        s.flush_ignored();
        let events = sink.events();
        assert_eq!(
            events,
            vec![AlertEvent::AlertIgnored {
                play_service_id: "ps".into(),
                tokens: vec!["t1".into(), "t2".into()],
            }]
        );
        // Non-alarm ignored items are gone for good.
        assert!(s.snapshot("t1").is_none());
        assert!(s.snapshot("t2").is_none());
        assert!(s.snapshot("t3").is_some());
    }

    #[test]
    fn snooze_overrides_delay_without_touching_recurrence() {
        let (s, _) = engine();
        s.register(weekly_spec("a", "13:00:00", WEEKDAY_LIST)).unwrap();
        let before = s.snapshot("a").unwrap();
        s.snooze("a", 300).unwrap();
        let after = s.snapshot("a").unwrap();
        assert_eq!(after.schedule, before.schedule);
        assert!(after.active);

        let now = timecalc::now_in(timecalc::reference_offset(9).unwrap()).timestamp();
        let pending = after.pending_fire_at.unwrap();
        assert!((pending - now - 300).abs() <= 5, "pending {pending} vs now {now}");

        assert!(matches!(s.snooze("nope", 60), Err(AlertsError::NotFound(_))));
        assert!(matches!(
            s.snooze("a", 0),
            Err(AlertsError::MalformedSchedule(_))
        ));
    }

    #[test]
    fn fire_tracks_recently_active_alarm_and_snooze_window() {
        let (s, _) = engine();
        let listener = Arc::new(RecordingListener::default());
        let as_listener: Arc<dyn AlertsListener> = listener.clone();
        s.set_listener(&as_listener);

        s.register(weekly_spec("a", "13:00:00", &[])).unwrap();
        s.on_fire_timeout("a");
        assert_eq!(*listener.fires.lock().unwrap(), vec!["a"]);
        assert_eq!(s.recently_active_alarm().as_deref(), Some("a"));

        s.complete("a", true);
        assert!(lock(&s.state).snooze_window_timer.is_some());
        // Repeating alarm was re-armed by the completion pass.
        assert!(s.snapshot("a").unwrap().pending_fire_at.is_some());

        s.on_snooze_window_elapsed();
        assert!(s.recently_active_alarm().is_none());
    }

    #[test]
    fn superseded_ring_completion_leaves_the_window_to_the_new_alarm() {
        let (s, _) = engine();
        s.register(weekly_spec("a", "13:00:00", &[])).unwrap();
        s.register(weekly_spec("b", "14:00:00", &[])).unwrap();

        s.on_fire_timeout("a");
        s.on_fire_timeout("b");
        assert_eq!(s.recently_active_alarm().as_deref(), Some("b"));

        // The superseded ring for `a` completes while `b` is ringing; no
        // availability window may open for it.
        s.complete("a", true);
        assert!(lock(&s.state).snooze_window_timer.is_none());
        assert_eq!(s.recently_active_alarm().as_deref(), Some("b"));

        // When `b` is stopped it still earns its own window.
        s.complete("b", true);
        assert!(lock(&s.state).snooze_window_timer.is_some());
        assert_eq!(s.recently_active_alarm().as_deref(), Some("b"));
    }

    #[test]
    fn register_fails_when_timer_host_is_stopped() {
        let (s, _) = engine();
        s.register(weekly_spec("a", "13:00:00", &[])).unwrap();
        s.shutdown();
        let err = s.register(weekly_spec("b", "14:00:00", &[])).unwrap_err();
        assert!(matches!(err, AlertsError::TimerHost(_)));
        // The failed registration leaves no trace behind.
        assert!(s.snapshot("b").is_none());
        assert_eq!(s.alert_count(), 1);
    }

    #[test]
    fn completing_non_alarm_removes_it() {
        let (s, _) = engine();
        let listener = Arc::new(RecordingListener::default());
        let as_listener: Arc<dyn AlertsListener> = listener.clone();
        s.set_listener(&as_listener);

        s.register(once_spec("t", AlertKind::Timer, "2031-06-01T08:00:00")).unwrap();
        s.on_fire_timeout("t");
        assert_eq!(*listener.fires.lock().unwrap(), vec!["t"]);
        s.complete("t", false);
        assert_eq!(s.alert_count(), 0);
    }

    #[test]
    fn disabled_engine_completes_fires_silently() {
        let (s, _) = engine();
        let listener = Arc::new(RecordingListener::default());
        let as_listener: Arc<dyn AlertsListener> = listener.clone();
        s.set_listener(&as_listener);

        s.set_enabled(false);
        assert!(!s.is_enabled());
        s.register(weekly_spec("a", "13:00:00", &[])).unwrap();
        s.on_fire_timeout("a");
        assert!(listener.fires.lock().unwrap().is_empty());
        assert_eq!(s.recently_active_alarm().as_deref(), Some("a"));
        // Still registered and re-armed for the next occurrence.
        assert!(s.snapshot("a").unwrap().pending_fire_at.is_some());
    }

    #[test]
    fn remove_and_reset() {
        let (s, _) = engine();
        s.register(weekly_spec("a", "13:00:00", &[])).unwrap();
        s.register(weekly_spec("b", "14:00:00", &[])).unwrap();
        assert!(s.remove("a"));
        assert!(!s.remove("a"));
        assert_eq!(s.alert_count(), 1);
        s.reset();
        assert_eq!(s.alert_count(), 0);
        assert!(s.recently_active_alarm().is_none());
    }

    #[test]
    fn alert_list_skips_deactivated_non_alarms_in_context() {
        let (s, _) = engine();
        s.register(weekly_spec("alarm", "13:00:00", &[])).unwrap();
        s.register(once_spec("timer", AlertKind::Timer, "2021-01-01T08:00:00")).unwrap();
        // The overdue timer is deactivated at registration time.
        assert_eq!(s.alert_list(false).len(), 2);
        let ctx = s.alert_list(true);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0]["token"], "alarm");
        s.dump();
    }
}
