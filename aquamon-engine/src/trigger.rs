//! Hardware auto-trigger control.
//!
//! Each (pond, actuator) pair owns one small state machine:
//!
//!   Idle -> Armed(n) -> Active -> Cooldown -> Idle
//!
//! A rule must violate on `confirmations` consecutive evaluations
//! before the actuator fires; a single in-range reading disarms it.
//! While Active or in Cooldown no rule for that actuator can fire
//! again. When several rules target one actuator, the highest-priority
//! violating rule drives the machine, and a takeover restarts the
//! confirmation count.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use aquamon_core::{
    ActuatorId, EventId, PondId, SensorSnapshot, TriggerEvent, TriggerRule,
};
use jiff::Timestamp;
use tracing::{info, warn};
use ulid::Ulid;

use crate::error::{ConfigError, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Armed { count: u32 },
    Active { shutoff_at: Timestamp },
    Cooldown { until: Timestamp },
}

#[derive(Debug, Clone)]
struct ActuatorState {
    phase: Phase,
    /// Index into `rules` of the rule currently driving the machine.
    armed_rule: Option<usize>,
}

impl Default for ActuatorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            armed_rule: None,
        }
    }
}

pub struct TriggerController {
    rules: Box<[TriggerRule]>,
    /// Rule indices per actuator, highest priority first.
    by_actuator: HashMap<ActuatorId, Vec<usize>>,
    states: Mutex<HashMap<(PondId, ActuatorId), ActuatorState>>,
}

impl TriggerController {
    pub fn new(rules: Vec<TriggerRule>) -> Result<Self, ConfigError> {
        for rule in &rules {
            if rule.confirmations == 0 {
                return Err(ConfigError::InvalidTriggerRule {
                    actuator: rule.actuator.0.clone(),
                    reason: "confirmations must be at least 1".into(),
                });
            }
            if rule.cooldown.is_negative() || rule.auto_shutoff.is_negative() {
                return Err(ConfigError::InvalidTriggerRule {
                    actuator: rule.actuator.0.clone(),
                    reason: "cooldown and auto_shutoff must be non-negative".into(),
                });
            }
        }

        let mut by_actuator: HashMap<ActuatorId, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            by_actuator
                .entry(rule.actuator.clone())
                .or_default()
                .push(index);
        }
        for indices in by_actuator.values_mut() {
            indices.sort_by(|&a, &b| rules[b].priority.cmp(&rules[a].priority));
        }

        Ok(Self {
            rules: rules.into_boxed_slice(),
            by_actuator,
            states: Mutex::new(HashMap::new()),
        })
    }

    /// Step every actuator's machine against one snapshot. Returns the
    /// events fired by this step; an empty snapshot of relevant
    /// parameters simply disarms.
    pub fn evaluate(
        &self,
        snapshot: &SensorSnapshot,
        now: Timestamp,
    ) -> Result<Vec<TriggerEvent>, EngineError> {
        let mut states = self.lock_states()?;

        let mut events = Vec::new();

        for (actuator, indices) in &self.by_actuator {
            let key = (snapshot.pond_id.clone(), actuator.clone());
            let state = states.entry(key).or_default();

            let armed = state.armed_rule.map(|i| &self.rules[i]);
            advance_timers(state, armed, now);

            match state.phase {
                Phase::Active { .. } | Phase::Cooldown { .. } => continue,
                Phase::Idle | Phase::Armed { .. } => {}
            }

            // Highest-priority rule whose parameter is present and
            // violating wins this step.
            let violating = indices.iter().copied().find(|&i| {
                let rule = &self.rules[i];
                snapshot
                    .value(&rule.parameter)
                    .is_some_and(|v| rule.violates(v))
            });

            let Some(rule_index) = violating else {
                state.phase = Phase::Idle;
                state.armed_rule = None;
                continue;
            };

            let count = match (state.phase, state.armed_rule) {
                (Phase::Armed { count }, Some(armed)) if armed == rule_index => count + 1,
                _ => 1,
            };
            state.armed_rule = Some(rule_index);

            let rule = &self.rules[rule_index];
            if count >= rule.confirmations {
                let shutoff_at = now + rule.auto_shutoff;
                state.phase = Phase::Active { shutoff_at };

                let event = TriggerEvent {
                    id: EventId(Ulid::new()),
                    pond_id: snapshot.pond_id.clone(),
                    actuator: rule.actuator.clone(),
                    priority: rule.priority,
                    reason: trigger_reason(rule, snapshot),
                    fired_at: now,
                };
                info!(
                    pond = %event.pond_id.0,
                    actuator = %event.actuator.0,
                    priority = ?event.priority,
                    reason = %event.reason,
                    "trigger fired",
                );
                events.push(event);
            } else {
                state.phase = Phase::Armed { count };
            }
        }

        Ok(events)
    }

    /// Acknowledge that the condition cleared and the actuator was shut
    /// off manually. Active moves straight to Cooldown from `now`.
    pub fn resolve(
        &self,
        pond: &PondId,
        actuator: &ActuatorId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut states = self.lock_states()?;

        if let Some(state) = states.get_mut(&(pond.clone(), actuator.clone()))
            && let Phase::Active { .. } = state.phase
        {
            let cooldown = self
                .rule_for(state)
                .map(|r| r.cooldown)
                .unwrap_or_default();
            state.phase = Phase::Cooldown { until: now + cooldown };
        }
        Ok(())
    }

    /// Current phase, for the status surface and tests.
    pub fn phase_of(
        &self,
        pond: &PondId,
        actuator: &ActuatorId,
    ) -> Result<Phase, EngineError> {
        let states = self.lock_states()?;
        Ok(states
            .get(&(pond.clone(), actuator.clone()))
            .map(|s| s.phase)
            .unwrap_or(Phase::Idle))
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    fn rule_for(&self, state: &ActuatorState) -> Option<&TriggerRule> {
        state.armed_rule.map(|i| &self.rules[i])
    }

    /// Every mutation of the map happens under the guard in one piece,
    /// so a poisoned lock never holds a half-written entry. Clear the
    /// poison and retry once; a repeat failure surfaces to the caller.
    fn lock_states(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<(PondId, ActuatorId), ActuatorState>>, EngineError> {
        if let Ok(guard) = self.states.lock() {
            return Ok(guard);
        }
        warn!("trigger state lock poisoned; clearing and retrying");
        self.states.clear_poison();
        self.states
            .lock()
            .map_err(|_| EngineError::TriggerStateConflict)
    }
}

/// Time-based transitions happen before the reading is considered, so a
/// shutoff deadline in the past is honored even if no evaluation ran at
/// that exact moment.
fn advance_timers(state: &mut ActuatorState, rule: Option<&TriggerRule>, now: Timestamp) {
    if let Phase::Active { shutoff_at } = state.phase
        && now >= shutoff_at
    {
        let cooldown = rule.map(|r| r.cooldown).unwrap_or_default();
        state.phase = Phase::Cooldown {
            until: shutoff_at + cooldown,
        };
    }
    if let Phase::Cooldown { until } = state.phase
        && now >= until
    {
        state.phase = Phase::Idle;
        state.armed_rule = None;
    }
}

fn trigger_reason(rule: &TriggerRule, snapshot: &SensorSnapshot) -> Box<str> {
    let observed = snapshot
        .value(&rule.parameter)
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "?".into());
    let relation = match rule.kind {
        aquamon_core::ThresholdKind::Below => "below",
        aquamon_core::ThresholdKind::Above => "above",
    };
    format!(
        "{} {} {} threshold {:.2} for {} consecutive readings",
        rule.parameter,
        observed,
        relation,
        rule.threshold.into_inner(),
        rule.confirmations,
    )
    .into()
}

#[cfg(test)]
mod tests {
    use aquamon_core::{ThresholdKind, TriggerPriority};
    use jiff::SignedDuration;
    use ordered_float::NotNan;

    use super::*;

    fn aerator_rule() -> TriggerRule {
        TriggerRule {
            actuator: ActuatorId("aerator-1".into()),
            parameter: "DO".into(),
            kind: ThresholdKind::Below,
            threshold: NotNan::new(4.0).unwrap(),
            confirmations: 3,
            cooldown: SignedDuration::from_mins(30),
            auto_shutoff: SignedDuration::from_hours(2),
            priority: TriggerPriority::High,
        }
    }

    fn snapshot(do_value: f64, ts: Timestamp) -> SensorSnapshot {
        SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: ts,
            values: [("DO".into(), NotNan::new(do_value).unwrap())]
                .into_iter()
                .collect(),
        }
    }

    fn minute(n: i64) -> Timestamp {
        Timestamp::UNIX_EPOCH + SignedDuration::from_mins(n)
    }

    #[test]
    fn fires_once_after_required_confirmations() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        for step in 0..2 {
            let events = controller
                .evaluate(&snapshot(3.5, minute(step)), minute(step))
                .unwrap();
            assert!(events.is_empty(), "fired early at step {step}");
        }
        assert_eq!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Armed { count: 2 },
        );

        let events = controller
            .evaluate(&snapshot(3.5, minute(2)), minute(2))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actuator, actuator);
        assert_eq!(events[0].priority, TriggerPriority::High);

        // Still violating: Active suppresses further fires.
        let events = controller
            .evaluate(&snapshot(3.2, minute(3)), minute(3))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn one_in_range_reading_disarms() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        controller.evaluate(&snapshot(3.5, minute(0)), minute(0)).unwrap();
        controller.evaluate(&snapshot(3.5, minute(1)), minute(1)).unwrap();
        controller.evaluate(&snapshot(4.5, minute(2)), minute(2)).unwrap();
        assert_eq!(controller.phase_of(&pond, &actuator).unwrap(), Phase::Idle);

        // The count restarted, so two more violations do not fire.
        controller.evaluate(&snapshot(3.5, minute(3)), minute(3)).unwrap();
        let events = controller
            .evaluate(&snapshot(3.5, minute(4)), minute(4))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn auto_shutoff_enters_cooldown_then_idle() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        for step in 0..3 {
            controller
                .evaluate(&snapshot(3.5, minute(step)), minute(step))
                .unwrap();
        }
        assert!(matches!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Active { .. },
        ));

        // Past the 2h shutoff: Cooldown, still suppressed.
        let t = minute(121);
        let events = controller.evaluate(&snapshot(3.5, t), t).unwrap();
        assert!(events.is_empty());
        assert!(matches!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Cooldown { .. },
        ));

        // Past shutoff + 30m cooldown: Idle again, confirmations start over.
        let t = minute(121 + 35);
        let events = controller.evaluate(&snapshot(3.5, t), t).unwrap();
        assert!(events.is_empty(), "first violation after cooldown only arms");
        assert_eq!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Armed { count: 1 },
        );
    }

    #[test]
    fn resolve_moves_active_to_cooldown() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        for step in 0..3 {
            controller
                .evaluate(&snapshot(3.5, minute(step)), minute(step))
                .unwrap();
        }
        controller.resolve(&pond, &actuator, minute(10)).unwrap();
        assert_eq!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Cooldown { until: minute(40) },
        );
    }

    #[test]
    fn higher_priority_rule_takes_over_and_resets_count() {
        let warning = TriggerRule {
            threshold: NotNan::new(4.5).unwrap(),
            confirmations: 2,
            priority: TriggerPriority::Medium,
            ..aerator_rule()
        };
        let emergency = TriggerRule {
            threshold: NotNan::new(3.0).unwrap(),
            confirmations: 2,
            priority: TriggerPriority::Critical,
            ..aerator_rule()
        };
        let controller = TriggerController::new(vec![warning, emergency]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        // One medium violation arms, then the reading crosses the
        // emergency threshold: the critical rule takes over at count 1.
        controller.evaluate(&snapshot(4.2, minute(0)), minute(0)).unwrap();
        let events = controller
            .evaluate(&snapshot(2.8, minute(1)), minute(1))
            .unwrap();
        assert!(events.is_empty(), "takeover restarts the confirmation count");
        assert_eq!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Armed { count: 1 },
        );

        let events = controller
            .evaluate(&snapshot(2.7, minute(2)), minute(2))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].priority, TriggerPriority::Critical);
    }

    #[test]
    fn ponds_are_isolated() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let mut other = snapshot(3.5, minute(0));
        other.pond_id = PondId("pond-2".into());

        for step in 0..3 {
            controller
                .evaluate(&snapshot(3.5, minute(step)), minute(step))
                .unwrap();
        }
        // pond-2 saw nothing; its first violation only arms.
        let events = controller.evaluate(&other, minute(3)).unwrap();
        assert!(events.is_empty());
        assert_eq!(
            controller
                .phase_of(&other.pond_id, &ActuatorId("aerator-1".into()))
                .unwrap(),
            Phase::Armed { count: 1 },
        );
    }

    #[test]
    fn missing_parameter_disarms_rather_than_holding() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        controller.evaluate(&snapshot(3.5, minute(0)), minute(0)).unwrap();

        let empty = SensorSnapshot {
            pond_id: pond.clone(),
            timestamp: minute(1),
            values: [("pH".into(), NotNan::new(7.8).unwrap())].into_iter().collect(),
        };
        controller.evaluate(&empty, minute(1)).unwrap();
        assert_eq!(controller.phase_of(&pond, &actuator).unwrap(), Phase::Idle);
    }

    #[test]
    fn poisoned_state_lock_recovers_on_the_next_call() {
        let controller = TriggerController::new(vec![aerator_rule()]).unwrap();
        let pond = PondId("pond-1".into());
        let actuator = ActuatorId("aerator-1".into());

        controller.evaluate(&snapshot(3.5, minute(0)), minute(0)).unwrap();

        // Panic while holding the guard to poison the lock.
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = controller.states.lock().unwrap();
            panic!("simulated panic under the state lock");
        }));
        assert!(panicked.is_err());
        assert!(controller.states.is_poisoned());

        // The next evaluation clears the poison and keeps the state
        // accumulated before the panic.
        controller.evaluate(&snapshot(3.5, minute(1)), minute(1)).unwrap();
        assert_eq!(
            controller.phase_of(&pond, &actuator).unwrap(),
            Phase::Armed { count: 2 },
        );
    }

    #[test]
    fn zero_confirmations_is_a_config_error() {
        let rule = TriggerRule {
            confirmations: 0,
            ..aerator_rule()
        };
        assert!(matches!(
            TriggerController::new(vec![rule]),
            Err(ConfigError::InvalidTriggerRule { .. }),
        ));
    }
}
