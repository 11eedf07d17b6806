//! Test doubles for driving a session without a host.
//!
//! Used by the unit tests and the `tests/qa_*` suites:
//! - `ScriptedRandomizer` for deterministic spillover rolls
//! - `FailingUpdateSink` for exercising per-target commit failures
//! - `TestHarness` wiring a session to inspectable in-memory collaborators
//! - Target builders and assertion helpers

use crate::conditions::{condition_store_for, Condition, ConditionStore};
use crate::config::HealthSettings;
use crate::dice::Randomizer;
use crate::engine::ApplicationOutcome;
use crate::host::{
    ActingUser, AttributeUpdates, ChatEntry, ChatLog, JsonDataAccessor, MemoryUpdateSink,
    PersistenceFailure, Target, TargetId, UpdateSink,
};
use crate::session::{ApplyReport, Collaborators, DialogInput, SessionError, TokenHealthSession};
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock collaborators
// ============================================================================

/// Returns scripted rolls in order, then 1s.
///
/// Rolls larger than the die are clamped to its size.
#[derive(Debug, Default)]
pub struct ScriptedRandomizer {
    rolls: Mutex<VecDeque<u32>>,
}

impl ScriptedRandomizer {
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rolls: Mutex::new(rolls.into_iter().collect()),
        }
    }

    /// Append rolls to the script.
    pub fn push(&self, rolls: impl IntoIterator<Item = u32>) {
        self.lock().extend(rolls);
    }

    /// Rolls not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<u32>> {
        self.rolls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Randomizer for ScriptedRandomizer {
    fn roll_die(&self, sides: u32) -> u32 {
        let sides = sides.max(1);
        match self.lock().pop_front() {
            Some(roll) => roll.clamp(1, sides),
            None => {
                tracing::warn!("scripted rolls exhausted, rolling 1");
                1
            }
        }
    }
}

/// Rejects commits for chosen targets and records the rest.
#[derive(Debug, Default)]
pub struct FailingUpdateSink {
    failing: BTreeSet<TargetId>,
    inner: MemoryUpdateSink,
}

impl FailingUpdateSink {
    pub fn for_targets<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetId>,
    {
        Self {
            failing: targets.into_iter().map(Into::into).collect(),
            inner: MemoryUpdateSink::new(),
        }
    }

    pub async fn commits(&self) -> Vec<(TargetId, AttributeUpdates)> {
        self.inner.commits().await
    }
}

#[async_trait]
impl UpdateSink for FailingUpdateSink {
    async fn commit(
        &self,
        target: &TargetId,
        updates: &AttributeUpdates,
    ) -> Result<(), PersistenceFailure> {
        if self.failing.contains(target) {
            return Err(PersistenceFailure::Rejected {
                target: target.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.inner.commit(target, updates).await
    }
}

// ============================================================================
// Targets
// ============================================================================

/// A target with `health.value` / `health.max`, the generic profile's paths.
pub fn hp_target(id: &str, current: f64, max: f64) -> Target {
    Target::new(id, id)
        .with_attribute("health.value", current)
        .with_attribute("health.max", max)
}

/// A target laid out like a 5e-style actor, with a temporary pool.
pub fn dnd_target(id: &str, current: f64, max: f64, temp: f64) -> Target {
    Target::new(id, id)
        .with_attribute("attributes.hp.value", current)
        .with_attribute("attributes.hp.max", max)
        .with_attribute("attributes.hp.temp", temp)
}

// ============================================================================
// Harness
// ============================================================================

/// A session wired to in-memory collaborators that tests can inspect.
pub struct TestHarness {
    pub session: TokenHealthSession,
    pub chat: Arc<ChatLog>,
    pub sink: Arc<MemoryUpdateSink>,
    pub conditions: Arc<dyn ConditionStore>,
    pub dice: Arc<ScriptedRandomizer>,
}

impl TestHarness {
    /// A GM session.
    pub fn new(settings: HealthSettings) -> Self {
        Self::with_user(settings, ActingUser::gm("gm"))
    }

    pub fn with_user(settings: HealthSettings, user: ActingUser) -> Self {
        let chat = Arc::new(ChatLog::new());
        let sink = Arc::new(MemoryUpdateSink::new());
        let conditions = condition_store_for(settings.condition_strategy);
        let dice = Arc::new(ScriptedRandomizer::default());

        let collaborators = Collaborators {
            accessor: Arc::new(JsonDataAccessor),
            conditions: Arc::clone(&conditions),
            dice: dice.clone(),
            announcer: chat.clone(),
            sink: sink.clone(),
        };
        let session = TokenHealthSession::new(settings, user, collaborators);

        Self {
            session,
            chat,
            sink,
            conditions,
            dice,
        }
    }

    /// Queue spillover rolls.
    pub fn expect_rolls(&self, rolls: impl IntoIterator<Item = u32>) -> &Self {
        self.dice.push(rolls);
        self
    }

    /// Set conditions on a target before applying.
    pub async fn given_conditions(&self, target: &str, conditions: &[Condition]) {
        let id = TargetId::from(target);
        for condition in conditions {
            if let Err(e) = self.conditions.set(&id, *condition, true).await {
                tracing::warn!(error = %e, "failed to seed condition");
            }
        }
    }

    pub async fn apply(
        &self,
        input: &DialogInput,
        targets: &[Target],
    ) -> Result<ApplyReport, SessionError> {
        self.session.apply(input, targets).await
    }

    pub async fn has_condition(&self, target: &str, condition: Condition) -> bool {
        self.conditions
            .get(&TargetId::from(target), condition)
            .await
            .unwrap_or(false)
    }

    /// Last committed value of `path` on `target`.
    pub async fn committed(&self, target: &str, path: &str) -> Option<f64> {
        self.sink.latest(&TargetId::from(target), path).await
    }

    pub fn chat_for(&self, target: &str) -> Vec<ChatEntry> {
        self.chat.messages_for(&TargetId::from(target))
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the outcome's new current value.
#[track_caller]
pub fn assert_current(outcome: &ApplicationOutcome, expected: f64) {
    assert_eq!(
        outcome.health_result.new_current, expected,
        "Expected {} to end at {expected}, got {}",
        outcome.target_id, outcome.health_result.new_current
    );
}

/// Assert the outcome requests `condition` to become `active`.
#[track_caller]
pub fn assert_transition(outcome: &ApplicationOutcome, condition: Condition, active: bool) {
    assert!(
        outcome
            .condition_transitions
            .iter()
            .any(|t| t.condition == condition && t.active == active),
        "Expected transition {condition} -> {active}, got {:?}",
        outcome.condition_transitions
    );
}

/// Assert the outcome requests no condition changes.
#[track_caller]
pub fn assert_no_transitions(outcome: &ApplicationOutcome) {
    assert!(
        outcome.condition_transitions.is_empty(),
        "Expected no transitions, got {:?}",
        outcome.condition_transitions
    );
}
