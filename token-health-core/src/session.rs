//! TokenHealthSession - the caller-side API for applying damage and healing.
//!
//! A session belongs to one user. It decides whether that user may open the
//! health dialog, runs the engine for every subtype slot the user filled in,
//! and commits the resulting outcomes through the host collaborators.

use crate::conditions::{condition_store_for, ConditionStore, ConditionStrategy, StoreError};
use crate::config::{ConfigurationError, HealthSettings};
use crate::dice::{Randomizer, ThreadRandomizer};
use crate::engine::{ApplicationOutcome, DamageEngine, DamageRequest, Polarity};
use crate::host::{
    ActingUser, Announcer, ChatLog, DataAccessor, JsonDataAccessor, MemoryUpdateSink,
    PersistenceFailure, Target, TargetId, UpdateSink, Whisper,
};
use crate::resolver::{AttributeResolver, DamageSubtypeConfig, SubtypeSlot};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from TokenHealthSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("The health dialog is already open")]
    DialogAlreadyOpen,

    #[error("Only the GM may open the health dialog")]
    LaunchRestricted,

    /// Carries the configured access notice.
    #[error("{0}")]
    NoOwnedTargets(String),
}

/// Errors committing one target's outcome.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceFailure),

    #[error("Condition update failed: {0}")]
    Conditions(#[from] StoreError),
}

// ============================================================================
// Dialog state
// ============================================================================

/// Marks the session's dialog as open until dropped.
#[must_use = "the dialog closes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct DialogGuard {
    open: Arc<AtomicBool>,
}

impl Drop for DialogGuard {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// A successful launch: the open dialog and the targets it acts on.
#[derive(Debug)]
pub struct Launch {
    pub guard: DialogGuard,
    pub targets: Vec<Target>,
}

/// What the user entered in the dialog.
#[derive(Debug, Clone)]
pub struct DialogInput {
    /// Raw text per subtype slot.
    pub amounts: [String; 2],
    pub polarity: Polarity,
    pub damage_type: Option<String>,
    pub subtype_override: Option<DamageSubtypeConfig>,
}

impl DialogInput {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            amounts: Default::default(),
            polarity,
            damage_type: None,
            subtype_override: None,
        }
    }

    /// Shorthand for a single amount in the primary slot.
    pub fn damage(amount: impl Into<String>) -> Self {
        Self::new(Polarity::Damage).with_amount(SubtypeSlot::Primary, amount)
    }

    /// Shorthand for a single amount in the primary slot.
    pub fn heal(amount: impl Into<String>) -> Self {
        Self::new(Polarity::Heal).with_amount(SubtypeSlot::Primary, amount)
    }

    pub fn with_amount(mut self, slot: SubtypeSlot, amount: impl Into<String>) -> Self {
        self.amounts[slot.offset()] = amount.into();
        self
    }

    pub fn with_damage_type(mut self, damage_type: impl Into<String>) -> Self {
        self.damage_type = Some(damage_type.into());
        self
    }

    pub fn with_subtype_override(mut self, config: DamageSubtypeConfig) -> Self {
        self.subtype_override = Some(config);
        self
    }
}

/// Parse a dialog amount. Empty or non-numeric input means "no amount".
pub fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// Collaborators
// ============================================================================

/// The host seams a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub accessor: Arc<dyn DataAccessor>,
    pub conditions: Arc<dyn ConditionStore>,
    pub dice: Arc<dyn Randomizer>,
    pub announcer: Arc<dyn Announcer>,
    pub sink: Arc<dyn UpdateSink>,
}

impl Collaborators {
    /// JSON data, in-memory stores and live dice.
    pub fn in_memory(strategy: ConditionStrategy) -> Self {
        Self {
            accessor: Arc::new(JsonDataAccessor),
            conditions: condition_store_for(strategy),
            dice: Arc::new(ThreadRandomizer),
            announcer: Arc::new(ChatLog::new()),
            sink: Arc::new(MemoryUpdateSink::new()),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// A target whose outcome could not be committed.
#[derive(Debug)]
pub struct TargetFailure {
    pub target_id: TargetId,
    pub error: CommitError,
}

/// Everything one `apply` call did.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<ApplicationOutcome>,
    pub failures: Vec<TargetFailure>,
}

impl ApplyReport {
    /// Whether every outcome was committed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcomes_for<'a>(
        &'a self,
        target: &'a TargetId,
    ) -> impl Iterator<Item = &'a ApplicationOutcome> + 'a {
        self.outcomes.iter().filter(move |o| &o.target_id == target)
    }
}

// ============================================================================
// Session
// ============================================================================

/// One user's damage/healing session.
pub struct TokenHealthSession {
    settings: HealthSettings,
    user: ActingUser,
    engine: DamageEngine,
    announcer: Arc<dyn Announcer>,
    sink: Arc<dyn UpdateSink>,
    dialog_open: Arc<AtomicBool>,
}

impl TokenHealthSession {
    pub fn new(settings: HealthSettings, user: ActingUser, collaborators: Collaborators) -> Self {
        let engine = DamageEngine::new(
            collaborators.accessor,
            collaborators.conditions,
            collaborators.dice,
        );
        Self {
            settings,
            user,
            engine,
            announcer: collaborators.announcer,
            sink: collaborators.sink,
            dialog_open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    pub fn user(&self) -> &ActingUser {
        &self.user
    }

    pub fn engine(&self) -> &DamageEngine {
        &self.engine
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open.load(Ordering::Acquire)
    }

    /// Open the dialog for the owned part of `selection`.
    pub fn launch(&self, selection: &[Target]) -> Result<Launch, SessionError> {
        if self.settings.restrict_player_launch && !self.user.is_gm {
            tracing::debug!(user = %self.user.id, "player launch restricted");
            return Err(SessionError::LaunchRestricted);
        }

        let targets: Vec<Target> = selection
            .iter()
            .filter(|t| t.is_owned_by(&self.user))
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(SessionError::NoOwnedTargets(self.settings.access_message.clone()));
        }

        if self
            .dialog_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::DialogAlreadyOpen);
        }

        tracing::info!(user = %self.user.id, targets = targets.len(), "health dialog opened");
        Ok(Launch {
            guard: DialogGuard {
                open: Arc::clone(&self.dialog_open),
            },
            targets,
        })
    }

    /// Resolve the dialog input against `targets` and commit the outcomes.
    ///
    /// Every filled-in slot is resolved before anything is committed, so a
    /// configuration error leaves all targets untouched. For each target the
    /// slots run in order and each one reads what the previous slot
    /// committed. Targets run concurrently, and a commit failure stops only
    /// the remaining slots of that target.
    pub async fn apply(
        &self,
        input: &DialogInput,
        targets: &[Target],
    ) -> Result<ApplyReport, SessionError> {
        let resolver = AttributeResolver::new(&self.settings);
        let mut steps = Vec::new();

        for slot in SubtypeSlot::ALL {
            let Some(raw) = parse_amount(&input.amounts[slot.offset()]) else {
                tracing::debug!(%slot, "no amount for slot");
                continue;
            };
            // A negative entry flips the pressed button.
            let (amount, polarity) = if raw < 0.0 {
                (-raw, flip(input.polarity))
            } else {
                (raw, input.polarity)
            };
            let config = input.subtype_override.as_ref().filter(|c| c.slot == slot);
            steps.push(SlotStep {
                subtype: resolver.resolve(slot, config)?,
                amount,
                polarity,
            });
        }

        let owned = targets.iter().filter(|t| t.is_owned_by(&self.user));
        let results = join_all(owned.map(|target| self.apply_to_target(input, &steps, target))).await;

        let mut report = ApplyReport::default();
        for (outcomes, failure) in results {
            report.outcomes.extend(outcomes);
            report.failures.extend(failure);
        }
        Ok(report)
    }

    async fn apply_to_target(
        &self,
        input: &DialogInput,
        steps: &[SlotStep],
        target: &Target,
    ) -> (Vec<ApplicationOutcome>, Option<TargetFailure>) {
        let mut target = target.clone();
        let mut outcomes = Vec::new();

        for step in steps {
            let mut request = DamageRequest::new(
                &self.settings,
                std::slice::from_ref(&target),
                &self.user,
                step.amount,
                step.polarity,
            )
            .with_slot(step.subtype.slot);
            if let Some(damage_type) = &input.damage_type {
                request = request.with_damage_type(damage_type.clone());
            }
            let resolved = self.engine.apply_resolved(&request, &step.subtype).await;

            for outcome in resolved {
                let committed = self.commit(&mut target, &outcome).await;
                outcomes.push(outcome);
                if let Err(error) = committed {
                    tracing::warn!(target_id = %target.id, error = %error, "commit failed");
                    let failure = TargetFailure {
                        target_id: target.id.clone(),
                        error,
                    };
                    return (outcomes, Some(failure));
                }
            }
        }
        (outcomes, None)
    }

    /// Write attributes, then conditions, then chat.
    ///
    /// A rejected write leaves the target's conditions and the chat untouched.
    async fn commit(
        &self,
        target: &mut Target,
        outcome: &ApplicationOutcome,
    ) -> Result<(), CommitError> {
        let id = &outcome.target_id;

        if !outcome.updates.is_empty() {
            self.sink.commit(id, &outcome.updates).await?;
            target.apply_updates(&outcome.updates);
        }

        if !outcome.condition_transitions.is_empty() {
            self.engine
                .conditions()
                .apply(id, &outcome.condition_transitions)
                .await?;
        }

        if self.settings.enable_chat {
            self.announcer
                .announce(&outcome.player_message, id, Whisper::Everyone);
            for status in &outcome.status_messages {
                self.announcer.announce(status, id, Whisper::Everyone);
            }
            self.announcer.announce(&outcome.gm_message, id, Whisper::Gm);
        }
        Ok(())
    }
}

/// One filled-in slot of the dialog, resolved.
struct SlotStep {
    subtype: DamageSubtypeConfig,
    amount: f64,
    polarity: Polarity,
}

fn flip(polarity: Polarity) -> Polarity {
    match polarity {
        Polarity::Damage => Polarity::Heal,
        Polarity::Heal => Polarity::Damage,
    }
}
