//! Damage resolution engine.
//!
//! [`DamageEngine::apply_damage`] turns one damage or healing request into
//! one [`ApplicationOutcome`] per owned target. Each outcome carries the new
//! health values, the attribute writes that persist them, the condition
//! transitions to apply and the chat messages to announce. Nothing is
//! written here; committing an outcome is the caller's job.
//!
//! # Sign convention
//!
//! Requests carry an unsigned amount and a [`Polarity`]. The signed amount is
//! positive for damage. Additive pools count damage upwards from zero, so the
//! sign is flipped before the pool arithmetic runs.

use crate::buyoff::resolve_spillover;
use crate::conditions::{Condition, ConditionSet, ConditionStore, ConditionTransition, StoreError};
use crate::config::{ConfigurationError, HealthSettings};
use crate::dice::Randomizer;
use crate::health::{compute_new_health, HealthResult, HealthSnapshot, Thresholds};
use crate::host::{ActingUser, AttributeUpdates, DataAccessor, Target, TargetId};
use crate::messages::{MessageKey, MessageVars};
use crate::resolver::{
    AltMaxRole, AttributeResolver, DamageSubtypeConfig, MitigationConfig, SubtypeSlot,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Requests
// ============================================================================

/// Which button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Damage,
    Heal,
}

impl Polarity {
    /// `1.0` for damage, `-1.0` for healing.
    pub fn sign(&self) -> f64 {
        match self {
            Polarity::Damage => 1.0,
            Polarity::Heal => -1.0,
        }
    }
}

/// One damage or healing application against a set of targets.
#[derive(Debug, Clone)]
pub struct DamageRequest<'a> {
    pub settings: &'a HealthSettings,
    pub targets: &'a [Target],
    pub acting_user: &'a ActingUser,
    /// Raw amount as entered. A negative amount reverses the polarity.
    pub amount: f64,
    pub polarity: Polarity,
    /// Active damage type label, if the rule set uses them.
    pub damage_type: Option<String>,
    pub slot: SubtypeSlot,
    /// Exact attribute paths chosen by the caller, bypassing the slot lookup.
    pub subtype_override: Option<DamageSubtypeConfig>,
}

impl<'a> DamageRequest<'a> {
    pub fn new(
        settings: &'a HealthSettings,
        targets: &'a [Target],
        acting_user: &'a ActingUser,
        amount: f64,
        polarity: Polarity,
    ) -> Self {
        Self {
            settings,
            targets,
            acting_user,
            amount,
            polarity,
            damage_type: None,
            slot: SubtypeSlot::Primary,
            subtype_override: None,
        }
    }

    pub fn with_damage_type(mut self, damage_type: impl Into<String>) -> Self {
        let damage_type = damage_type.into();
        self.damage_type = match damage_type.trim() {
            "" => None,
            trimmed => Some(trimmed.to_string()),
        };
        self
    }

    pub fn with_slot(mut self, slot: SubtypeSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_subtype_override(mut self, config: DamageSubtypeConfig) -> Self {
        self.subtype_override = Some(config);
        self
    }

    /// Positive for damage, negative for healing.
    pub fn signed_amount(&self) -> f64 {
        self.polarity.sign() * self.amount
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How an application affected a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    /// Fully mitigated, zero amount or nothing to heal.
    NoEffect,
    Damage,
    Healing,
}

/// The result of applying a request to one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationOutcome {
    pub target_id: TargetId,
    pub target_name: String,
    pub slot: SubtypeSlot,
    pub kind: EffectKind,
    /// Signed amount after mitigation, positive for damage.
    pub effective_amount: f64,
    /// Health actually gained or lost after clamping, never negative.
    pub net_effect: f64,
    /// Total mitigation subtracted from the raw amount.
    pub mitigation: f64,
    pub snapshot: HealthSnapshot,
    pub health_result: HealthResult,
    /// Attribute path to new value.
    pub updates: AttributeUpdates,
    pub condition_transitions: Vec<ConditionTransition>,
    /// Spillover die results.
    pub rolls: Vec<u32>,
    /// Public reaction.
    pub player_message: String,
    /// Whispered to the GM.
    pub gm_message: String,
    /// Public status lines (unconscious, dying, ...).
    pub status_messages: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Resolves damage and healing against host targets.
#[derive(Clone)]
pub struct DamageEngine {
    accessor: Arc<dyn DataAccessor>,
    conditions: Arc<dyn ConditionStore>,
    dice: Arc<dyn Randomizer>,
}

impl DamageEngine {
    pub fn new(
        accessor: Arc<dyn DataAccessor>,
        conditions: Arc<dyn ConditionStore>,
        dice: Arc<dyn Randomizer>,
    ) -> Self {
        Self {
            accessor,
            conditions,
            dice,
        }
    }

    pub fn conditions(&self) -> &Arc<dyn ConditionStore> {
        &self.conditions
    }

    /// Apply a request to every owned target.
    ///
    /// Fails only when the subtype's attribute paths cannot be resolved, in
    /// which case no target is processed. Targets the user does not own, and
    /// targets lacking the subtype's attributes, produce no outcome. A target
    /// whose condition store fails is logged and skipped without affecting
    /// the others.
    pub async fn apply_damage(
        &self,
        request: &DamageRequest<'_>,
    ) -> Result<Vec<ApplicationOutcome>, ConfigurationError> {
        let subtype = AttributeResolver::new(request.settings)
            .resolve(request.slot, request.subtype_override.as_ref())?;
        Ok(self.apply_resolved(request, &subtype).await)
    }

    /// Apply a request whose subtype has already been resolved.
    pub async fn apply_resolved(
        &self,
        request: &DamageRequest<'_>,
        subtype: &DamageSubtypeConfig,
    ) -> Vec<ApplicationOutcome> {
        if !request.amount.is_finite() {
            tracing::warn!(amount = request.amount, "ignoring non-finite amount");
            return Vec::new();
        }

        let owned = request.targets.iter().filter(|target| {
            let owned = target.is_owned_by(request.acting_user);
            if !owned {
                tracing::debug!(target_id = %target.id, user = %request.acting_user.id, "target not owned, skipping");
            }
            owned
        });

        let results = join_all(owned.map(|target| self.apply_to_target(request, subtype, target))).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "condition store failed, target skipped"),
            }
        }

        tracing::info!(
            slot = %subtype.slot,
            polarity = ?request.polarity,
            amount = request.amount,
            affected = outcomes.len(),
            "applied health change"
        );
        outcomes
    }

    async fn apply_to_target(
        &self,
        request: &DamageRequest<'_>,
        subtype: &DamageSubtypeConfig,
        target: &Target,
    ) -> Result<Option<ApplicationOutcome>, StoreError> {
        let settings = request.settings;

        let (Some(current), Some(mut max)) = (
            self.accessor.read(target, &subtype.current_value_path),
            self.accessor.read(target, &subtype.max_value_path),
        ) else {
            tracing::debug!(target_id = %target.id, slot = %subtype.slot, "subtype attributes absent, skipping");
            return Ok(None);
        };

        let alt_max = subtype
            .alt_max_value_path
            .as_deref()
            .and_then(|path| self.accessor.read(target, path));
        if let (Some(alt), AltMaxRole::ExtendsMax) = (alt_max, subtype.alt_max_role) {
            max += alt;
        }
        // Additive pools have no temporary buffer.
        let temp = if settings.additive_damage {
            None
        } else {
            subtype
                .temp_value_path
                .as_deref()
                .and_then(|path| self.accessor.read(target, path))
        };

        let snapshot = HealthSnapshot { current, max, temp };
        let thresholds = effective_thresholds(settings, max);

        let signed = request.signed_amount();
        let mitigation = if signed > 0.0 {
            mitigation_total(
                self.accessor.as_ref(),
                target,
                &subtype.mitigation,
                request.damage_type.as_deref(),
                &settings.unmitigated_damage_type,
            )
        } else {
            0.0
        };
        let effective = if signed > 0.0 {
            (signed - mitigation).max(0.0)
        } else {
            signed
        };
        if mitigation > 0.0 {
            tracing::debug!(target_id = %target.id, mitigation, effective, "mitigation applied");
        }

        let mut outcome = ApplicationOutcome {
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            slot: subtype.slot,
            kind: EffectKind::NoEffect,
            effective_amount: effective,
            net_effect: 0.0,
            mitigation,
            snapshot,
            health_result: snapshot.unchanged(),
            updates: AttributeUpdates::new(),
            condition_transitions: Vec::new(),
            rolls: Vec::new(),
            player_message: String::new(),
            gm_message: String::new(),
            status_messages: Vec::new(),
        };

        if effective == 0.0 {
            return Ok(Some(no_effect(outcome, settings, subtype)));
        }

        let pool_amount = if settings.additive_damage {
            -effective
        } else {
            effective
        };
        let mut result = compute_new_health(&snapshot, pool_amount, settings.allow_negative);
        let absorbed = result.temp_absorbed(&snapshot);
        if let (Some(cap), AltMaxRole::CapsTemp, Some(new_temp)) =
            (alt_max, subtype.alt_max_role, result.new_temp)
        {
            result.new_temp = Some(new_temp.min(cap));
        }

        let needs_conditions =
            settings.enable_conditions || (settings.allow_damage_buyoff && effective > 0.0);
        let conditions = if needs_conditions {
            self.conditions.snapshot(&target.id).await?
        } else {
            ConditionSet::new()
        };

        let mut desired = Vec::new();
        let mut status = Vec::new();

        if effective > 0.0 {
            outcome.kind = EffectKind::Damage;
            let reaching = effective - absorbed;
            outcome.net_effect = if settings.additive_damage {
                result.new_current - current
            } else {
                (current - result.new_current) + absorbed
            }
            .max(0.0);

            self.check_damage_thresholds(
                settings,
                subtype,
                &snapshot,
                &result,
                thresholds,
                reaching,
                &conditions,
                &mut outcome,
                &mut desired,
                &mut status,
            );
        } else {
            let magnitude = -effective;
            let capacity = if settings.additive_damage {
                current
            } else {
                max - current
            }
            .max(0.0);
            let net = magnitude.min(capacity);
            if net <= 0.0 {
                return Ok(Some(no_effect(outcome, settings, subtype)));
            }
            outcome.kind = EffectKind::Healing;
            outcome.net_effect = net;

            if settings.enable_conditions {
                let recovered = |threshold: f64| {
                    if settings.additive_damage {
                        result.new_current < threshold
                    } else {
                        result.new_current > threshold
                    }
                };
                if conditions.contains(Condition::Unconscious) && recovered(thresholds.ko) {
                    desired.push(ConditionTransition::clear(Condition::Unconscious));
                }
                if conditions.contains(Condition::Dying) && recovered(thresholds.death) {
                    desired.push(ConditionTransition::clear(Condition::Dying));
                }
            }
        }

        outcome.health_result = result;
        outcome.updates = attribute_updates(subtype, &snapshot, &result);
        outcome.condition_transitions = if settings.enable_conditions {
            changed_transitions(desired, &conditions)
        } else {
            Vec::new()
        };

        let vars = MessageVars {
            label: &subtype.label,
            amount: effective.abs(),
            net_effect: outcome.net_effect,
        };
        let templates = &settings.messages;
        let (player, gm) = match outcome.kind {
            EffectKind::Damage if effective == 1.0 => (MessageKey::Ouch, MessageKey::DamagePoint),
            EffectKind::Damage => (MessageKey::Ouch, MessageKey::DamagePoints),
            _ if outcome.net_effect == 1.0 => (MessageKey::Ty, MessageKey::HealingPoint),
            _ => (MessageKey::Ty, MessageKey::HealingPoints),
        };
        outcome.player_message = templates.render(player, vars);
        outcome.gm_message = templates.render(gm, vars);

        let mut seen = Vec::new();
        for key in status {
            if !seen.contains(&key) {
                seen.push(key);
                outcome.status_messages.push(templates.render(key, vars));
            }
        }

        tracing::debug!(
            target_id = %target.id,
            kind = ?outcome.kind,
            current,
            new_current = result.new_current,
            transitions = outcome.condition_transitions.len(),
            "resolved target"
        );
        Ok(Some(outcome))
    }

    #[allow(clippy::too_many_arguments)]
    fn check_damage_thresholds(
        &self,
        settings: &HealthSettings,
        subtype: &DamageSubtypeConfig,
        snapshot: &HealthSnapshot,
        result: &HealthResult,
        thresholds: Thresholds,
        reaching: f64,
        conditions: &ConditionSet,
        outcome: &mut ApplicationOutcome,
        desired: &mut Vec<ConditionTransition>,
        status: &mut Vec<MessageKey>,
    ) {
        let capacity = if settings.additive_damage {
            thresholds.death - snapshot.current
        } else {
            snapshot.current - thresholds.death
        };

        if subtype.stun {
            // Stun pools only ever knock out.
            if reaching >= capacity {
                desired.push(ConditionTransition::set(Condition::Unconscious));
                status.push(MessageKey::Unconscious);
            }
            return;
        }

        if reaching > capacity {
            if settings.allow_damage_buyoff {
                let spill = resolve_spillover(
                    reaching - capacity,
                    conditions,
                    settings.enable_conditions,
                    self.dice.as_ref(),
                );
                tracing::info!(
                    target_id = %outcome.target_id,
                    remaining = reaching - capacity,
                    from = ?spill.initial_state,
                    to = ?spill.final_state,
                    "damage spilled over"
                );
                desired.extend(spill.transitions);
                status.extend(spill.messages);
                outcome.rolls = spill.rolls;
            } else {
                tracing::info!(target_id = %outcome.target_id, "death threshold crossed");
                desired.push(ConditionTransition::set(Condition::Dying));
                status.push(if conditions.contains(Condition::Dying) {
                    MessageKey::Dead
                } else {
                    MessageKey::Dying
                });
            }
        } else if reaching == capacity && !settings.allow_damage_buyoff {
            desired.push(ConditionTransition::set(Condition::Unconscious));
            status.push(MessageKey::Unconscious);
        }

        if !settings.allow_damage_buyoff {
            let knocked_out = if settings.additive_damage {
                result.new_current >= thresholds.ko
            } else {
                result.new_current <= thresholds.ko
            };
            if knocked_out {
                desired.insert(0, ConditionTransition::set(Condition::Unconscious));
                status.insert(0, MessageKey::Unconscious);
            }
        }
    }
}

/// KO and death thresholds for a pool with the given max.
///
/// Additive pools are knocked out and killed by filling up to their max,
/// whatever thresholds are configured.
pub fn effective_thresholds(settings: &HealthSettings, max: f64) -> Thresholds {
    if settings.additive_damage {
        Thresholds::additive(max)
    } else {
        settings.thresholds()
    }
}

/// Sum of the mitigation values that apply to `damage_type`.
///
/// Nothing is mitigated when `damage_type` is the unmitigated type. Sources
/// whose attribute is absent on the target count as zero.
pub fn mitigation_total(
    accessor: &dyn DataAccessor,
    target: &Target,
    mitigation: &MitigationConfig,
    damage_type: Option<&str>,
    unmitigated_damage_type: &str,
) -> f64 {
    let unmitigated = unmitigated_damage_type.trim();
    if let Some(active) = damage_type {
        if !unmitigated.is_empty() && active.trim().eq_ignore_ascii_case(unmitigated) {
            return 0.0;
        }
    }
    mitigation
        .applicable(damage_type)
        .map(|source| accessor.read(target, &source.attribute_path).unwrap_or(0.0))
        .sum()
}

fn no_effect(
    mut outcome: ApplicationOutcome,
    settings: &HealthSettings,
    subtype: &DamageSubtypeConfig,
) -> ApplicationOutcome {
    let vars = MessageVars {
        label: &subtype.label,
        amount: outcome.effective_amount.abs(),
        net_effect: 0.0,
    };
    let meh = settings.messages.render(MessageKey::Meh, vars);
    outcome.kind = EffectKind::NoEffect;
    outcome.player_message = meh.clone();
    outcome.gm_message = meh;
    tracing::debug!(target_id = %outcome.target_id, "no effect");
    outcome
}

fn attribute_updates(
    subtype: &DamageSubtypeConfig,
    snapshot: &HealthSnapshot,
    result: &HealthResult,
) -> AttributeUpdates {
    let mut updates = AttributeUpdates::new();
    updates.insert(subtype.current_value_path.clone(), result.new_current);
    if let (Some(path), Some(new_temp)) = (&subtype.temp_value_path, result.new_temp) {
        if snapshot.temp != Some(new_temp) {
            updates.insert(path.clone(), new_temp);
        }
    }
    updates
}

/// Keep the first request per condition and drop those that change nothing.
fn changed_transitions(
    desired: Vec<ConditionTransition>,
    conditions: &ConditionSet,
) -> Vec<ConditionTransition> {
    let mut changed: Vec<ConditionTransition> = Vec::new();
    for transition in desired {
        if changed.iter().any(|t| t.condition == transition.condition) {
            continue;
        }
        if conditions.contains(transition.condition) != transition.active {
            changed.push(transition);
        }
    }
    changed
}
