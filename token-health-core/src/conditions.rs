//! Per-actor condition flags and the stores that hold them.
//!
//! The engine reads conditions and requests transitions; it never owns them.
//! Two storage strategies exist: plain boolean flags, and attached effect
//! records for rule sets that model conditions as effects. Both expose the
//! same [`ConditionStore`] operations, and the strategy is picked once from
//! the rule-set profile.

use crate::host::TargetId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Named boolean condition on an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Unconscious,
    Dying,
    Injured,
    Wounded,
    Prone,
    Exhausted,
    Fatigued,
    Helpless,
    Freefalling,
}

impl Condition {
    pub const ALL: [Condition; 9] = [
        Condition::Unconscious,
        Condition::Dying,
        Condition::Injured,
        Condition::Wounded,
        Condition::Prone,
        Condition::Exhausted,
        Condition::Fatigued,
        Condition::Helpless,
        Condition::Freefalling,
    ];

    /// The flag name used by the host.
    pub fn flag_name(&self) -> &'static str {
        match self {
            Condition::Unconscious => "unconscious",
            Condition::Dying => "dying",
            Condition::Injured => "injured",
            Condition::Wounded => "wounded",
            Condition::Prone => "prone",
            Condition::Exhausted => "exhausted",
            Condition::Fatigued => "fatigued",
            Condition::Helpless => "helpless",
            Condition::Freefalling => "freefalling",
        }
    }

    pub fn from_flag_name(name: &str) -> Option<Condition> {
        Condition::ALL
            .into_iter()
            .find(|c| c.flag_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Display label used for effect records.
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Unconscious => "Unconscious",
            Condition::Dying => "Dying",
            Condition::Injured => "Injured",
            Condition::Wounded => "Wounded",
            Condition::Prone => "Prone",
            Condition::Exhausted => "Exhausted",
            Condition::Fatigued => "Fatigued",
            Condition::Helpless => "Helpless",
            Condition::Freefalling => "Freefalling",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag_name())
    }
}

/// The set conditions of one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSet {
    active: BTreeSet<Condition>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, condition: Condition) -> bool {
        self.active.contains(&condition)
    }

    pub fn insert(&mut self, condition: Condition) {
        self.active.insert(condition);
    }

    pub fn remove(&mut self, condition: Condition) {
        self.active.remove(&condition);
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.insert(condition);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Condition> + '_ {
        self.active.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self {
            active: iter.into_iter().collect(),
        }
    }
}

/// A requested change to one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTransition {
    pub condition: Condition,
    pub active: bool,
}

impl ConditionTransition {
    pub fn set(condition: Condition) -> Self {
        Self {
            condition,
            active: true,
        }
    }

    pub fn clear(condition: Condition) -> Self {
        Self {
            condition,
            active: false,
        }
    }
}

/// Errors raised by a condition store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Condition store rejected {operation} of '{condition}' on {actor}: {reason}")]
    Rejected {
        actor: TargetId,
        condition: Condition,
        operation: &'static str,
        reason: String,
    },
}

/// How a rule set represents conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionStrategy {
    /// Boolean flags on the actor.
    #[default]
    Flags,
    /// Attached effect records.
    Effects,
}

/// Per-actor condition storage.
#[async_trait]
pub trait ConditionStore: Send + Sync {
    /// Whether `condition` is set. Unknown flags read as `false`.
    async fn get(&self, actor: &TargetId, condition: Condition) -> Result<bool, StoreError>;

    async fn set(
        &self,
        actor: &TargetId,
        condition: Condition,
        value: bool,
    ) -> Result<(), StoreError>;

    async fn remove(&self, actor: &TargetId, condition: Condition) -> Result<(), StoreError>;

    fn strategy(&self) -> ConditionStrategy;

    /// Read every condition of an actor.
    async fn snapshot(&self, actor: &TargetId) -> Result<ConditionSet, StoreError> {
        let mut set = ConditionSet::new();
        for condition in Condition::ALL {
            if self.get(actor, condition).await? {
                set.insert(condition);
            }
        }
        Ok(set)
    }

    /// Apply transitions in order.
    async fn apply(
        &self,
        actor: &TargetId,
        transitions: &[ConditionTransition],
    ) -> Result<(), StoreError> {
        for transition in transitions {
            if transition.active {
                self.set(actor, transition.condition, true).await?;
            } else {
                self.remove(actor, transition.condition).await?;
            }
        }
        Ok(())
    }
}

/// Build the in-memory store for a strategy.
pub fn condition_store_for(strategy: ConditionStrategy) -> Arc<dyn ConditionStore> {
    match strategy {
        ConditionStrategy::Flags => Arc::new(FlagConditionStore::new()),
        ConditionStrategy::Effects => Arc::new(EffectConditionStore::new()),
    }
}

// ============================================================================
// Flag store
// ============================================================================

/// Boolean flags per actor. Reading an unset flag persists `false`.
#[derive(Debug, Default)]
pub struct FlagConditionStore {
    flags: RwLock<HashMap<TargetId, HashMap<Condition, bool>>>,
}

impl FlagConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored flags for an actor, including persisted `false` defaults.
    pub async fn stored_flags(&self, actor: &TargetId) -> HashMap<Condition, bool> {
        self.flags
            .read()
            .await
            .get(actor)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConditionStore for FlagConditionStore {
    async fn get(&self, actor: &TargetId, condition: Condition) -> Result<bool, StoreError> {
        if let Some(value) = self
            .flags
            .read()
            .await
            .get(actor)
            .and_then(|flags| flags.get(&condition))
        {
            return Ok(*value);
        }
        let mut flags = self.flags.write().await;
        let value = flags
            .entry(actor.clone())
            .or_default()
            .entry(condition)
            .or_insert(false);
        Ok(*value)
    }

    async fn set(
        &self,
        actor: &TargetId,
        condition: Condition,
        value: bool,
    ) -> Result<(), StoreError> {
        self.flags
            .write()
            .await
            .entry(actor.clone())
            .or_default()
            .insert(condition, value);
        Ok(())
    }

    async fn remove(&self, actor: &TargetId, condition: Condition) -> Result<(), StoreError> {
        if let Some(flags) = self.flags.write().await.get_mut(actor) {
            flags.remove(&condition);
        }
        Ok(())
    }

    fn strategy(&self) -> ConditionStrategy {
        ConditionStrategy::Flags
    }
}

// ============================================================================
// Effect store
// ============================================================================

/// An effect record attached to an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEffect {
    pub id: Uuid,
    pub condition: Condition,
    pub label: String,
}

/// Conditions as attached effect records. A condition is set while a record
/// for it exists.
#[derive(Debug, Default)]
pub struct EffectConditionStore {
    effects: RwLock<HashMap<TargetId, Vec<ConditionEffect>>>,
}

impl EffectConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn effects(&self, actor: &TargetId) -> Vec<ConditionEffect> {
        self.effects
            .read()
            .await
            .get(actor)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConditionStore for EffectConditionStore {
    async fn get(&self, actor: &TargetId, condition: Condition) -> Result<bool, StoreError> {
        Ok(self
            .effects
            .read()
            .await
            .get(actor)
            .is_some_and(|effects| effects.iter().any(|e| e.condition == condition)))
    }

    async fn set(
        &self,
        actor: &TargetId,
        condition: Condition,
        value: bool,
    ) -> Result<(), StoreError> {
        if !value {
            return self.remove(actor, condition).await;
        }
        let mut effects = self.effects.write().await;
        let attached = effects.entry(actor.clone()).or_default();
        if !attached.iter().any(|e| e.condition == condition) {
            attached.push(ConditionEffect {
                id: Uuid::new_v4(),
                condition,
                label: condition.label().to_string(),
            });
        }
        Ok(())
    }

    async fn remove(&self, actor: &TargetId, condition: Condition) -> Result<(), StoreError> {
        if let Some(attached) = self.effects.write().await.get_mut(actor) {
            attached.retain(|e| e.condition != condition);
        }
        Ok(())
    }

    fn strategy(&self) -> ConditionStrategy {
        ConditionStrategy::Effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_names() {
        for condition in Condition::ALL {
            assert_eq!(Condition::from_flag_name(condition.flag_name()), Some(condition));
        }
        assert_eq!(Condition::from_flag_name("Prone"), Some(Condition::Prone));
        assert_eq!(Condition::from_flag_name("stunned"), None);
    }

    #[test]
    fn test_condition_serde_uses_flag_names() {
        let json = serde_json::to_string(&ConditionTransition::set(Condition::Freefalling)).unwrap();
        assert_eq!(json, r#"{"condition":"freefalling","active":true}"#);
    }

    #[tokio::test]
    async fn test_flag_store_persists_default_on_read() {
        let store = FlagConditionStore::new();
        let actor = TargetId::from("a1");

        assert!(!store.get(&actor, Condition::Dying).await.unwrap());
        assert_eq!(
            store.stored_flags(&actor).await.get(&Condition::Dying),
            Some(&false)
        );
    }

    #[tokio::test]
    async fn test_flag_store_set_and_remove() {
        let store = FlagConditionStore::new();
        let actor = TargetId::from("a1");

        store.set(&actor, Condition::Unconscious, true).await.unwrap();
        assert!(store.get(&actor, Condition::Unconscious).await.unwrap());

        store.remove(&actor, Condition::Unconscious).await.unwrap();
        assert!(!store.get(&actor, Condition::Unconscious).await.unwrap());
    }

    #[tokio::test]
    async fn test_effect_store_attaches_one_record() {
        let store = EffectConditionStore::new();
        let actor = TargetId::from("a1");

        store.set(&actor, Condition::Prone, true).await.unwrap();
        store.set(&actor, Condition::Prone, true).await.unwrap();
        let effects = store.effects(&actor).await;
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].label, "Prone");

        store.set(&actor, Condition::Prone, false).await.unwrap();
        assert!(!store.get(&actor, Condition::Prone).await.unwrap());
        assert!(store.effects(&actor).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_and_apply_match_across_strategies() {
        for strategy in [ConditionStrategy::Flags, ConditionStrategy::Effects] {
            let store = condition_store_for(strategy);
            assert_eq!(store.strategy(), strategy);
            let actor = TargetId::from("a1");

            store
                .apply(
                    &actor,
                    &[
                        ConditionTransition::set(Condition::Injured),
                        ConditionTransition::set(Condition::Fatigued),
                        ConditionTransition::clear(Condition::Injured),
                    ],
                )
                .await
                .unwrap();

            let snapshot = store.snapshot(&actor).await.unwrap();
            assert_eq!(snapshot.iter().collect::<Vec<_>>(), vec![Condition::Fatigued]);
        }
    }

    #[test]
    fn test_condition_set() {
        let set: ConditionSet = [Condition::Dying, Condition::Prone].into_iter().collect();
        assert!(set.contains(Condition::Dying));
        assert!(!set.contains(Condition::Injured));
        assert!(!set.is_empty());
    }
}
