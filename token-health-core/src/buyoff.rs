//! Damage buyoff: graduated debilitation instead of an immediate knockout.
//!
//! Damage that exceeds a target's capacity escalates it through
//! `uninjured -> injured -> wounded -> dying`. Each step into `injured` or
//! `wounded` is bought off with a d6 roll; the leftover damage carries on to
//! the next step only while it exceeds that roll. `dying` is terminal.
//!
//! Every step also worsens the fatigue track (`fatigued`, then `exhausted`,
//! then `helpless`), and `wounded`/`dying` knock the target prone unless it
//! is freefalling.

use crate::conditions::{Condition, ConditionSet, ConditionTransition};
use crate::dice::Randomizer;
use crate::messages::MessageKey;
use serde::{Deserialize, Serialize};

/// Sides of the die rolled to absorb each step of spillover damage.
pub const BUYOFF_SIDES: u32 = 6;

/// Fatigue conditions, mildest first.
const FATIGUE_TRACK: [Condition; 3] = [
    Condition::Fatigued,
    Condition::Exhausted,
    Condition::Helpless,
];

/// Position on the debilitation track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuyoffState {
    Uninjured,
    Injured,
    Wounded,
    Dying,
}

impl BuyoffState {
    /// The most severe state recorded in `conditions`.
    pub fn from_conditions(conditions: &ConditionSet) -> Self {
        if conditions.contains(Condition::Dying) {
            BuyoffState::Dying
        } else if conditions.contains(Condition::Wounded) {
            BuyoffState::Wounded
        } else if conditions.contains(Condition::Injured) {
            BuyoffState::Injured
        } else {
            BuyoffState::Uninjured
        }
    }

    fn next(self) -> Self {
        match self {
            BuyoffState::Uninjured => BuyoffState::Injured,
            BuyoffState::Injured => BuyoffState::Wounded,
            BuyoffState::Wounded | BuyoffState::Dying => BuyoffState::Dying,
        }
    }

    /// The condition flag that marks this state.
    pub fn condition(&self) -> Option<Condition> {
        match self {
            BuyoffState::Uninjured => None,
            BuyoffState::Injured => Some(Condition::Injured),
            BuyoffState::Wounded => Some(Condition::Wounded),
            BuyoffState::Dying => Some(Condition::Dying),
        }
    }

    fn message(&self) -> Option<MessageKey> {
        match self {
            BuyoffState::Uninjured => None,
            BuyoffState::Injured => Some(MessageKey::Injured),
            BuyoffState::Wounded => Some(MessageKey::Wounded),
            BuyoffState::Dying => Some(MessageKey::Dying),
        }
    }
}

/// Result of one spillover resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpilloverOutcome {
    pub initial_state: BuyoffState,
    pub final_state: BuyoffState,
    /// Condition changes, empty when conditions are disabled.
    pub transitions: Vec<ConditionTransition>,
    /// Die results, in roll order.
    pub rolls: Vec<u32>,
    /// Status messages, in the order the states were entered.
    pub messages: Vec<MessageKey>,
    /// The target was already dying; nothing changed.
    pub already_down: bool,
}

/// Escalate a target through the debilitation track.
///
/// `remaining` is the damage left over after the target's capacity was used
/// up. `conditions` is the target's current condition set.
pub fn resolve_spillover(
    remaining: f64,
    conditions: &ConditionSet,
    enable_conditions: bool,
    dice: &dyn Randomizer,
) -> SpilloverOutcome {
    let initial_state = BuyoffState::from_conditions(conditions);
    let mut outcome = SpilloverOutcome {
        initial_state,
        final_state: initial_state,
        transitions: Vec::new(),
        rolls: Vec::new(),
        messages: Vec::new(),
        already_down: false,
    };

    if initial_state == BuyoffState::Dying {
        tracing::debug!("spillover on a dying target, nothing to do");
        outcome.already_down = true;
        outcome.messages.push(MessageKey::Dead);
        return outcome;
    }

    let mut working = conditions.clone();
    let mut state = initial_state;
    let mut remaining = remaining;

    loop {
        match state {
            BuyoffState::Uninjured | BuyoffState::Injured => {
                let roll = dice.roll_die(BUYOFF_SIDES);
                outcome.rolls.push(roll);
                state = state.next();
                enter(state, &mut working, &mut outcome);

                let absorbed = f64::from(roll);
                tracing::debug!(roll, remaining, ?state, "spillover roll");
                if remaining > absorbed {
                    remaining -= absorbed;
                } else {
                    break;
                }
            }
            BuyoffState::Wounded => {
                state = BuyoffState::Dying;
                enter(state, &mut working, &mut outcome);
                break;
            }
            BuyoffState::Dying => break,
        }
    }

    outcome.final_state = state;
    if !enable_conditions {
        outcome.transitions.clear();
    }
    outcome
}

fn enter(state: BuyoffState, working: &mut ConditionSet, outcome: &mut SpilloverOutcome) {
    if let Some(condition) = state.condition() {
        raise(condition, working, outcome);
    }

    if let Some(fatigue) = FATIGUE_TRACK.into_iter().find(|c| !working.contains(*c)) {
        raise(fatigue, working, outcome);
    }

    if matches!(state, BuyoffState::Wounded | BuyoffState::Dying)
        && !working.contains(Condition::Freefalling)
    {
        raise(Condition::Prone, working, outcome);
    }

    if let Some(key) = state.message() {
        outcome.messages.push(key);
    }
}

fn raise(condition: Condition, working: &mut ConditionSet, outcome: &mut SpilloverOutcome) {
    if !working.contains(condition) {
        working.insert(condition);
        outcome.transitions.push(ConditionTransition::set(condition));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRandomizer;

    fn set_conditions(outcome: &SpilloverOutcome) -> Vec<Condition> {
        outcome
            .transitions
            .iter()
            .filter(|t| t.active)
            .map(|t| t.condition)
            .collect()
    }

    #[test]
    fn test_small_spillover_stops_at_injured() {
        let dice = ScriptedRandomizer::new([4]);
        let outcome = resolve_spillover(2.0, &ConditionSet::new(), true, &dice);

        assert_eq!(outcome.final_state, BuyoffState::Injured);
        assert_eq!(outcome.rolls, vec![4]);
        assert_eq!(outcome.messages, vec![MessageKey::Injured]);
        assert_eq!(
            set_conditions(&outcome),
            vec![Condition::Injured, Condition::Fatigued]
        );
    }

    #[test]
    fn test_rolls_use_a_d6() {
        let dice = ScriptedRandomizer::new([9]);
        let outcome = resolve_spillover(6.0, &ConditionSet::new(), true, &dice);
        assert_eq!(outcome.rolls, vec![BUYOFF_SIDES]);
        assert_eq!(outcome.final_state, BuyoffState::Injured);
    }

    #[test]
    fn test_roll_equal_to_remaining_absorbs_it() {
        let dice = ScriptedRandomizer::new([2, 6]);
        let outcome = resolve_spillover(2.0, &ConditionSet::new(), true, &dice);
        assert_eq!(outcome.final_state, BuyoffState::Injured);
        assert_eq!(outcome.rolls.len(), 1);
    }

    #[test]
    fn test_cascade_to_wounded() {
        let dice = ScriptedRandomizer::new([1, 5]);
        let outcome = resolve_spillover(4.0, &ConditionSet::new(), true, &dice);

        assert_eq!(outcome.final_state, BuyoffState::Wounded);
        assert_eq!(outcome.rolls, vec![1, 5]);
        assert_eq!(outcome.messages, vec![MessageKey::Injured, MessageKey::Wounded]);
        assert_eq!(
            set_conditions(&outcome),
            vec![
                Condition::Injured,
                Condition::Fatigued,
                Condition::Wounded,
                Condition::Exhausted,
                Condition::Prone,
            ]
        );
    }

    #[test]
    fn test_cascade_all_the_way_to_dying() {
        let dice = ScriptedRandomizer::new([1, 1]);
        let outcome = resolve_spillover(10.0, &ConditionSet::new(), true, &dice);

        assert_eq!(outcome.final_state, BuyoffState::Dying);
        assert_eq!(outcome.rolls, vec![1, 1]);
        assert_eq!(
            outcome.messages,
            vec![MessageKey::Injured, MessageKey::Wounded, MessageKey::Dying]
        );
        let set = set_conditions(&outcome);
        assert!(set.contains(&Condition::Helpless));
        assert!(set.contains(&Condition::Dying));
        // Prone is raised once.
        assert_eq!(set.iter().filter(|c| **c == Condition::Prone).count(), 1);
    }

    #[test]
    fn test_injured_reentry_rolls_once() {
        let conditions = ConditionSet::new()
            .with(Condition::Injured)
            .with(Condition::Fatigued);
        let dice = ScriptedRandomizer::new([6]);
        let outcome = resolve_spillover(3.0, &conditions, true, &dice);

        assert_eq!(outcome.initial_state, BuyoffState::Injured);
        assert_eq!(outcome.final_state, BuyoffState::Wounded);
        assert_eq!(
            set_conditions(&outcome),
            vec![Condition::Wounded, Condition::Exhausted, Condition::Prone]
        );
    }

    #[test]
    fn test_wounded_goes_straight_to_dying() {
        let conditions = ConditionSet::new().with(Condition::Wounded);
        let dice = ScriptedRandomizer::default();
        let outcome = resolve_spillover(1.0, &conditions, true, &dice);

        assert_eq!(outcome.final_state, BuyoffState::Dying);
        assert!(outcome.rolls.is_empty());
        assert_eq!(outcome.messages, vec![MessageKey::Dying]);
    }

    #[test]
    fn test_dying_is_terminal() {
        let conditions = ConditionSet::new().with(Condition::Dying);
        let dice = ScriptedRandomizer::default();
        let outcome = resolve_spillover(50.0, &conditions, true, &dice);

        assert!(outcome.already_down);
        assert!(outcome.transitions.is_empty());
        assert!(outcome.rolls.is_empty());
        assert_eq!(outcome.messages, vec![MessageKey::Dead]);
    }

    #[test]
    fn test_freefalling_is_never_prone() {
        let conditions = ConditionSet::new().with(Condition::Freefalling);
        let dice = ScriptedRandomizer::new([1, 1]);
        let outcome = resolve_spillover(10.0, &conditions, true, &dice);
        assert!(!set_conditions(&outcome).contains(&Condition::Prone));
    }

    #[test]
    fn test_disabled_conditions_emit_messages_only() {
        let dice = ScriptedRandomizer::new([1, 6]);
        let outcome = resolve_spillover(3.0, &ConditionSet::new(), false, &dice);
        assert_eq!(outcome.final_state, BuyoffState::Wounded);
        assert!(outcome.transitions.is_empty());
        assert_eq!(outcome.messages, vec![MessageKey::Injured, MessageKey::Wounded]);
    }
}
