//! QA tests for damage buyoff (spillover into injury states).

use std::sync::Arc;
use token_health_core::testing::{
    assert_current, assert_no_transitions, assert_transition, hp_target, ScriptedRandomizer,
    TestHarness,
};
use token_health_core::{
    ActingUser, Condition, ConditionStore, DamageEngine, DamageRequest, DialogInput,
    FlagConditionStore, HealthSettings, JsonDataAccessor, Polarity, RuleSetProfile,
    SeededRandomizer, Target, TargetId,
};

fn buyoff_settings() -> HealthSettings {
    HealthSettings::default()
        .with_damage_buyoff(true)
        .with_conditions(true)
}

#[tokio::test]
async fn test_spillover_remaining_damage_is_rolled_against() {
    let settings = buyoff_settings();
    let user = ActingUser::gm("gm");
    let targets = vec![hp_target("t1", 3.0, 10.0)];
    let dice = Arc::new(ScriptedRandomizer::new([4]));
    let engine = DamageEngine::new(
        Arc::new(JsonDataAccessor),
        Arc::new(FlagConditionStore::new()),
        dice.clone(),
    );

    let request = DamageRequest::new(&settings, &targets, &user, 5.0, Polarity::Damage);
    let outcomes = engine.apply_damage(&request).await.unwrap();
    let outcome = &outcomes[0];

    assert_current(outcome, 0.0);
    // 2 points spill over and a roll of 4 absorbs them at "injured".
    assert_eq!(outcome.rolls, vec![4]);
    assert_eq!(dice.remaining(), 0);
    assert_transition(outcome, Condition::Injured, true);
    assert_transition(outcome, Condition::Fatigued, true);
    assert!(!outcome
        .condition_transitions
        .iter()
        .any(|t| t.condition == Condition::Unconscious || t.condition == Condition::Wounded));
    assert_eq!(outcome.status_messages, vec!["Is injured!".to_string()]);
}

#[tokio::test]
async fn test_spillover_cascades_to_dying() {
    let settings = buyoff_settings();
    let user = ActingUser::gm("gm");
    let targets = vec![hp_target("t1", 3.0, 10.0)];
    let engine = DamageEngine::new(
        Arc::new(JsonDataAccessor),
        Arc::new(FlagConditionStore::new()),
        Arc::new(ScriptedRandomizer::new([1, 1])),
    );

    let request = DamageRequest::new(&settings, &targets, &user, 10.0, Polarity::Damage);
    let outcomes = engine.apply_damage(&request).await.unwrap();
    let outcome = &outcomes[0];

    for condition in [
        Condition::Injured,
        Condition::Wounded,
        Condition::Dying,
        Condition::Fatigued,
        Condition::Exhausted,
        Condition::Helpless,
        Condition::Prone,
    ] {
        assert_transition(outcome, condition, true);
    }
    assert_eq!(
        outcome.status_messages,
        vec![
            "Is injured!".to_string(),
            "Is badly wounded!".to_string(),
            "Is dying!".to_string()
        ]
    );
}

#[tokio::test]
async fn test_dying_target_is_already_down() {
    let settings = buyoff_settings();
    let user = ActingUser::gm("gm");
    let targets = vec![hp_target("t1", 0.0, 10.0)];
    let store = Arc::new(FlagConditionStore::new());
    store
        .set(&TargetId::from("t1"), Condition::Dying, true)
        .await
        .unwrap();
    let dice = Arc::new(ScriptedRandomizer::new([6, 6]));
    let engine = DamageEngine::new(Arc::new(JsonDataAccessor), store, dice.clone());

    let request = DamageRequest::new(&settings, &targets, &user, 5.0, Polarity::Damage);
    let outcomes = engine.apply_damage(&request).await.unwrap();
    let outcome = &outcomes[0];

    assert_no_transitions(outcome);
    assert!(outcome.rolls.is_empty());
    assert_eq!(dice.remaining(), 2);
    assert_eq!(outcome.status_messages, vec!["Is already down.".to_string()]);
}

#[tokio::test]
async fn test_damage_within_capacity_never_spills() {
    let settings = buyoff_settings();
    let user = ActingUser::gm("gm");
    let targets = vec![hp_target("t1", 8.0, 10.0)];
    let dice = Arc::new(ScriptedRandomizer::new([3]));
    let engine = DamageEngine::new(
        Arc::new(JsonDataAccessor),
        Arc::new(FlagConditionStore::new()),
        dice.clone(),
    );

    let request = DamageRequest::new(&settings, &targets, &user, 8.0, Polarity::Damage);
    let outcomes = engine.apply_damage(&request).await.unwrap();
    assert_current(&outcomes[0], 0.0);
    assert_no_transitions(&outcomes[0]);
    assert_eq!(dice.remaining(), 1);
}

#[tokio::test]
async fn test_buyoff_progresses_across_applications() {
    let harness = TestHarness::new(buyoff_settings());
    let targets = vec![hp_target("t1", 0.0, 10.0)];

    harness.expect_rolls([6]);
    harness
        .apply(&DialogInput::damage("2"), &targets)
        .await
        .unwrap();
    assert!(harness.has_condition("t1", Condition::Injured).await);
    assert!(harness.has_condition("t1", Condition::Fatigued).await);
    assert!(!harness.has_condition("t1", Condition::Prone).await);

    harness.expect_rolls([6]);
    harness
        .apply(&DialogInput::damage("2"), &targets)
        .await
        .unwrap();
    assert!(harness.has_condition("t1", Condition::Wounded).await);
    assert!(harness.has_condition("t1", Condition::Exhausted).await);
    assert!(harness.has_condition("t1", Condition::Prone).await);

    harness
        .apply(&DialogInput::damage("1"), &targets)
        .await
        .unwrap();
    assert!(harness.has_condition("t1", Condition::Dying).await);
    assert!(harness.has_condition("t1", Condition::Helpless).await);

    let report = harness
        .apply(&DialogInput::damage("9"), &targets)
        .await
        .unwrap();
    assert_no_transitions(&report.outcomes[0]);
    let chat: Vec<String> = harness
        .chat_for("t1")
        .into_iter()
        .map(|entry| entry.message)
        .collect();
    assert!(chat.contains(&"Is already down.".to_string()));
}

#[tokio::test]
async fn test_freefalling_target_is_not_knocked_prone() {
    let harness = TestHarness::new(buyoff_settings());
    let targets = vec![hp_target("t1", 0.0, 10.0)];
    harness
        .given_conditions("t1", &[Condition::Freefalling, Condition::Injured])
        .await;

    harness.expect_rolls([1]);
    harness
        .apply(&DialogInput::damage("5"), &targets)
        .await
        .unwrap();

    assert!(harness.has_condition("t1", Condition::Dying).await);
    assert!(!harness.has_condition("t1", Condition::Prone).await);
}

#[tokio::test]
async fn test_age_system_buyoff_uses_effect_records() {
    let settings = HealthSettings::for_profile(RuleSetProfile::AgeSystem).with_damage_buyoff(true);
    let harness = TestHarness::new(settings);
    let targets = vec![Target::new("t1", "Operative")
        .with_attribute("health.value", 2)
        .with_attribute("health.max", 12)];

    harness.expect_rolls([5]);
    let report = harness
        .apply(&DialogInput::damage("4"), &targets)
        .await
        .unwrap();

    assert_eq!(
        report.outcomes[0].status_messages,
        vec!["Is Injured and Fatigued!".to_string()]
    );
    assert!(harness.has_condition("t1", Condition::Injured).await);
    assert_eq!(
        harness.conditions.strategy(),
        token_health_core::ConditionStrategy::Effects
    );
}

#[tokio::test]
async fn test_seeded_rolls_are_reproducible() {
    let settings = buyoff_settings();
    let user = ActingUser::gm("gm");
    let targets = vec![hp_target("t1", 0.0, 10.0)];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let engine = DamageEngine::new(
            Arc::new(JsonDataAccessor),
            Arc::new(FlagConditionStore::new()),
            Arc::new(SeededRandomizer::new(1234)),
        );
        let request = DamageRequest::new(&settings, &targets, &user, 9.0, Polarity::Damage);
        let outcomes = engine.apply_damage(&request).await.unwrap();
        runs.push(outcomes[0].rolls.clone());
    }
    assert_eq!(runs[0], runs[1]);
    assert!(!runs[0].is_empty());
}
