//! Damage and healing resolution for virtual-tabletop tokens.
//!
//! This crate provides:
//! - Attribute resolution from per-rule-set configuration
//! - The damage engine: mitigation, temporary pools, thresholds, messages
//! - The damage buyoff (spillover) state machine
//! - A caller-side session that commits outcomes through host collaborators
//!
//! # Quick Start
//!
//! ```ignore
//! use token_health_core::{
//!     ActingUser, Collaborators, DialogInput, HealthSettings, RuleSetProfile, TokenHealthSession,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = HealthSettings::for_profile(RuleSetProfile::Dnd5e);
//!     let collaborators = Collaborators::in_memory(settings.condition_strategy);
//!     let session = TokenHealthSession::new(settings, ActingUser::gm("gm"), collaborators);
//!
//!     let launch = session.launch(&selected_tokens)?;
//!     let report = session.apply(&DialogInput::damage("7"), &launch.targets).await?;
//!     for outcome in &report.outcomes {
//!         println!("{}: {}", outcome.target_name, outcome.gm_message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod buyoff;
pub mod conditions;
pub mod config;
pub mod dice;
pub mod engine;
pub mod health;
pub mod host;
pub mod messages;
pub mod profile;
pub mod resolver;
pub mod session;
pub mod testing;

// Primary public API
pub use buyoff::{resolve_spillover, BuyoffState, SpilloverOutcome};
pub use conditions::{
    condition_store_for, Condition, ConditionSet, ConditionStore, ConditionStrategy,
    ConditionTransition, EffectConditionStore, FlagConditionStore, StoreError,
};
pub use config::{
    ConfigurationError, ConfigurationProvider, HealthSettings, MitigationSetting, SettingValue,
    SettingsMap, SubtypeSettings,
};
pub use dice::{Randomizer, SeededRandomizer, ThreadRandomizer};
pub use engine::{ApplicationOutcome, DamageEngine, DamageRequest, EffectKind, Polarity};
pub use health::{compute_new_health, HealthResult, HealthSnapshot, Thresholds};
pub use host::{
    ActingUser, Announcer, AttributeUpdates, ChatLog, DataAccessor, JsonDataAccessor,
    MemoryUpdateSink, PersistenceFailure, Target, TargetId, UpdateSink, UserId, Whisper,
};
pub use messages::{MessageKey, MessageTemplates};
pub use profile::RuleSetProfile;
pub use resolver::{
    AltMaxRole, AttributeResolver, DamageSubtypeConfig, MitigationConfig, MitigationSource,
    SubtypeSlot,
};
pub use session::{
    parse_amount, ApplyReport, Collaborators, DialogInput, SessionError, TokenHealthSession,
};
pub use testing::TestHarness;
