//! Settings for damage resolution.
//!
//! [`HealthSettings`] starts from a rule-set profile's defaults and is then
//! overridden key by key from any [`ConfigurationProvider`]. Keys are the
//! stable setting identifiers listed in [`keys`].

use crate::conditions::ConditionStrategy;
use crate::health::Thresholds;
use crate::messages::{MessageKey, MessageTemplates};
use crate::profile::RuleSetProfile;
use crate::resolver::{AltMaxRole, SubtypeSlot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing mandatory {field} attribute path for damage subtype {slot}")]
    MissingPath {
        slot: SubtypeSlot,
        field: &'static str,
    },

    #[error("Invalid value for setting '{key}': expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("Invalid settings document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Stable setting identifiers.
pub mod keys {
    pub const DAMAGE_TYPE: [&str; 3] = ["damageType1", "damageType2", "damageType3"];
    pub const UNMITIGATED_DAMAGE_TYPE: &str = "unmitigatedDamageType";
    pub const MITIGATION_SOURCE: [&str; 3] =
        ["mitigationSource1", "mitigationSource2", "mitigationSource3"];
    pub const MITIGATION_TYPE: [&str; 3] =
        ["mitigationType1", "mitigationType2", "mitigationType3"];

    pub const DAMAGE_SUBTYPE: [&str; 2] = ["damageSubtype1", "damageSubtype2"];
    pub const HP_SOURCE: [&str; 2] = ["hpSource1", "hpSource2"];
    pub const HP_SOURCE_MAX: [&str; 2] = ["hpSourceMax1", "hpSourceMax2"];
    pub const ALT_HP_SOURCE_MAX: [&str; 2] = ["altHpSourceMax1", "altHpSourceMax2"];
    pub const TEMP_HP_SOURCE: [&str; 2] = ["tempHpSource1", "tempHpSource2"];
    pub const STUN_SUBTYPE: &str = "stunSubtype";

    pub const ALLOW_NEGATIVE: &str = "allowNegative";
    pub const KO_THRESHOLD: &str = "koThreshold";
    pub const DEATH_THRESHOLD: &str = "deathThreshold";
    pub const ADDITIVE_DAMAGE: &str = "damageAdds";
    pub const ALLOW_DAMAGE_BUYOFF: &str = "allowDamageBuyoff";
    pub const ENABLE_CONDITIONS: &str = "enableConditions";
    pub const ENABLE_CHAT: &str = "enableChat";
    pub const RESTRICT_PLAYER_LAUNCH: &str = "restrictPlayerLaunch";
    pub const ACCESS: &str = "access";
}

/// A scalar setting value as handed over by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

/// Source of setting values, keyed by the identifiers in [`keys`].
pub trait ConfigurationProvider {
    /// Returns the value stored under `key`, or `None` to keep the default.
    fn get(&self, key: &str) -> Option<SettingValue>;
}

/// `HashMap`-backed provider.
#[derive(Debug, Clone, Default)]
pub struct SettingsMap {
    values: HashMap<String, SettingValue>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat JSON object of `key: scalar` pairs.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let values: HashMap<String, SettingValue> = serde_json::from_str(json)?;
        Ok(Self { values })
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigurationProvider for SettingsMap {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).cloned()
    }
}

/// Attribute paths for one damage subtype slot. Empty strings mean "not configured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtypeSettings {
    pub label: String,
    pub current_path: String,
    pub max_path: String,
    pub alt_max_path: String,
    pub temp_path: String,
    /// Stun-style pool: only ever knocks out, never triggers dying or buyoff.
    pub stun: bool,
}

impl SubtypeSettings {
    pub fn new(
        label: impl Into<String>,
        current_path: impl Into<String>,
        max_path: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            current_path: current_path.into(),
            max_path: max_path.into(),
            ..Default::default()
        }
    }

    pub fn with_alt_max(mut self, path: impl Into<String>) -> Self {
        self.alt_max_path = path.into();
        self
    }

    pub fn with_temp(mut self, path: impl Into<String>) -> Self {
        self.temp_path = path.into();
        self
    }

    pub fn as_stun(mut self) -> Self {
        self.stun = true;
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.current_path.trim().is_empty() && !self.max_path.trim().is_empty()
    }
}

/// One mitigation source. An empty `damage_type` applies to every damage type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MitigationSetting {
    pub path: String,
    pub damage_type: String,
}

impl MitigationSetting {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            damage_type: String::new(),
        }
    }

    pub fn for_damage_type(mut self, damage_type: impl Into<String>) -> Self {
        self.damage_type = damage_type.into();
        self
    }
}

/// The complete configuration bundle for damage resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSettings {
    pub profile: RuleSetProfile,
    pub primary: SubtypeSettings,
    pub secondary: SubtypeSettings,
    /// Damage type labels offered to the user (empty = unused).
    pub damage_types: [String; 3],
    /// Damage type that ignores all mitigation (empty = none).
    pub unmitigated_damage_type: String,
    pub mitigation: [MitigationSetting; 3],
    pub allow_negative: bool,
    pub ko_threshold: f64,
    pub death_threshold: f64,
    pub additive_damage: bool,
    pub allow_damage_buyoff: bool,
    pub enable_conditions: bool,
    pub enable_chat: bool,
    pub restrict_player_launch: bool,
    /// Notice shown when a user launches the dialog without owning any target.
    pub access_message: String,
    pub messages: MessageTemplates,
    pub condition_strategy: ConditionStrategy,
    pub alt_max_role: AltMaxRole,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self::for_profile(RuleSetProfile::Generic)
    }
}

impl HealthSettings {
    /// Defaults for a rule-set profile.
    pub fn for_profile(profile: RuleSetProfile) -> Self {
        let mut settings = Self {
            profile,
            primary: SubtypeSettings::default(),
            secondary: SubtypeSettings::default(),
            damage_types: Default::default(),
            unmitigated_damage_type: String::new(),
            mitigation: Default::default(),
            allow_negative: false,
            ko_threshold: 0.0,
            death_threshold: 0.0,
            additive_damage: profile.uses_additive_damage(),
            allow_damage_buyoff: false,
            enable_conditions: false,
            enable_chat: true,
            restrict_player_launch: true,
            access_message: "You do not own any of the selected tokens.".to_string(),
            messages: MessageTemplates::for_profile(profile),
            condition_strategy: profile.condition_strategy(),
            alt_max_role: profile.alt_max_role(),
        };

        match profile {
            RuleSetProfile::Dnd5e | RuleSetProfile::Pf1 | RuleSetProfile::Pf2e => {
                settings.primary =
                    SubtypeSettings::new("Health", "attributes.hp.value", "attributes.hp.max")
                        .with_alt_max("attributes.hp.tempmax")
                        .with_temp("attributes.hp.temp");
            }
            RuleSetProfile::Swade => {
                settings.primary = SubtypeSettings::new("Wounds", "wounds.value", "wounds.max");
                settings.secondary =
                    SubtypeSettings::new("Fatigue", "fatigue.value", "fatigue.max");
            }
            RuleSetProfile::L5r5e => {
                settings.primary = SubtypeSettings::new("Strife", "strife.value", "strife.max");
                settings.secondary =
                    SubtypeSettings::new("Fatigue", "fatigue.value", "fatigue.max");
            }
            RuleSetProfile::TorgEternity => {
                settings.primary = SubtypeSettings::new("Wounds", "wounds.value", "wounds.max");
                settings.secondary = SubtypeSettings::new("Shock", "shock.value", "shock.max");
            }
            RuleSetProfile::AgeSystem => {
                settings.damage_types = [
                    "Impact".to_string(),
                    "Ballistic".to_string(),
                    "Penetrating".to_string(),
                ];
                settings.unmitigated_damage_type = "Penetrating".to_string();
                settings.primary = SubtypeSettings::new("Wound", "health.value", "health.max");
                settings.secondary =
                    SubtypeSettings::new("Stun", "health.value", "health.max").as_stun();
                settings.mitigation = [
                    MitigationSetting::new("armor.toughness.total"),
                    MitigationSetting::new("armor.impact").for_damage_type("Impact"),
                    MitigationSetting::new("armor.ballistic").for_damage_type("Ballistic"),
                ];
                settings.enable_conditions = true;
            }
            RuleSetProfile::Expanse => {
                settings.damage_types = [
                    "Impact".to_string(),
                    "Ballistic".to_string(),
                    "Penetrating".to_string(),
                ];
                settings.unmitigated_damage_type = "Penetrating".to_string();
                settings.primary = SubtypeSettings::new("Wound", "fortune.value", "fortune.max");
                settings.secondary =
                    SubtypeSettings::new("Stun", "fortune.value", "fortune.max").as_stun();
                settings.mitigation = [
                    MitigationSetting::new("toughness.modified"),
                    MitigationSetting::new("armor.modified"),
                    MitigationSetting::default(),
                ];
            }
            RuleSetProfile::Sfrpg => {
                settings.primary =
                    SubtypeSettings::new("Health", "attributes.hp.value", "attributes.hp.max")
                        .with_alt_max("attributes.sp.max")
                        .with_temp("attributes.sp.value");
            }
            RuleSetProfile::Generic => {
                settings.primary = SubtypeSettings::new("Health", "health.value", "health.max");
            }
        }

        settings
    }

    /// Profile defaults overridden by every key the provider knows.
    pub fn from_provider(
        profile: RuleSetProfile,
        provider: &dyn ConfigurationProvider,
    ) -> Result<Self, ConfigurationError> {
        let mut settings = Self::for_profile(profile);
        settings.apply_provider(provider)?;
        Ok(settings)
    }

    /// Override fields from a provider. Keys the provider does not know keep
    /// their current value.
    pub fn apply_provider(
        &mut self,
        provider: &dyn ConfigurationProvider,
    ) -> Result<(), ConfigurationError> {
        for (i, key) in keys::DAMAGE_TYPE.iter().enumerate() {
            if let Some(value) = text(provider, key)? {
                self.damage_types[i] = value;
            }
        }
        if let Some(value) = text(provider, keys::UNMITIGATED_DAMAGE_TYPE)? {
            self.unmitigated_damage_type = value;
        }
        for i in 0..3 {
            if let Some(value) = text(provider, keys::MITIGATION_SOURCE[i])? {
                self.mitigation[i].path = value;
            }
            if let Some(value) = text(provider, keys::MITIGATION_TYPE[i])? {
                self.mitigation[i].damage_type = value;
            }
        }

        for slot in SubtypeSlot::ALL {
            let i = slot.offset();
            let subtype = self.subtype_mut(slot);
            if let Some(value) = text(provider, keys::DAMAGE_SUBTYPE[i])? {
                subtype.label = value;
            }
            if let Some(value) = text(provider, keys::HP_SOURCE[i])? {
                subtype.current_path = value;
            }
            if let Some(value) = text(provider, keys::HP_SOURCE_MAX[i])? {
                subtype.max_path = value;
            }
            if let Some(value) = text(provider, keys::ALT_HP_SOURCE_MAX[i])? {
                subtype.alt_max_path = value;
            }
            if let Some(value) = text(provider, keys::TEMP_HP_SOURCE[i])? {
                subtype.temp_path = value;
            }
        }
        if let Some(value) = number(provider, keys::STUN_SUBTYPE)? {
            let slot = SubtypeSlot::from_index(value.round() as i64);
            self.primary.stun = slot == Some(SubtypeSlot::Primary);
            self.secondary.stun = slot == Some(SubtypeSlot::Secondary);
        }

        if let Some(value) = flag(provider, keys::ALLOW_NEGATIVE)? {
            self.allow_negative = value;
        }
        if let Some(value) = number(provider, keys::KO_THRESHOLD)? {
            self.ko_threshold = value;
        }
        if let Some(value) = number(provider, keys::DEATH_THRESHOLD)? {
            self.death_threshold = value;
        }
        if let Some(value) = flag(provider, keys::ADDITIVE_DAMAGE)? {
            self.additive_damage = value;
        }
        if let Some(value) = flag(provider, keys::ALLOW_DAMAGE_BUYOFF)? {
            self.allow_damage_buyoff = value;
        }
        if let Some(value) = flag(provider, keys::ENABLE_CONDITIONS)? {
            self.enable_conditions = value;
        }
        if let Some(value) = flag(provider, keys::ENABLE_CHAT)? {
            self.enable_chat = value;
        }
        if let Some(value) = flag(provider, keys::RESTRICT_PLAYER_LAUNCH)? {
            self.restrict_player_launch = value;
        }
        if let Some(value) = text(provider, keys::ACCESS)? {
            self.access_message = value;
        }

        for key in MessageKey::ALL {
            if let Some(value) = text(provider, key.setting_key())? {
                self.messages.set(key, value);
            }
        }

        Ok(())
    }

    pub fn subtype(&self, slot: SubtypeSlot) -> &SubtypeSettings {
        match slot {
            SubtypeSlot::Primary => &self.primary,
            SubtypeSlot::Secondary => &self.secondary,
        }
    }

    pub fn subtype_mut(&mut self, slot: SubtypeSlot) -> &mut SubtypeSettings {
        match slot {
            SubtypeSlot::Primary => &mut self.primary,
            SubtypeSlot::Secondary => &mut self.secondary,
        }
    }

    /// Rounded and clamped KO/death thresholds for subtractive pools.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::normalized(self.ko_threshold, self.death_threshold, self.allow_negative)
    }

    pub fn with_subtype(mut self, slot: SubtypeSlot, subtype: SubtypeSettings) -> Self {
        *self.subtype_mut(slot) = subtype;
        self
    }

    pub fn with_mitigation(mut self, mitigation: [MitigationSetting; 3]) -> Self {
        self.mitigation = mitigation;
        self
    }

    pub fn with_unmitigated_damage_type(mut self, damage_type: impl Into<String>) -> Self {
        self.unmitigated_damage_type = damage_type.into();
        self
    }

    pub fn with_allow_negative(mut self, allow: bool) -> Self {
        self.allow_negative = allow;
        self
    }

    pub fn with_thresholds(mut self, ko: f64, death: f64) -> Self {
        self.ko_threshold = ko;
        self.death_threshold = death;
        self
    }

    pub fn with_additive_damage(mut self, additive: bool) -> Self {
        self.additive_damage = additive;
        self
    }

    pub fn with_damage_buyoff(mut self, allow: bool) -> Self {
        self.allow_damage_buyoff = allow;
        self
    }

    pub fn with_conditions(mut self, enable: bool) -> Self {
        self.enable_conditions = enable;
        self
    }

    pub fn with_chat(mut self, enable: bool) -> Self {
        self.enable_chat = enable;
        self
    }

    pub fn with_restrict_player_launch(mut self, restrict: bool) -> Self {
        self.restrict_player_launch = restrict;
        self
    }

    pub fn with_messages(mut self, messages: MessageTemplates) -> Self {
        self.messages = messages;
        self
    }
}

fn text(
    provider: &dyn ConfigurationProvider,
    key: &str,
) -> Result<Option<String>, ConfigurationError> {
    match provider.get(key) {
        None => Ok(None),
        Some(SettingValue::Text(value)) => Ok(Some(value.trim().to_string())),
        Some(_) => Err(invalid(key, "a string")),
    }
}

fn flag(provider: &dyn ConfigurationProvider, key: &str) -> Result<Option<bool>, ConfigurationError> {
    match provider.get(key) {
        None => Ok(None),
        Some(SettingValue::Bool(value)) => Ok(Some(value)),
        Some(SettingValue::Text(value)) => match value.trim() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(invalid(key, "a boolean")),
        },
        Some(SettingValue::Number(_)) => Err(invalid(key, "a boolean")),
    }
}

/// Numeric setting. An empty string counts as 0, like an unset number field.
fn number(provider: &dyn ConfigurationProvider, key: &str) -> Result<Option<f64>, ConfigurationError> {
    let value = match provider.get(key) {
        None => return Ok(None),
        Some(SettingValue::Number(value)) => value,
        Some(SettingValue::Text(value)) if value.trim().is_empty() => 0.0,
        Some(SettingValue::Text(value)) => value
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(key, "a number"))?,
        Some(SettingValue::Bool(_)) => return Err(invalid(key, "a number")),
    };
    if value.is_finite() {
        Ok(Some(value))
    } else {
        Err(invalid(key, "a finite number"))
    }
}

fn invalid(key: &str, expected: &'static str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnd5e_defaults() {
        let settings = HealthSettings::for_profile(RuleSetProfile::Dnd5e);
        assert_eq!(settings.primary.label, "Health");
        assert_eq!(settings.primary.current_path, "attributes.hp.value");
        assert_eq!(settings.primary.temp_path, "attributes.hp.temp");
        assert!(!settings.secondary.is_configured());
        assert!(!settings.additive_damage);
        assert!(settings.enable_chat);
    }

    #[test]
    fn test_swade_is_additive_with_two_pools() {
        let settings = HealthSettings::for_profile(RuleSetProfile::Swade);
        assert!(settings.additive_damage);
        assert!(settings.primary.is_configured());
        assert!(settings.secondary.is_configured());
        assert_eq!(settings.secondary.label, "Fatigue");
    }

    #[test]
    fn test_age_system_defaults() {
        let settings = HealthSettings::for_profile(RuleSetProfile::AgeSystem);
        assert!(settings.secondary.stun);
        assert!(!settings.primary.stun);
        assert!(settings.enable_conditions);
        assert!(!settings.allow_damage_buyoff);
        assert_eq!(settings.unmitigated_damage_type, "Penetrating");
        assert_eq!(settings.mitigation[1].damage_type, "Impact");
        assert_eq!(settings.condition_strategy, ConditionStrategy::Effects);
    }

    #[test]
    fn test_provider_overrides_defaults() {
        let provider = SettingsMap::new()
            .with(keys::HP_SOURCE[0], "hp.current")
            .with(keys::ALLOW_NEGATIVE, true)
            .with(keys::DEATH_THRESHOLD, -10.0)
            .with("ouch", "Argh!");

        let settings =
            HealthSettings::from_provider(RuleSetProfile::Generic, &provider).unwrap();
        assert_eq!(settings.primary.current_path, "hp.current");
        // Untouched keys keep the profile default.
        assert_eq!(settings.primary.max_path, "health.max");
        assert!(settings.allow_negative);
        assert_eq!(settings.death_threshold, -10.0);
        assert_eq!(settings.messages.ouch, "Argh!");
    }

    #[test]
    fn test_provider_rejects_wrong_types() {
        let provider = SettingsMap::new().with(keys::ENABLE_CHAT, 3.0);
        let err = HealthSettings::from_provider(RuleSetProfile::Generic, &provider).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { ref key, .. } if key == "enableChat"));

        let provider = SettingsMap::new().with(keys::KO_THRESHOLD, "lots");
        assert!(HealthSettings::from_provider(RuleSetProfile::Generic, &provider).is_err());
    }

    #[test]
    fn test_empty_threshold_counts_as_zero() {
        let provider = SettingsMap::new().with(keys::KO_THRESHOLD, "");
        let mut settings = HealthSettings::default().with_thresholds(5.0, 5.0);
        settings.apply_provider(&provider).unwrap();
        assert_eq!(settings.ko_threshold, 0.0);
        assert_eq!(settings.death_threshold, 5.0);
    }

    #[test]
    fn test_settings_map_from_json() {
        let provider = SettingsMap::from_json(
            r#"{"hpSource1": "hp.value", "damageAdds": true, "koThreshold": 2, "stunSubtype": 2}"#,
        )
        .unwrap();
        assert_eq!(provider.len(), 4);

        let settings = HealthSettings::from_provider(RuleSetProfile::Generic, &provider).unwrap();
        assert!(settings.additive_damage);
        assert_eq!(settings.ko_threshold, 2.0);
        assert!(settings.secondary.stun);
        assert!(!settings.primary.stun);
    }

    #[test]
    fn test_settings_map_rejects_malformed_json() {
        let err = SettingsMap::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigurationError::Document(_)));
    }

    #[test]
    fn test_thresholds_are_normalized() {
        let settings = HealthSettings::default().with_thresholds(2.6, -3.0);
        let thresholds = settings.thresholds();
        assert_eq!(thresholds.ko, 3.0);
        assert_eq!(thresholds.death, 0.0);

        let thresholds = settings.with_allow_negative(true).thresholds();
        assert_eq!(thresholds.death, -3.0);
    }
}
