//! Attribute resolution.
//!
//! Maps a damage subtype slot to the attribute paths that hold its current,
//! max, alternate max and temporary values, plus the mitigation sources that
//! apply to incoming damage.

use crate::config::{ConfigurationError, HealthSettings, SubtypeSettings};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used when a subtype has no configured name.
pub const DEFAULT_SUBTYPE_LABEL: &str = "HP";

/// At most this many mitigation sources are consulted.
pub const MAX_MITIGATION_SOURCES: usize = 3;

/// One of the two independently configured health pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubtypeSlot {
    Primary,
    Secondary,
}

impl SubtypeSlot {
    pub const ALL: [SubtypeSlot; 2] = [SubtypeSlot::Primary, SubtypeSlot::Secondary];

    /// Slot from its 1-based index.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(SubtypeSlot::Primary),
            2 => Some(SubtypeSlot::Secondary),
            _ => None,
        }
    }

    /// 1-based index, as used in setting keys.
    pub fn index(&self) -> u8 {
        match self {
            SubtypeSlot::Primary => 1,
            SubtypeSlot::Secondary => 2,
        }
    }

    /// 0-based offset into per-slot arrays.
    pub fn offset(&self) -> usize {
        usize::from(self.index() - 1)
    }
}

impl fmt::Display for SubtypeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// What the alternate max attribute means for a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AltMaxRole {
    /// Added on top of the max (temporary max HP).
    #[default]
    ExtendsMax,
    /// Upper bound of the temporary pool (stamina max).
    CapsTemp,
}

/// A single mitigation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationSource {
    pub attribute_path: String,
    /// `None` applies to every damage type.
    pub applies_to_damage_type: Option<String>,
}

impl MitigationSource {
    /// Whether this source reduces damage of the given type.
    pub fn applies_to(&self, damage_type: Option<&str>) -> bool {
        match (&self.applies_to_damage_type, damage_type) {
            (None, _) => true,
            (Some(required), Some(active)) => required.eq_ignore_ascii_case(active),
            (Some(_), None) => false,
        }
    }
}

/// Ordered mitigation sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationConfig {
    sources: Vec<MitigationSource>,
}

impl MitigationConfig {
    /// Builds a config, keeping only the first [`MAX_MITIGATION_SOURCES`] entries.
    pub fn new(mut sources: Vec<MitigationSource>) -> Self {
        sources.truncate(MAX_MITIGATION_SOURCES);
        Self { sources }
    }

    pub fn sources(&self) -> &[MitigationSource] {
        &self.sources
    }

    /// Sources that apply to the given damage type.
    pub fn applicable<'a>(
        &'a self,
        damage_type: Option<&'a str>,
    ) -> impl Iterator<Item = &'a MitigationSource> + 'a {
        self.sources.iter().filter(move |s| s.applies_to(damage_type))
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Resolved attribute paths for one damage subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageSubtypeConfig {
    pub slot: SubtypeSlot,
    pub label: String,
    pub current_value_path: String,
    pub max_value_path: String,
    pub alt_max_value_path: Option<String>,
    pub temp_value_path: Option<String>,
    pub alt_max_role: AltMaxRole,
    pub stun: bool,
    pub mitigation: MitigationConfig,
}

impl DamageSubtypeConfig {
    /// A bare config with only the mandatory paths, used for caller overrides.
    pub fn new(
        slot: SubtypeSlot,
        label: impl Into<String>,
        current_value_path: impl Into<String>,
        max_value_path: impl Into<String>,
    ) -> Self {
        Self {
            slot,
            label: label.into(),
            current_value_path: current_value_path.into(),
            max_value_path: max_value_path.into(),
            alt_max_value_path: None,
            temp_value_path: None,
            alt_max_role: AltMaxRole::default(),
            stun: false,
            mitigation: MitigationConfig::default(),
        }
    }

    pub fn with_temp(mut self, path: impl Into<String>) -> Self {
        self.temp_value_path = Some(path.into());
        self
    }

    pub fn with_alt_max(mut self, path: impl Into<String>, role: AltMaxRole) -> Self {
        self.alt_max_value_path = Some(path.into());
        self.alt_max_role = role;
        self
    }

    pub fn with_mitigation(mut self, mitigation: MitigationConfig) -> Self {
        self.mitigation = mitigation;
        self
    }

    pub fn as_stun(mut self) -> Self {
        self.stun = true;
        self
    }
}

/// Resolves subtype slots against a settings bundle.
#[derive(Debug, Clone, Copy)]
pub struct AttributeResolver<'a> {
    settings: &'a HealthSettings,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(settings: &'a HealthSettings) -> Self {
        Self { settings }
    }

    /// Resolve the attribute paths for `slot`.
    ///
    /// A caller-supplied override wins over the slot lookup. Otherwise the
    /// primary slot's current and max paths must be configured, and so must
    /// the requested slot's.
    pub fn resolve(
        &self,
        slot: SubtypeSlot,
        override_config: Option<&DamageSubtypeConfig>,
    ) -> Result<DamageSubtypeConfig, ConfigurationError> {
        if let Some(config) = override_config {
            return Ok(config.clone());
        }

        require_paths(&self.settings.primary, SubtypeSlot::Primary)?;
        let subtype = self.settings.subtype(slot);
        require_paths(subtype, slot)?;

        let label = match subtype.label.trim() {
            "" => DEFAULT_SUBTYPE_LABEL.to_string(),
            label => label.to_string(),
        };

        Ok(DamageSubtypeConfig {
            slot,
            label,
            current_value_path: subtype.current_path.trim().to_string(),
            max_value_path: subtype.max_path.trim().to_string(),
            alt_max_value_path: optional_path(&subtype.alt_max_path),
            temp_value_path: optional_path(&subtype.temp_path),
            alt_max_role: self.settings.alt_max_role,
            stun: subtype.stun,
            mitigation: self.mitigation(),
        })
    }

    /// Mitigation sources with a non-empty attribute path.
    pub fn mitigation(&self) -> MitigationConfig {
        let sources = self
            .settings
            .mitigation
            .iter()
            .filter_map(|m| {
                optional_path(&m.path).map(|attribute_path| MitigationSource {
                    attribute_path,
                    applies_to_damage_type: optional_path(&m.damage_type),
                })
            })
            .collect();
        MitigationConfig::new(sources)
    }
}

fn require_paths(subtype: &SubtypeSettings, slot: SubtypeSlot) -> Result<(), ConfigurationError> {
    if subtype.current_path.trim().is_empty() {
        return Err(ConfigurationError::MissingPath {
            slot,
            field: "current value",
        });
    }
    if subtype.max_path.trim().is_empty() {
        return Err(ConfigurationError::MissingPath {
            slot,
            field: "max value",
        });
    }
    Ok(())
}

fn optional_path(path: &str) -> Option<String> {
    match path.trim() {
        "" => None,
        path => Some(path.to_string()),
    }
}
