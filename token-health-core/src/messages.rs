//! Chat message templates.
//!
//! Templates may contain three placeholders:
//! - `$DS` - the damage subtype label (e.g. "Health", "Wounds")
//! - `$D` - the effective amount after mitigation
//! - `$NE` - the net effect actually applied after clamping

use crate::profile::RuleSetProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies one configurable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKey {
    /// Public reaction to taking damage.
    Ouch,
    /// GM note for exactly one point of damage.
    DamagePoint,
    /// GM note for several points of damage.
    DamagePoints,
    Unconscious,
    Dying,
    /// Damage applied to a target that is already down.
    Dead,
    /// Public reaction to being healed.
    Ty,
    HealingPoint,
    HealingPoints,
    /// Nothing happened (fully mitigated or nothing to heal).
    Meh,
    Injured,
    Wounded,
}

impl MessageKey {
    pub const ALL: [MessageKey; 12] = [
        MessageKey::Ouch,
        MessageKey::DamagePoint,
        MessageKey::DamagePoints,
        MessageKey::Unconscious,
        MessageKey::Dying,
        MessageKey::Dead,
        MessageKey::Ty,
        MessageKey::HealingPoint,
        MessageKey::HealingPoints,
        MessageKey::Meh,
        MessageKey::Injured,
        MessageKey::Wounded,
    ];

    /// The settings key this template is stored under.
    pub fn setting_key(&self) -> &'static str {
        match self {
            MessageKey::Ouch => "ouch",
            MessageKey::DamagePoint => "damagePoint",
            MessageKey::DamagePoints => "damagePoints",
            MessageKey::Unconscious => "unconscious",
            MessageKey::Dying => "dying",
            MessageKey::Dead => "dead",
            MessageKey::Ty => "ty",
            MessageKey::HealingPoint => "healingPoint",
            MessageKey::HealingPoints => "healingPoints",
            MessageKey::Meh => "meh",
            MessageKey::Injured => "injured",
            MessageKey::Wounded => "wounded",
        }
    }
}

lazy_static::lazy_static! {
    /// Rule-set specific wording layered over the English defaults.
    static ref FLAVOR: HashMap<RuleSetProfile, Vec<(MessageKey, &'static str)>> = {
        let mut table = HashMap::new();
        table.insert(
            RuleSetProfile::Swade,
            vec![
                (MessageKey::Unconscious, "Is Incapacitated!"),
                (MessageKey::Dying, "Is Incapacitated and bleeding out!"),
            ],
        );
        table.insert(
            RuleSetProfile::L5r5e,
            vec![
                (MessageKey::Unconscious, "Is Compromised!"),
                (MessageKey::Dying, "Is Incapacitated!"),
            ],
        );
        table.insert(
            RuleSetProfile::TorgEternity,
            vec![
                (MessageKey::Unconscious, "Is Knocked Out!"),
                (MessageKey::Dying, "Is Defeated!"),
            ],
        );
        table.insert(
            RuleSetProfile::AgeSystem,
            vec![
                (MessageKey::Injured, "Is Injured and Fatigued!"),
                (MessageKey::Wounded, "Is Wounded, Exhausted and Prone!"),
                (MessageKey::Dying, "Is Dying and Helpless!"),
                (MessageKey::Dead, "Is already Dying. Further damage has no effect."),
            ],
        );
        table.insert(
            RuleSetProfile::Expanse,
            vec![
                (MessageKey::Unconscious, "Is Taken Out!"),
                (MessageKey::Dying, "Is Taken Out and Dying!"),
            ],
        );
        table
    };
}

/// The full set of message templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplates {
    pub ouch: String,
    pub damage_point: String,
    pub damage_points: String,
    pub unconscious: String,
    pub dying: String,
    pub dead: String,
    pub ty: String,
    pub healing_point: String,
    pub healing_points: String,
    pub meh: String,
    pub injured: String,
    pub wounded: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            ouch: "Ouch!".to_string(),
            damage_point: "Took $D point of $DS damage.".to_string(),
            damage_points: "Took $D points of $DS damage ($NE applied).".to_string(),
            unconscious: "Falls unconscious!".to_string(),
            dying: "Is dying!".to_string(),
            dead: "Is already down.".to_string(),
            ty: "Thank you!".to_string(),
            healing_point: "Regained $NE point of $DS.".to_string(),
            healing_points: "Regained $NE points of $DS.".to_string(),
            meh: "Meh.".to_string(),
            injured: "Is injured!".to_string(),
            wounded: "Is badly wounded!".to_string(),
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct MessageVars<'a> {
    pub label: &'a str,
    pub amount: f64,
    pub net_effect: f64,
}

impl MessageTemplates {
    /// Defaults with the profile's flavor text applied.
    pub fn for_profile(profile: RuleSetProfile) -> Self {
        let mut templates = Self::default();
        if let Some(overrides) = FLAVOR.get(&profile) {
            for (key, text) in overrides {
                templates.set(*key, *text);
            }
        }
        templates
    }

    pub fn get(&self, key: MessageKey) -> &str {
        match key {
            MessageKey::Ouch => &self.ouch,
            MessageKey::DamagePoint => &self.damage_point,
            MessageKey::DamagePoints => &self.damage_points,
            MessageKey::Unconscious => &self.unconscious,
            MessageKey::Dying => &self.dying,
            MessageKey::Dead => &self.dead,
            MessageKey::Ty => &self.ty,
            MessageKey::HealingPoint => &self.healing_point,
            MessageKey::HealingPoints => &self.healing_points,
            MessageKey::Meh => &self.meh,
            MessageKey::Injured => &self.injured,
            MessageKey::Wounded => &self.wounded,
        }
    }

    pub fn set(&mut self, key: MessageKey, text: impl Into<String>) {
        let slot = match key {
            MessageKey::Ouch => &mut self.ouch,
            MessageKey::DamagePoint => &mut self.damage_point,
            MessageKey::DamagePoints => &mut self.damage_points,
            MessageKey::Unconscious => &mut self.unconscious,
            MessageKey::Dying => &mut self.dying,
            MessageKey::Dead => &mut self.dead,
            MessageKey::Ty => &mut self.ty,
            MessageKey::HealingPoint => &mut self.healing_point,
            MessageKey::HealingPoints => &mut self.healing_points,
            MessageKey::Meh => &mut self.meh,
            MessageKey::Injured => &mut self.injured,
            MessageKey::Wounded => &mut self.wounded,
        };
        *slot = text.into();
    }

    /// Render a template with its placeholders substituted.
    pub fn render(&self, key: MessageKey, vars: MessageVars<'_>) -> String {
        substitute(self.get(key), vars)
    }
}

/// Substitute `$DS`, `$NE` and `$D` in a template.
///
/// `$DS` and `$NE` are replaced before `$D` so the shorter token never eats
/// the prefix of a longer one.
pub fn substitute(template: &str, vars: MessageVars<'_>) -> String {
    template
        .replace("$DS", vars.label)
        .replace("$NE", &format_amount(vars.net_effect))
        .replace("$D", &format_amount(vars.amount))
}

/// Format a health amount for display, without a trailing `.0` when integral.
pub fn format_amount(value: f64) -> String {
    // Normalise negative zero so it never renders as "-0".
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(amount: f64, net_effect: f64) -> MessageVars<'static> {
        MessageVars {
            label: "Health",
            amount,
            net_effect,
        }
    }

    #[test]
    fn test_substitute_all_placeholders() {
        let text = substitute("$DS: $D dealt, $NE applied", vars(7.0, 5.0));
        assert_eq!(text, "Health: 7 dealt, 5 applied");
    }

    #[test]
    fn test_subtype_label_not_mangled_by_amount() {
        // "$DS" must not be treated as "$D" followed by "S".
        let text = substitute("$DS$D", vars(3.0, 0.0));
        assert_eq!(text, "Health3");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(5.0), "5");
        assert_eq!(format_amount(2.5), "2.5");
        assert_eq!(format_amount(-0.0), "0");
    }

    #[test]
    fn test_default_render() {
        let templates = MessageTemplates::default();
        assert_eq!(
            templates.render(MessageKey::DamagePoint, vars(1.0, 1.0)),
            "Took 1 point of Health damage."
        );
        assert_eq!(
            templates.render(MessageKey::HealingPoints, vars(4.0, 3.0)),
            "Regained 3 points of Health."
        );
    }

    #[test]
    fn test_profile_flavor_overrides_defaults() {
        let swade = MessageTemplates::for_profile(RuleSetProfile::Swade);
        assert_eq!(swade.get(MessageKey::Unconscious), "Is Incapacitated!");
        // Untouched keys keep the default wording.
        assert_eq!(swade.get(MessageKey::Ouch), "Ouch!");

        let generic = MessageTemplates::for_profile(RuleSetProfile::Generic);
        assert_eq!(generic, MessageTemplates::default());
    }

    #[test]
    fn test_set_and_get_every_key() {
        let mut templates = MessageTemplates::default();
        for key in MessageKey::ALL {
            templates.set(key, key.setting_key());
        }
        for key in MessageKey::ALL {
            assert_eq!(templates.get(key), key.setting_key());
        }
    }
}
