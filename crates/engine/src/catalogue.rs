//! Immutable item and effectiveness tables handed to the collector.

use crate::error::{CoverageError, Result};
use serde::{Deserialize, Serialize};

/// Effectiveness categories, in the fixed order readouts are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effectiveness {
    NoEffect,
    NotVeryEffective,
    Normal,
    SuperEffective,
}

impl Effectiveness {
    pub const ALL: [Effectiveness; 4] = [
        Effectiveness::NoEffect,
        Effectiveness::NotVeryEffective,
        Effectiveness::Normal,
        Effectiveness::SuperEffective,
    ];
}

/// One effectiveness category with its display name and the identifier of
/// the readout that shows its value on the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectLabel {
    pub category: Effectiveness,
    pub name: String,
    pub readout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalogue {
    /// Display names, item `i` lives at `items[i - 1]`.
    pub items: Vec<String>,
    pub effects: Vec<EffectLabel>,
    #[serde(default = "default_column_prefix")]
    pub column_prefix: String,
}

fn default_column_prefix() -> String {
    "Type".to_string()
}

const POKEMON_TYPES: [&str; 18] = [
    "Normal", "Fire", "Water", "Electric", "Grass", "Ice", "Fighting", "Poison", "Ground",
    "Flying", "Psychic", "Bug", "Rock", "Ghost", "Dragon", "Dark", "Steel", "Fairy",
];

const POKEMON_EFFECTS: [(Effectiveness, &str, &str); 4] = [
    (Effectiveness::NoEffect, "No Effect", "total-noeffect"),
    (
        Effectiveness::NotVeryEffective,
        "Not Very Effective",
        "total-notveffective",
    ),
    (
        Effectiveness::Normal,
        "Normal Effectiveness",
        "total-normeffective",
    ),
    (
        Effectiveness::SuperEffective,
        "Super Effective",
        "total-supereffective",
    ),
];

impl Catalogue {
    /// Validated constructor; effects must cover the four categories in order.
    pub fn new(items: Vec<String>, effects: Vec<EffectLabel>) -> Result<Self> {
        let catalogue = Self {
            items,
            effects,
            column_prefix: default_column_prefix(),
        };
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// The 18 Pokémon types and the readouts of the Pokémon Database
    /// type coverage calculator.
    pub fn pokemon() -> Self {
        Self {
            items: POKEMON_TYPES.iter().map(|s| s.to_string()).collect(),
            effects: POKEMON_EFFECTS
                .iter()
                .map(|(category, name, readout)| EffectLabel {
                    category: *category,
                    name: name.to_string(),
                    readout: readout.to_string(),
                })
                .collect(),
            column_prefix: default_column_prefix(),
        }
    }

    /// Load a catalogue from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let catalogue: Catalogue = serde_yaml::from_str(yaml)
            .map_err(|e| CoverageError::Catalogue(format!("failed to parse YAML: {}", e)))?;
        catalogue.validate()?;
        Ok(catalogue)
    }

    fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CoverageError::Catalogue("no items".into()));
        }
        let categories: Vec<Effectiveness> = self.effects.iter().map(|e| e.category).collect();
        if categories != Effectiveness::ALL {
            return Err(CoverageError::Catalogue(format!(
                "effects must list {:?} in order, got {:?}",
                Effectiveness::ALL,
                categories
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_name(&self, item: usize) -> Result<&str> {
        item.checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map(String::as_str)
            .ok_or(CoverageError::UnknownItem(item))
    }

    pub fn effect_names(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().map(|e| e.name.as_str())
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::pokemon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pokemon_lookup_is_one_based() {
        let c = Catalogue::pokemon();
        assert_eq!(c.len(), 18);
        assert_eq!(c.item_name(1).unwrap(), "Normal");
        assert_eq!(c.item_name(18).unwrap(), "Fairy");
        assert!(matches!(c.item_name(0), Err(CoverageError::UnknownItem(0))));
        assert!(matches!(c.item_name(19), Err(CoverageError::UnknownItem(19))));
    }

    #[test]
    fn test_effect_order() {
        let c = Catalogue::pokemon();
        let names: Vec<&str> = c.effect_names().collect();
        assert_eq!(
            names,
            [
                "No Effect",
                "Not Very Effective",
                "Normal Effectiveness",
                "Super Effective"
            ]
        );
        assert_eq!(c.effects[3].readout, "total-supereffective");
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
items: ["Alpha", "Beta", "Gamma"]
column_prefix: "Slot"
effects:
  - { category: no_effect, name: "None", readout: "r0" }
  - { category: not_very_effective, name: "Weak", readout: "r1" }
  - { category: normal, name: "Even", readout: "r2" }
  - { category: super_effective, name: "Strong", readout: "r3" }
"#;
        let c = Catalogue::from_yaml(yaml).expect("should parse");
        assert_eq!(c.len(), 3);
        assert_eq!(c.column_prefix, "Slot");
        assert_eq!(c.item_name(2).unwrap(), "Beta");
    }

    #[test]
    fn test_from_yaml_rejects_reordered_effects() {
        let yaml = r#"
items: ["Alpha"]
effects:
  - { category: normal, name: "Even", readout: "r2" }
  - { category: no_effect, name: "None", readout: "r0" }
  - { category: not_very_effective, name: "Weak", readout: "r1" }
  - { category: super_effective, name: "Strong", readout: "r3" }
"#;
        assert!(matches!(
            Catalogue::from_yaml(yaml),
            Err(CoverageError::Catalogue(_))
        ));
    }

    #[test]
    fn test_new_rejects_empty_items() {
        let effects = Catalogue::pokemon().effects;
        assert!(Catalogue::new(vec![], effects).is_err());
    }
}
