//! Locale-dependent labels.
//!
//! Only the handful of strings the domain renders itself live here; page copy
//! belongs to whatever front end consumes the storefront API.

use serde::{Deserialize, Serialize};

/// A supported display locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    De,
}

/// A translatable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// Marks tax already contained in a price.
    Incl,
    /// Marks tax taken out of a price.
    Excl,
}

impl Locale {
    /// Look up a label in this locale.
    #[must_use]
    pub const fn t(self, label: Label) -> &'static str {
        match (self, label) {
            (Self::En, Label::Incl) => "incl.",
            (Self::En, Label::Excl) => "excl.",
            (Self::De, Label::Incl) => "inkl.",
            (Self::De, Label::Excl) => "exkl.",
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept region-qualified tags like "en-US" or "de_AT".
        let language = s
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "en" => Ok(Self::En),
            "de" => Ok(Self::De),
            _ => Err(format!("unsupported locale: {s}")),
        }
    }
}
