//! Theme drafts and token resolution.

use policy::validate::join;
use policy::{Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemePreset {
    #[default]
    Light,
    Dark,
    HighContrast,
}

impl ThemePreset {
    /// Token values every theme starts from.
    pub fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Light => &[
                ("background", "#ffffff"),
                ("foreground", "#1f2328"),
                ("surface", "#f6f8fa"),
                ("border", "#d0d7de"),
                ("accent", "#0969da"),
                ("focus-ring", "#0969da"),
            ],
            Self::Dark => &[
                ("background", "#0d1117"),
                ("foreground", "#e6edf3"),
                ("surface", "#161b22"),
                ("border", "#30363d"),
                ("accent", "#2f81f7"),
                ("focus-ring", "#2f81f7"),
            ],
            Self::HighContrast => &[
                ("background", "#000000"),
                ("foreground", "#ffffff"),
                ("surface", "#000000"),
                ("border", "#ffffff"),
                ("accent", "#ffff00"),
                ("focus-ring", "#00ffff"),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDraft {
    #[serde(default)]
    pub preset: ThemePreset,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Token names must be non-empty `[a-z0-9-]`; values must be non-empty.
pub fn validate_theme(theme: &ThemeDraft, path: &str) -> Validated<()> {
    let tokens = join(path, "tokens");
    for (name, value) in &theme.tokens {
        let token_path = join(&tokens, name);
        if !is_token_name(name) {
            return Err(ValidationError::new(
                ValidationCode::PatternMismatch,
                token_path,
                format!("token name '{name}' must match [a-z0-9-]+"),
            ));
        }
        if value.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                token_path,
                "token value must not be empty",
            ));
        }
    }
    Ok(())
}

/// Preset defaults overlaid with the draft's tokens.
pub fn resolve_theme_tokens(theme: &ThemeDraft) -> BTreeMap<String, String> {
    let mut tokens: BTreeMap<String, String> = theme
        .preset
        .defaults()
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    for (name, value) in &theme.tokens {
        tokens.insert(name.clone(), value.trim().to_string());
    }
    tokens
}
