//! Template metadata.

use policy::validate::{identifier, index, join};
use policy::{Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub id: String,
    pub title: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TemplateDraft {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            version: 1,
            description: None,
            tags: Vec::new(),
        }
    }
}

impl Default for TemplateDraft {
    fn default() -> Self {
        Self::new("studio", "Studio")
    }
}

pub fn validate_template(template: &TemplateDraft, path: &str) -> Validated<()> {
    identifier(template.id.trim(), &join(path, "id"))?;

    if template.title.trim().is_empty() {
        return Err(ValidationError::new(
            ValidationCode::InvalidValue,
            join(path, "title"),
            "must not be empty",
        ));
    }
    if template.version == 0 {
        return Err(ValidationError::new(
            ValidationCode::InvalidVersion,
            join(path, "version"),
            "version must be at least 1",
        ));
    }
    if let Some(description) = &template.description
        && description.trim().is_empty()
    {
        return Err(ValidationError::new(
            ValidationCode::InvalidValue,
            join(path, "description"),
            "must be omitted or non-empty",
        ));
    }

    let tags = join(path, "tags");
    let mut seen = BTreeSet::new();
    for (i, tag) in template.tags.iter().enumerate() {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                index(&tags, i),
                "tags must not be empty",
            ));
        }
        if !seen.insert(tag) {
            return Err(ValidationError::new(
                ValidationCode::Duplicate,
                index(&tags, i),
                format!("duplicate tag '{tag}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_valid() {
        assert!(validate_template(&TemplateDraft::default(), "$.template").is_ok());
    }

    #[test]
    fn rejects_bad_metadata() {
        let mut template = TemplateDraft::new("Not Valid", "Title");
        assert_eq!(
            validate_template(&template, "$").unwrap_err().code,
            ValidationCode::PatternMismatch
        );

        template.id = "lesson".into();
        template.version = 0;
        assert_eq!(
            validate_template(&template, "$").unwrap_err().code,
            ValidationCode::InvalidVersion
        );

        template.version = 2;
        template.tags = vec!["math".into(), " math ".into()];
        let err = validate_template(&template, "$.template").unwrap_err();
        assert_eq!(err.code, ValidationCode::Duplicate);
        assert_eq!(err.path, "$.template.tags[1]");
    }
}
