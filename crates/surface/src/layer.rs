//! Resource-layer merge engine.
//!
//! Independently authored layers each contribute [`UiItemRule`]s keyed by
//! `(slot_id, item_id)`. [`merge_layers`] folds them in the order given and
//! returns one deterministic, de-duplicated sequence plus diagnostics for
//! rules that could not be applied.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Name of an authored layer, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerName {
    /// Compiled-in defaults.
    Base,
    /// The active distributable mod package.
    Package,
    /// Registered mod runtimes.
    Mod,
    /// End-user overrides.
    User,
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "base",
            Self::Package => "package",
            Self::Mod => "mod",
            Self::User => "user",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperation {
    #[default]
    Add,
    Remove,
    Replace,
}

/// One contribution rule. Identity is `(slot_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiItemRule<T> {
    pub slot_id: String,
    pub item_id: String,
    #[serde(default)]
    pub operation: RuleOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> UiItemRule<T> {
    pub fn add(slot_id: impl Into<String>, item_id: impl Into<String>, value: T) -> Self {
        Self {
            slot_id: slot_id.into(),
            item_id: item_id.into(),
            operation: RuleOperation::Add,
            order: None,
            value: Some(value),
        }
    }

    pub fn replace(slot_id: impl Into<String>, item_id: impl Into<String>, value: T) -> Self {
        Self {
            operation: RuleOperation::Replace,
            ..Self::add(slot_id, item_id, value)
        }
    }

    pub fn remove(slot_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            item_id: item_id.into(),
            operation: RuleOperation::Remove,
            order: None,
            value: None,
        }
    }

    pub fn with_order(mut self, order: Option<i64>) -> Self {
        self.order = order;
        self
    }

    /// Same rule with a different payload.
    pub fn with_value<U>(self, value: Option<U>) -> UiItemRule<U> {
        UiItemRule {
            slot_id: self.slot_id,
            item_id: self.item_id,
            operation: self.operation,
            order: self.order,
            value,
        }
    }

    /// Trimmed `(slot_id, item_id)` identity.
    pub fn identity(&self) -> (&str, &str) {
        (self.slot_id.trim(), self.item_id.trim())
    }
}

/// An ordered sequence of rules from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    pub name: LayerName,
    pub rules: Vec<UiItemRule<T>>,
}

impl<T> Layer<T> {
    pub fn new(name: LayerName, rules: Vec<UiItemRule<T>>) -> Self {
        Self { name, rules }
    }
}

/// The three authored layers of a contribution set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLayerSet<T> {
    #[serde(default = "Vec::new")]
    pub package: Vec<UiItemRule<T>>,
    #[serde(default = "Vec::new", rename = "mod")]
    pub mod_layer: Vec<UiItemRule<T>>,
    #[serde(default = "Vec::new")]
    pub user: Vec<UiItemRule<T>>,
}

impl<T> ResourceLayerSet<T> {
    /// Layers in fold order: package, then mod, then user.
    pub fn ordered(self) -> [Layer<T>; 3] {
        [
            Layer::new(LayerName::Package, self.package),
            Layer::new(LayerName::Mod, self.mod_layer),
            Layer::new(LayerName::User, self.user),
        ]
    }
}

impl<T: Clone> ResourceLayerSet<T> {
    pub fn merge(&self) -> MergeResult<T> {
        merge_layers(&self.clone().ordered())
    }
}

/// A surviving entry after the fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedItem<T> {
    pub slot_id: String,
    pub item_id: String,
    pub order: Option<i64>,
    pub layer: LayerName,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeIssue {
    /// `replace` had no earlier entry for its identity; the rule was skipped.
    ReplaceWithoutTarget,
    /// `add`/`replace` carried no value.
    MissingValue,
    /// Slot or item id was blank.
    BlankIdentity,
}

impl fmt::Display for MergeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReplaceWithoutTarget => "replace-without-target",
            Self::MissingValue => "missing-value",
            Self::BlankIdentity => "blank-identity",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDiagnostic {
    pub slot_id: String,
    pub item_id: String,
    pub layer: LayerName,
    pub issue: MergeIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult<T> {
    pub items: Vec<ResolvedItem<T>>,
    pub diagnostics: Vec<MergeDiagnostic>,
}

impl<T> MergeResult<T> {
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|item| &item.value)
    }

    pub fn into_values(self) -> Vec<T> {
        self.items.into_iter().map(|item| item.value).collect()
    }
}

/// Ordering shared by every resolved list: explicit orders ascending, entries
/// without an order after all ordered ones, then by id.
pub fn compare_order_then_id(
    a_order: Option<i64>,
    a_id: &str,
    b_order: Option<i64>,
    b_id: &str,
) -> Ordering {
    let rank = |order: Option<i64>| (order.is_none(), order.unwrap_or_default());
    rank(a_order)
        .cmp(&rank(b_order))
        .then_with(|| a_id.cmp(b_id))
}

/// Fold `layers` in slice order into one ordered, de-duplicated sequence.
///
/// - `add` inserts or overwrites the entry for its identity.
/// - `replace` overwrites, but only if an earlier rule created the entry.
/// - `remove` deletes the entry if present; removing an absent entry is a no-op.
pub fn merge_layers<T: Clone>(layers: &[Layer<T>]) -> MergeResult<T> {
    let mut entries: BTreeMap<(String, String), ResolvedItem<T>> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for layer in layers {
        for rule in &layer.rules {
            let (slot_id, item_id) = rule.identity();
            let diagnostic = |issue| MergeDiagnostic {
                slot_id: slot_id.to_string(),
                item_id: item_id.to_string(),
                layer: layer.name,
                issue,
            };
            if slot_id.is_empty() || item_id.is_empty() {
                diagnostics.push(diagnostic(MergeIssue::BlankIdentity));
                continue;
            }

            let key = (slot_id.to_string(), item_id.to_string());
            let value = match (rule.operation, &rule.value) {
                (RuleOperation::Remove, _) => {
                    entries.remove(&key);
                    continue;
                }
                (_, None) => {
                    diagnostics.push(diagnostic(MergeIssue::MissingValue));
                    continue;
                }
                (RuleOperation::Replace, Some(_)) if !entries.contains_key(&key) => {
                    diagnostics.push(diagnostic(MergeIssue::ReplaceWithoutTarget));
                    continue;
                }
                (_, Some(value)) => value.clone(),
            };

            entries.insert(
                key,
                ResolvedItem {
                    slot_id: slot_id.to_string(),
                    item_id: item_id.to_string(),
                    order: rule.order,
                    layer: layer.name,
                    value,
                },
            );
        }
    }

    let mut items: Vec<_> = entries.into_values().collect();
    items.sort_by(|a, b| {
        compare_order_then_id(a.order, &a.item_id, b.order, &b.item_id)
            .then_with(|| a.slot_id.cmp(&b.slot_id))
    });

    MergeResult { items, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(result: &'a MergeResult<&'static str>) -> Vec<&'a str> {
        result.items.iter().map(|i| i.item_id.as_str()).collect()
    }

    #[test]
    fn later_layer_overwrites_same_identity() {
        let result = merge_layers(&[
            Layer::new(LayerName::Package, vec![UiItemRule::add("toolbar", "a", "package")]),
            Layer::new(LayerName::Mod, vec![UiItemRule::add("toolbar", "a", "mod")]),
        ]);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].value, "mod");
        assert_eq!(result.items[0].layer, LayerName::Mod);
    }

    #[test]
    fn user_remove_suppresses_earlier_adds() {
        let set = ResourceLayerSet {
            package: vec![UiItemRule::add("toolbar", "a", "p"), UiItemRule::add("toolbar", "b", "p")],
            mod_layer: vec![UiItemRule::add("toolbar", "a", "m")],
            user: vec![UiItemRule::remove("toolbar", "a")],
        };
        let result = set.merge();
        assert_eq!(ids(&result), vec!["b"]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn removing_absent_item_is_not_an_error() {
        let result = merge_layers(&[Layer::new(
            LayerName::User,
            vec![UiItemRule::<&str>::remove("toolbar", "ghost")],
        )]);
        assert!(result.items.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn replace_without_target_is_reported_not_applied() {
        let result = merge_layers(&[Layer::new(
            LayerName::User,
            vec![UiItemRule::replace("toolbar", "a", "x")],
        )]);
        assert!(result.items.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].issue, MergeIssue::ReplaceWithoutTarget);
        assert_eq!(result.diagnostics[0].layer, LayerName::User);
    }

    #[test]
    fn replace_with_target_overwrites() {
        let result = merge_layers(&[
            Layer::new(LayerName::Package, vec![UiItemRule::add("toolbar", "a", "old").with_order(Some(3))]),
            Layer::new(LayerName::User, vec![UiItemRule::replace("toolbar", "a", "new")]),
        ]);
        assert_eq!(result.items[0].value, "new");
        assert_eq!(result.items[0].order, None);
    }

    #[test]
    fn blank_identity_and_missing_value_are_diagnosed() {
        let mut missing = UiItemRule::add("toolbar", "b", "x");
        missing.value = None;
        let result = merge_layers(&[Layer::new(
            LayerName::Mod,
            vec![UiItemRule::add(" ", "a", "x"), missing],
        )]);
        let issues: Vec<_> = result.diagnostics.iter().map(|d| d.issue).collect();
        assert_eq!(issues, vec![MergeIssue::BlankIdentity, MergeIssue::MissingValue]);
    }

    #[test]
    fn unordered_items_tie_break_by_id() {
        let result = merge_layers(&[Layer::new(
            LayerName::Mod,
            vec![
                UiItemRule::add("toolbar", "zeta", "z"),
                UiItemRule::add("toolbar", "alpha", "a"),
                UiItemRule::add("toolbar", "mid", "m").with_order(Some(5)),
                UiItemRule::add("toolbar", "first", "f").with_order(Some(-1)),
            ],
        )]);
        assert_eq!(ids(&result), vec!["first", "mid", "alpha", "zeta"]);
    }

    #[test]
    fn identities_are_trimmed() {
        let result = merge_layers(&[
            Layer::new(LayerName::Package, vec![UiItemRule::add("toolbar", "a", "p")]),
            Layer::new(LayerName::User, vec![UiItemRule::<&str>::remove(" toolbar ", " a ")]),
        ]);
        assert!(result.items.is_empty());
    }

    #[test]
    fn rules_deserialize_with_default_operation() {
        let rule: UiItemRule<String> =
            serde_json::from_str(r#"{"slotId":"toolbar","itemId":"a","value":"x"}"#).unwrap();
        assert_eq!(rule.operation, RuleOperation::Add);
        assert_eq!(rule.order, None);

        let rule: UiItemRule<String> =
            serde_json::from_str(r#"{"slotId":"toolbar","itemId":"a","operation":"remove"}"#).unwrap();
        assert_eq!(rule.operation, RuleOperation::Remove);
        assert!(rule.value.is_none());
    }
}
