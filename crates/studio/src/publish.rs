//! Transactional publish of studio drafts.
//!
//! `Draft -> Preflight -> {Rejected | Committed} -> (optional) RolledBack`
//!
//! [`preflight_studio_publish`] is pure. [`Studio`] runs preflight and then
//! commits: capture the live bundle and manifests, swap the policy document,
//! archive the capture, register the manifest, apply the theme. Expected
//! failures come back as [`PublishOutcome::Rejected`]; an `Err` means the
//! commit was not confirmed.

use crate::diagnostics::{DiagnosticInput, ModuleDiagnostic, diagnose, first_error};
use crate::manifest::{DeclarativePluginManifest, build_manifest, validate_manifest};
use crate::manifest_store::{ManifestMap, ManifestStore, UpsertOutcome};
use crate::module::{LayoutDraft, ModuleDraft};
use crate::snapshot::{StudioSnapshot, create_studio_snapshot};
use crate::template::{TemplateDraft, validate_template};
use crate::theme::{ThemeDraft, resolve_theme_tokens, validate_theme};
use crate::{Error, Result};
use policy::validate::{ROOT, join};
use policy::{PolicyStore, RolePolicyDocument, ValidationError, builtin_document, validate_role_policy_document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use storage::{Event, EventKind, EventStore};
use uuid::Uuid;

/// Everything an author edits, published as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioDraftBundle {
    /// Untyped so that preflight, not deserialization, decides validity.
    pub policy: Value,
    #[serde(default)]
    pub layout: LayoutDraft,
    #[serde(default)]
    pub modules: Vec<ModuleDraft>,
    #[serde(default)]
    pub theme: ThemeDraft,
    pub template: TemplateDraft,
}

impl Default for StudioDraftBundle {
    /// The built-in policy with no modules.
    fn default() -> Self {
        Self {
            policy: builtin_document().to_value(),
            layout: LayoutDraft::default(),
            modules: Vec::new(),
            theme: ThemeDraft::default(),
            template: TemplateDraft::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishStage {
    /// Another publish held the lock.
    Lock,
    Template,
    Theme,
    Diagnostics,
    Manifest,
    Policy,
}

/// The first failure that stopped a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: PublishStage,
    pub code: String,
    pub message: String,
}

impl StageFailure {
    fn validation(stage: PublishStage, error: ValidationError) -> Self {
        Self {
            stage,
            code: error.code.as_str().to_string(),
            message: format!("{}: {}", error.path, error.message),
        }
    }

    fn diagnostic(diagnostic: &ModuleDiagnostic) -> Self {
        Self {
            stage: PublishStage::Diagnostics,
            code: diagnostic.code.as_str().to_string(),
            message: diagnostic.message.clone(),
        }
    }

    fn policy_conflict() -> Self {
        Self {
            stage: PublishStage::Policy,
            code: "policy-conflict".to_string(),
            message: "active policy changed during publish".to_string(),
        }
    }

    fn publish_in_progress() -> Self {
        Self {
            stage: PublishStage::Lock,
            code: "publish-in-progress".to_string(),
            message: "publish already in progress".to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// What a passing preflight produced. Nothing has been applied yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub manifest: DeclarativePluginManifest,
    pub policy: RolePolicyDocument,
    pub theme_tokens: BTreeMap<String, String>,
    /// Advisory diagnostics; errors would have failed preflight.
    pub warnings: Vec<ModuleDiagnostic>,
}

pub type Preflight = std::result::Result<PreflightReport, StageFailure>;

/// Validate `bundle` without touching any live state.
///
/// Stages run in order and the first failure is returned.
pub fn preflight_studio_publish(bundle: &StudioDraftBundle, known_commands: Option<&[String]>) -> Preflight {
    validate_template(&bundle.template, &join(ROOT, "template"))
        .map_err(|e| StageFailure::validation(PublishStage::Template, e))?;
    validate_theme(&bundle.theme, &join(ROOT, "theme"))
        .map_err(|e| StageFailure::validation(PublishStage::Theme, e))?;

    let diagnostics = diagnose(&DiagnosticInput {
        known_commands,
        ..DiagnosticInput::modules(&bundle.modules)
    });
    if let Some(error) = first_error(&diagnostics) {
        return Err(StageFailure::diagnostic(error));
    }

    let manifest = build_manifest(&bundle.template.id, &bundle.modules, &bundle.layout);
    validate_manifest(&manifest).map_err(|e| StageFailure::validation(PublishStage::Manifest, e))?;

    let policy = validate_role_policy_document(&bundle.policy)
        .map_err(|e| StageFailure::validation(PublishStage::Policy, e))?;

    Ok(PreflightReport {
        manifest,
        policy,
        theme_tokens: resolve_theme_tokens(&bundle.theme),
        warnings: diagnostics,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    /// Snapshot of the state this commit replaced.
    pub snapshot_id: Uuid,
    pub plugin_id: String,
    pub manifest: UpsertOutcome,
    pub policy_revision: u64,
    pub warnings: Vec<ModuleDiagnostic>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishOutcome {
    Committed(PublishReceipt),
    Rejected(StageFailure),
}

impl PublishOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// `[code] message` on rejection, the receipt message otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::Committed(receipt) => receipt.message.clone(),
            Self::Rejected(failure) => failure.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Run<'a> {
    Publish,
    Rollback(&'a StudioSnapshot),
}

impl Run<'_> {
    fn reason(&self) -> String {
        match self {
            Self::Publish => "before publish".to_string(),
            Self::Rollback(target) => format!("before rollback to {}", target.id()),
        }
    }

    fn event(&self, ok: bool, message: String, snapshot_id: Option<Uuid>) -> EventKind {
        match self {
            Self::Publish => EventKind::Publish { ok, message, snapshot_id },
            Self::Rollback(target) => EventKind::Rollback {
                ok,
                message,
                snapshot_id: target.id(),
            },
        }
    }
}

/// The publish service. Owns the live bundle and serializes commits.
pub struct Studio {
    policies: Arc<PolicyStore>,
    manifests: Arc<ManifestStore>,
    events: Option<Arc<EventStore>>,
    known_commands: Option<Vec<String>>,
    live: RwLock<StudioDraftBundle>,
    theme: RwLock<BTreeMap<String, String>>,
    history: RwLock<Vec<StudioSnapshot>>,
    publishing: Mutex<()>,
}

impl Studio {
    pub fn new(policies: Arc<PolicyStore>, manifests: Arc<ManifestStore>) -> Self {
        let live = StudioDraftBundle::default();
        Self {
            policies,
            manifests,
            events: None,
            known_commands: None,
            theme: RwLock::new(resolve_theme_tokens(&live.theme)),
            live: RwLock::new(live),
            history: RwLock::new(Vec::new()),
            publishing: Mutex::new(()),
        }
    }

    /// Record audit events and archive snapshots in `events`.
    pub fn with_event_store(mut self, events: Arc<EventStore>) -> Self {
        self.events = Some(events);
        self
    }

    /// Check module commands against this catalog during preflight.
    pub fn with_known_commands(mut self, commands: Vec<String>) -> Self {
        self.known_commands = Some(commands);
        self
    }

    /// Start from `bundle` instead of the default bundle. It is not validated
    /// until it is replayed.
    pub fn with_live_bundle(mut self, bundle: StudioDraftBundle) -> Self {
        self.theme = RwLock::new(resolve_theme_tokens(&bundle.theme));
        self.live = RwLock::new(bundle);
        self
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn manifests(&self) -> &Arc<ManifestStore> {
        &self.manifests
    }

    /// The bundle most recently committed.
    pub fn live_bundle(&self) -> StudioDraftBundle {
        self.live.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Theme tokens most recently applied.
    pub fn applied_theme(&self) -> BTreeMap<String, String> {
        self.theme.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshots taken by this instance, oldest first.
    pub fn snapshots(&self) -> Vec<StudioSnapshot> {
        self.history.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Look a snapshot up in memory, then in the archive.
    pub fn load_snapshot(&self, id: Uuid) -> Result<Option<StudioSnapshot>> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(snapshot) = history.iter().find(|s| s.id() == id) {
            return Ok(Some(snapshot.clone()));
        }
        drop(history);
        match &self.events {
            Some(events) => match events.load_snapshot(id) {
                Ok(record) => Ok(Some(StudioSnapshot::from_record(record)?)),
                Err(storage::Error::NotFound(_)) => Ok(None),
                Err(e) => Err(e.into()),
            },
            None => Ok(None),
        }
    }

    /// Preflight against this studio's command catalog and record the result.
    pub fn preflight(&self, bundle: &StudioDraftBundle) -> Preflight {
        let result = preflight_studio_publish(bundle, self.known_commands.as_deref());
        let (ok, message) = match &result {
            Ok(report) => (true, format!("preflight passed for {}", report.manifest.plugin_id)),
            Err(failure) => (false, failure.to_string()),
        };
        tracing::info!(ok, %message, "studio preflight");
        self.audit(EventKind::Preflight { ok, message });
        result
    }

    pub fn publish_studio_draft_bundle(&self, bundle: &StudioDraftBundle) -> Result<PublishOutcome> {
        self.run(bundle, Run::Publish)
    }

    /// Replay `snapshot` through the full preflight and commit sequence.
    ///
    /// The manifest registry goes back to what the snapshot captured, with the
    /// replayed bundle's manifest registered on top.
    pub fn rollback_studio_snapshot(&self, snapshot: &StudioSnapshot) -> Result<PublishOutcome> {
        self.run(snapshot.bundle(), Run::Rollback(snapshot))
    }

    fn run(&self, bundle: &StudioDraftBundle, run: Run<'_>) -> Result<PublishOutcome> {
        let _guard = match self.publishing.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(self.reject(run, StageFailure::publish_in_progress())),
        };

        let expected_policy = self.policies.get();
        let report = match preflight_studio_publish(bundle, self.known_commands.as_deref()) {
            Ok(report) => report,
            Err(failure) => return Ok(self.reject(run, failure)),
        };

        let outcome = self.commit(bundle, report, run, &expected_policy)?;
        match &outcome {
            PublishOutcome::Committed(receipt) => {
                tracing::info!(
                    plugin = %receipt.plugin_id,
                    revision = receipt.policy_revision,
                    snapshot = %receipt.snapshot_id,
                    "studio bundle committed"
                );
                self.audit(run.event(true, receipt.message.clone(), Some(receipt.snapshot_id)));
            }
            PublishOutcome::Rejected(failure) => {
                tracing::warn!(%failure, "studio commit rejected");
                self.audit(run.event(false, failure.to_string(), None));
            }
        }
        Ok(outcome)
    }

    fn reject(&self, run: Run<'_>, failure: StageFailure) -> PublishOutcome {
        tracing::warn!(stage = ?failure.stage, %failure, "studio publish rejected");
        self.audit(run.event(false, failure.to_string(), None));
        PublishOutcome::Rejected(failure)
    }

    /// Apply a preflighted bundle. Nothing is archived or recorded in history
    /// unless the policy swap from `expected_policy` lands.
    fn commit(
        &self,
        bundle: &StudioDraftBundle,
        report: PreflightReport,
        run: Run<'_>,
        expected_policy: &Arc<RolePolicyDocument>,
    ) -> Result<PublishOutcome> {
        let snapshot = create_studio_snapshot(run.reason(), &self.live_bundle())
            .with_manifests(ManifestMap::clone(&self.manifests.snapshot()));

        let next_policy = match validate_role_policy_document(&bundle.policy) {
            Ok(document) => document,
            Err(e) => return Ok(PublishOutcome::Rejected(StageFailure::validation(PublishStage::Policy, e))),
        };
        let policy_revision = match self.policies.compare_and_swap(expected_policy, next_policy) {
            Ok(revision) => revision,
            Err(policy::Error::Conflict { .. }) => return Ok(PublishOutcome::Rejected(StageFailure::policy_conflict())),
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.archive(&snapshot) {
            self.restore_policy(expected_policy);
            return Err(e);
        }
        self.history.write().map_err(|_| Error::Poisoned)?.push(snapshot.clone());

        let plugin_id = report.manifest.plugin_id.clone();
        let manifest = match run {
            Run::Publish => self.manifests.upsert(report.manifest)?,
            Run::Rollback(target) => self.manifests.restore(target.manifests().clone(), report.manifest)?,
        };
        *self.theme.write().map_err(|_| Error::Poisoned)? = report.theme_tokens;
        *self.live.write().map_err(|_| Error::Poisoned)? = bundle.clone();

        let verb = match manifest {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Replaced => "updated",
        };
        Ok(PublishOutcome::Committed(PublishReceipt {
            snapshot_id: snapshot.id(),
            message: format!("manifest {plugin_id} {verb}"),
            plugin_id,
            manifest,
            policy_revision,
            warnings: report.warnings,
        }))
    }

    fn archive(&self, snapshot: &StudioSnapshot) -> Result<()> {
        if let Some(events) = &self.events {
            events.save_snapshot(&snapshot.to_record()?)?;
        }
        Ok(())
    }

    /// Put `previous` back after a commit failed past the policy swap.
    fn restore_policy(&self, previous: &Arc<RolePolicyDocument>) {
        let current = self.policies.get();
        if let Err(e) = self.policies.compare_and_swap(&current, RolePolicyDocument::clone(previous)) {
            tracing::error!(error = %e, "failed to restore policy after aborted commit");
        }
    }

    fn audit(&self, kind: EventKind) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(e) = events.append(&Event::publish(kind)) {
            tracing::warn!(error = %e, "failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleSlot;
    use policy::Decision;
    use serde_json::json;
    use storage::PUBLISH_CHANNEL;

    fn studio() -> Studio {
        Studio::new(Arc::new(PolicyStore::new()), Arc::new(ManifestStore::new()))
    }

    fn bundle(modules: Vec<ModuleDraft>) -> StudioDraftBundle {
        StudioDraftBundle {
            modules,
            template: TemplateDraft::new("lesson", "Lesson"),
            ..StudioDraftBundle::default()
        }
    }

    #[test]
    fn preflight_stops_at_first_failing_stage() {
        let mut draft = bundle(vec![ModuleDraft::new("dup", ModuleSlot::ToolbarTop, "nextStep")]);
        draft.template.version = 0;
        draft.policy = json!({"version": 1, "defaultDecision": "allow", "roles": {}});
        let failure = preflight_studio_publish(&draft, None).unwrap_err();
        assert_eq!(failure.stage, PublishStage::Template);

        draft.template.version = 1;
        let failure = preflight_studio_publish(&draft, None).unwrap_err();
        assert_eq!(failure.stage, PublishStage::Policy);
        assert_eq!(failure.code, "default-not-deny");
        assert!(failure.to_string().starts_with("[default-not-deny] $.defaultDecision"));
    }

    #[test]
    fn preflight_checks_catalog_when_given() {
        let draft = bundle(vec![ModuleDraft::new("m1", ModuleSlot::ToolbarTop, "launchRocket")]);
        assert!(preflight_studio_publish(&draft, None).is_ok());
        let catalog = vec!["nextStep".to_string()];
        let failure = preflight_studio_publish(&draft, Some(&catalog)).unwrap_err();
        assert_eq!(failure.code, "unknown-command");
    }

    #[test]
    fn preflight_passes_warnings_through() {
        let draft = bundle(vec![
            ModuleDraft::new("a", ModuleSlot::ToolbarTop, "nextStep"),
            ModuleDraft::new("b", ModuleSlot::ToolbarTop, "previousStep"),
        ]);
        let report = preflight_studio_publish(&draft, None).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.manifest.ui.len(), 2);
    }

    #[test]
    fn commit_applies_everything() {
        let studio = studio();
        let mut draft = bundle(vec![ModuleDraft::new("m1", ModuleSlot::ToolbarTop, "nextStep")]);
        draft.theme.tokens.insert("accent".into(), "#123456".into());

        let outcome = studio.publish_studio_draft_bundle(&draft).unwrap();
        let PublishOutcome::Committed(receipt) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(receipt.message, "manifest lesson created");
        assert_eq!(receipt.policy_revision, 1);
        assert_eq!(studio.manifests().get("lesson").unwrap().ui.len(), 1);
        assert_eq!(studio.applied_theme()["accent"], "#123456");
        assert_eq!(studio.live_bundle(), draft);
        assert_eq!(studio.snapshots().len(), 1);
        assert_eq!(studio.snapshots()[0].bundle(), &StudioDraftBundle::default());

        let again = studio.publish_studio_draft_bundle(&draft).unwrap();
        assert_eq!(again.message(), "manifest lesson updated");
    }

    #[test]
    fn rejected_publish_changes_nothing() {
        let studio = studio();
        let before = studio.policies().get();
        let draft = bundle(vec![
            ModuleDraft::new("dup", ModuleSlot::ToolbarTop, "nextStep"),
            ModuleDraft::new("dup", ModuleSlot::PanelLeft, "openPanel"),
        ]);
        let outcome = studio.publish_studio_draft_bundle(&draft).unwrap();
        assert!(!outcome.is_committed());
        assert!(outcome.message().starts_with("[duplicate-id]"));
        assert!(Arc::ptr_eq(&before, &studio.policies().get()));
        assert!(studio.manifests().is_empty());
        assert!(studio.snapshots().is_empty());
    }

    #[test]
    fn policy_conflict_leaves_no_snapshot_behind() {
        let events = Arc::new(EventStore::in_memory().unwrap());
        let studio = studio().with_event_store(Arc::clone(&events));
        let draft = bundle(vec![ModuleDraft::new("m1", ModuleSlot::ToolbarTop, "nextStep")]);
        let stale = studio.policies().get();
        let report = preflight_studio_publish(&draft, None).unwrap();
        studio.policies().publish(&draft.policy).unwrap();

        let outcome = studio.commit(&draft, report, Run::Publish, &stale).unwrap();
        let PublishOutcome::Rejected(failure) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(failure.code, "policy-conflict");
        assert!(studio.snapshots().is_empty());
        assert!(events.list_snapshots(None).unwrap().is_empty());
        assert!(studio.manifests().is_empty());
        assert_eq!(studio.live_bundle(), StudioDraftBundle::default());
    }

    #[test]
    fn rollback_restores_manifest_registry() {
        let studio = studio();
        let lesson = bundle(vec![ModuleDraft::new("m1", ModuleSlot::ToolbarTop, "nextStep")]);
        assert!(studio.publish_studio_draft_bundle(&lesson).unwrap().is_committed());
        let mut quiz = lesson.clone();
        quiz.template = TemplateDraft::new("quiz", "Quiz");
        let PublishOutcome::Committed(receipt) = studio.publish_studio_draft_bundle(&quiz).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(studio.manifests().len(), 2);

        let before_quiz = studio.load_snapshot(receipt.snapshot_id).unwrap().unwrap();
        assert_eq!(before_quiz.manifests().keys().collect::<Vec<_>>(), vec!["lesson"]);
        let outcome = studio.rollback_studio_snapshot(&before_quiz).unwrap();
        assert_eq!(outcome.message(), "manifest lesson updated");
        assert_eq!(studio.manifests().snapshot().keys().collect::<Vec<_>>(), vec!["lesson"]);
        assert_eq!(studio.live_bundle(), lesson);
    }

    #[test]
    fn concurrent_publish_is_rejected() {
        let studio = studio();
        let _held = studio.publishing.lock().unwrap();
        let outcome = studio.publish_studio_draft_bundle(&bundle(vec![])).unwrap();
        let PublishOutcome::Rejected(failure) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(failure.code, "publish-in-progress");
        assert_eq!(failure.stage, PublishStage::Lock);
    }

    #[test]
    fn published_policy_drives_decisions() {
        let studio = studio();
        let mut draft = bundle(vec![]);
        draft.policy = json!({
            "version": 2,
            "roles": { "student": { "surfaces": { "command.dispatch": { "nextStep": "allow" } } } }
        });
        assert!(studio.publish_studio_draft_bundle(&draft).unwrap().is_committed());
        let active = studio.policies().get();
        assert_eq!(active.version(), 2);
        assert_eq!(active.resolve("student", "command.dispatch", "nextStep"), Decision::Allow);
        assert_eq!(active.resolve("host", "command.dispatch", "nextStep"), Decision::Deny);
    }

    #[test]
    fn audit_trail_and_archive() {
        let events = Arc::new(EventStore::in_memory().unwrap());
        let studio = studio().with_event_store(Arc::clone(&events));

        assert!(studio.preflight(&bundle(vec![])).is_ok());
        let outcome = studio.publish_studio_draft_bundle(&bundle(vec![])).unwrap();
        let PublishOutcome::Committed(receipt) = outcome else {
            panic!("expected commit");
        };

        let trail = events.recent(PUBLISH_CHANNEL, None).unwrap();
        let names: Vec<_> = trail.iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, vec!["publish", "preflight"]);
        assert!(trail.iter().all(|e| e.kind.ok()));

        let archived = studio.load_snapshot(receipt.snapshot_id).unwrap().unwrap();
        assert_eq!(archived.bundle(), &StudioDraftBundle::default());
        assert!(studio.load_snapshot(Uuid::new_v4()).unwrap().is_none());
    }
}
