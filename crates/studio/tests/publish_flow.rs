use policy::{Decision, PolicyStore};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use storage::{EventStore, PUBLISH_CHANNEL};
use studio::{
    ManifestStore, ModuleDraft, ModuleSlot, PublishOutcome, Studio, StudioDraftBundle, TemplateDraft,
    preflight_studio_publish,
};

fn studio() -> Studio {
    Studio::new(Arc::new(PolicyStore::new()), Arc::new(ManifestStore::new()))
}

fn draft(template: &str, modules: Vec<ModuleDraft>) -> StudioDraftBundle {
    StudioDraftBundle {
        modules,
        template: TemplateDraft::new(template, "Lesson"),
        ..StudioDraftBundle::default()
    }
}

#[test]
fn single_module_preflight_builds_manifest() {
    let bundle: StudioDraftBundle = serde_json::from_value(json!({
        "policy": { "version": 1, "defaultDecision": "deny", "roles": {} },
        "layout": {},
        "modules": [{
            "id": "m1",
            "slot": "toolbar-bottom",
            "order": 0,
            "enabled": true,
            "action": { "commandId": "nextStep" }
        }],
        "template": { "id": "lesson", "title": "Lesson", "version": 1 }
    }))
    .unwrap();

    let report = preflight_studio_publish(&bundle, None).unwrap();
    assert_eq!(report.manifest.ui.len(), 1);
    assert_eq!(report.manifest.ui[0].id, "m1");
}

#[test]
fn duplicate_module_ids_fail_preflight() {
    let bundle = draft(
        "lesson",
        vec![
            ModuleDraft::new("dup", ModuleSlot::ToolbarTop, "nextStep"),
            ModuleDraft::new("dup", ModuleSlot::ToolbarBottom, "previousStep"),
        ],
    );
    let failure = preflight_studio_publish(&bundle, None).unwrap_err();
    assert!(failure.to_string().starts_with("[duplicate-id]"));
}

#[test]
fn host_does_not_inherit_student_decision() {
    let studio = studio();
    let mut bundle = draft("lesson", vec![]);
    bundle.policy = json!({
        "version": 3,
        "defaultDecision": "deny",
        "roles": {
            "student": { "surfaces": { "ui.visibility": { "show-student-player-bar": "allow" } } }
        }
    });
    assert!(studio.publish_studio_draft_bundle(&bundle).unwrap().is_committed());

    let active = studio.policies().get();
    assert_eq!(active.resolve("host", "ui.visibility", "show-student-player-bar"), Decision::Deny);
    assert_eq!(active.resolve("student", "ui.visibility", "show-student-player-bar"), Decision::Allow);
}

#[test]
fn rollback_restores_pre_publish_state() {
    let events = Arc::new(EventStore::in_memory().unwrap());
    let studio = studio().with_event_store(Arc::clone(&events));
    let initial_policy = studio.policies().get();

    let mut a = draft("lesson", vec![ModuleDraft::new("m1", ModuleSlot::ToolbarTop, "nextStep")]);
    a.policy = json!({
        "version": 7,
        "roles": { "host": { "surfaces": { "command.dispatch": { "nextStep": "allow" } } } }
    });
    let PublishOutcome::Committed(receipt) = studio.publish_studio_draft_bundle(&a).unwrap() else {
        panic!("draft A should commit");
    };
    assert_eq!(studio.policies().get().version(), 7);

    let mut b = a.clone();
    b.policy = json!({ "version": 0, "roles": {} });
    let outcome = studio.publish_studio_draft_bundle(&b).unwrap();
    assert!(!outcome.is_committed());
    assert!(outcome.message().starts_with("[invalid-version]"));
    assert_eq!(studio.policies().get().version(), 7);
    assert_eq!(studio.live_bundle(), a);

    let s0 = studio.load_snapshot(receipt.snapshot_id).unwrap().unwrap();
    let rolled_back = studio.rollback_studio_snapshot(&s0).unwrap();
    assert!(rolled_back.is_committed());
    assert_eq!(studio.live_bundle(), StudioDraftBundle::default());
    assert_eq!(*studio.policies().get(), *initial_policy);
    assert!(studio.manifests().get("lesson").is_none());
    assert!(studio.manifests().get("studio").is_some());

    let trail = events.recent(PUBLISH_CHANNEL, None).unwrap();
    let kinds: Vec<_> = trail.iter().map(|e| (e.kind.name(), e.kind.ok())).collect();
    assert_eq!(
        kinds,
        vec![("rollback", true), ("publish", false), ("publish", true)]
    );
}

#[test]
fn rollback_survives_restart_through_archive() {
    let events = Arc::new(EventStore::in_memory().unwrap());
    let first = studio().with_event_store(Arc::clone(&events));
    let a = draft("lesson", vec![ModuleDraft::new("m1", ModuleSlot::PanelRight, "openPanel")]);
    let PublishOutcome::Committed(receipt) = first.publish_studio_draft_bundle(&a).unwrap() else {
        panic!("draft A should commit");
    };

    let second = studio().with_event_store(Arc::clone(&events)).with_live_bundle(a);
    let snapshot = second.load_snapshot(receipt.snapshot_id).unwrap().unwrap();
    assert!(second.rollback_studio_snapshot(&snapshot).unwrap().is_committed());
    assert_eq!(second.live_bundle(), StudioDraftBundle::default());
}

#[test]
fn concurrent_publishes_never_interleave() {
    let studio = Arc::new(studio());
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let studio = Arc::clone(&studio);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let bundle = draft(&format!("plugin-{i}"), vec![]);
                barrier.wait();
                studio.publish_studio_draft_bundle(&bundle).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let committed = outcomes.iter().filter(|o| o.is_committed()).count();
    for outcome in &outcomes {
        if let PublishOutcome::Rejected(failure) = outcome {
            assert_eq!(failure.code, "publish-in-progress");
        }
    }
    assert!(committed >= 1);
    assert_eq!(studio.manifests().len(), committed);
    assert_eq!(studio.snapshots().len(), committed);
    assert_eq!(studio.policies().revision(), committed as u64);
}
