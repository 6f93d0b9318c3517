use preingest::identity::IdentityResolver;
use preingest::lifecycle::payload::{ScanItem, VirusScanReport};
use preingest::lifecycle::{
    read_snapshot, snapshot_path, ActionSink, ExecutionController, LifecycleError, LifecycleEvent,
    LifecycleState, Step, StepError, StepHandler, StepKind, StepPayload, StepRun,
};
use preingest::notify::{Notification, NotificationSink, NotifyError};
use preingest::registry::{CollectionRegistry, ReadModelSource, RUN_SETTINGS_FILE_NAME};
use preingest::shared::ids::{ProcessId, SessionId};
use preingest::shared::time::now_utc;
use preingest::store::{
    ActionResult, ActionStateEvent, ActionStore, ActionSummary, ProcessAction, StateMessage,
    StateName, StoreError,
};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use tempfile::{tempdir, TempDir};

const CONTAINER: &str = "archief-2024.tar";

struct Fixture {
    _temp: TempDir,
    data_root: PathBuf,
    state_root: PathBuf,
    folder: PathBuf,
    session_id: SessionId,
    store: ActionStore,
}

fn fixture(metadata: &[&str]) -> Fixture {
    let temp = tempdir().expect("tempdir");
    let data_root = temp.path().join("data");
    fs::create_dir_all(&data_root).expect("data root");
    fs::write(data_root.join(CONTAINER), b"container bytes").expect("container");

    let session_id = SessionId::from_container_name(CONTAINER);
    let folder = data_root.join(session_id.to_string());
    fs::create_dir_all(folder.join("archief")).expect("session folder");
    for name in metadata {
        fs::write(folder.join("archief").join(name), "<metadata/>").expect("metadata");
    }

    let store = ActionStore::open(&temp.path().join("db/preingest.db")).expect("open store");
    store.ensure_schema().expect("schema");
    Fixture {
        state_root: temp.path().join("state"),
        _temp: temp,
        data_root,
        folder,
        session_id,
        store,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    method: &'static str,
    notice_state: Option<LifecycleState>,
    statuses_at_publish: Vec<Option<ActionResult>>,
}

/// Records every notification together with what the database held at publish time.
struct RecordingSink {
    store: ActionStore,
    session_id: SessionId,
    seen: Mutex<Vec<Seen>>,
}

impl RecordingSink {
    fn new(fixture: &Fixture) -> Arc<Self> {
        Arc::new(Self {
            store: fixture.store.clone(),
            session_id: fixture.session_id,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("seen lock").clone()
    }

    fn methods(&self) -> Vec<&'static str> {
        self.seen().into_iter().map(|seen| seen.method).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let statuses_at_publish = self
            .store
            .actions_for_session(self.session_id)
            .expect("read actions")
            .into_iter()
            .map(|action| action.action_status)
            .collect();
        let notice_state = match notification {
            Notification::Notice(notice) => Some(notice.state),
            _ => None,
        };
        self.seen.lock().expect("seen lock").push(Seen {
            method: notification.method(),
            notice_state,
            statuses_at_publish,
        });
        Ok(())
    }
}

fn handler<S: Step>(
    fixture: &Fixture,
    step: S,
    persistence: Arc<dyn ActionSink>,
    sink: Arc<dyn NotificationSink>,
) -> StepHandler<S> {
    let resolver = IdentityResolver::new(&fixture.data_root);
    let registry = Arc::new(CollectionRegistry::new(
        resolver.clone(),
        fixture.store.clone(),
    ));
    let controller = Arc::new(ExecutionController::new(
        persistence,
        sink,
        registry,
        &fixture.state_root,
    ));
    let mut handler = StepHandler::new(step, resolver, controller);
    handler
        .set_session_guid(&fixture.session_id.to_string())
        .expect("bind session");
    handler
}

struct ScanStep {
    clean: usize,
    infected: usize,
    ran: Arc<AtomicBool>,
}

impl ScanStep {
    fn new(clean: usize, infected: usize) -> Self {
        Self {
            clean,
            infected,
            ran: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Step for ScanStep {
    fn kind(&self) -> StepKind {
        StepKind::VirusScan
    }

    fn description(&self) -> String {
        "Scan for viruses".to_string()
    }

    fn run(&mut self, run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        self.ran.store(true, Ordering::SeqCst);
        let mut items = Vec::new();
        for index in 0..self.clean {
            run.accept();
            items.push(ScanItem {
                path: format!("archief/clean-{index}.pdf"),
                infected: false,
                signature: None,
            });
        }
        for index in 0..self.infected {
            run.reject();
            items.push(ScanItem {
                path: format!("archief/infected-{index}.pdf"),
                infected: true,
                signature: Some("Eicar-Test-Signature".to_string()),
            });
        }
        run.report_progress("scan finished");
        Ok(StepPayload::VirusScan(VirusScanReport { items }))
    }
}

struct FailingStep;

impl Step for FailingStep {
    fn kind(&self) -> StepKind {
        StepKind::VirusScan
    }

    fn run(&mut self, run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        run.accept();
        run.add_error("archief/a.pdf: scanner timeout");
        Err(StepError::Execution("scanner unavailable".to_string()))
    }
}

struct PanickingStep;

impl Step for PanickingStep {
    fn kind(&self) -> StepKind {
        StepKind::Unpack
    }

    fn run(&mut self, _run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        panic!("archive index is corrupt");
    }
}

struct WrongPayloadStep;

impl Step for WrongPayloadStep {
    fn kind(&self) -> StepKind {
        StepKind::Upload
    }

    fn run(&mut self, _run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        Ok(StepPayload::VirusScan(VirusScanReport { items: Vec::new() }))
    }
}

fn states(fixture: &Fixture, process_id: ProcessId) -> Vec<ActionStateEvent> {
    fixture
        .store
        .states_for_action(process_id)
        .expect("read states")
}

#[test]
fn successful_step_records_one_started_and_one_completed_state() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(3, 0),
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );

    let outcome = handler.execute().expect("execute");
    assert_eq!(outcome.state, LifecycleState::Completed);
    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(outcome.summary.processed, 3);
    assert_eq!(outcome.summary.accepted, 3);
    assert!(outcome.summary.start.is_some() && outcome.summary.end.is_some());
    assert_eq!(handler.action_process_id(), Some(outcome.process_id));
    assert!(handler.is_topx());
    assert!(!handler.is_mdto());

    let names = states(&fixture, outcome.process_id)
        .into_iter()
        .map(|state| state.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec![StateName::Started, StateName::Completed]);

    let action = fixture
        .store
        .get_action(outcome.process_id)
        .expect("read action")
        .expect("action exists");
    assert_eq!(action.name, "VirusScan");
    assert_eq!(action.action_status, Some(ActionResult::Success));
    assert_eq!(
        action.statistics_summary.map(|summary| summary.processed),
        Some(3)
    );

    let snapshot = read_snapshot(&fixture.folder, StepKind::VirusScan).expect("snapshot");
    assert_eq!(snapshot.state, LifecycleState::Completed);
    assert_eq!(snapshot.process_id, Some(outcome.process_id));
    assert!(matches!(snapshot.payload, Some(StepPayload::VirusScan(_))));
    assert_eq!(
        outcome.snapshot_path,
        Some(snapshot_path(&fixture.folder, StepKind::VirusScan))
    );

    assert_eq!(
        sink.methods(),
        vec![
            "notice",
            "collectionsStatus",
            "collectionStatus",
            "notice",
            "notice",
            "collectionsStatus",
            "collectionStatus",
            "stepFinished",
        ]
    );
}

#[test]
fn notifications_follow_the_committed_database_state() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(1, 0),
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );
    handler.execute().expect("execute");

    let seen = sink.seen();
    let started = seen
        .iter()
        .find(|seen| seen.notice_state == Some(LifecycleState::Started))
        .expect("started notice");
    assert_eq!(
        started.statuses_at_publish,
        vec![Some(ActionResult::Executing)]
    );
    let completed = seen
        .iter()
        .find(|seen| seen.notice_state == Some(LifecycleState::Completed))
        .expect("completed notice");
    assert_eq!(
        completed.statuses_at_publish,
        vec![Some(ActionResult::Success)]
    );
    let progress = seen
        .iter()
        .filter(|seen| seen.notice_state == Some(LifecycleState::Executing))
        .count();
    assert_eq!(progress, 1);
}

#[test]
fn rejected_items_complete_with_error_result() {
    let fixture = fixture(&["dossier.mdto.xml"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(2, 1),
        Arc::new(fixture.store.clone()),
        sink,
    );

    let outcome = handler.execute().expect("execute");
    assert!(handler.is_mdto());
    assert_eq!(outcome.state, LifecycleState::Completed);
    assert_eq!(outcome.result, ActionResult::Error);
    assert_eq!(
        (
            outcome.summary.processed,
            outcome.summary.accepted,
            outcome.summary.rejected
        ),
        (3, 2, 1)
    );
}

#[test]
fn failing_step_records_failed_state_with_all_accumulated_errors() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        FailingStep,
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );

    let outcome = handler.execute().expect("failures are recorded, not returned");
    assert_eq!(outcome.state, LifecycleState::Failed);
    assert_eq!(outcome.result, ActionResult::Failed);
    assert_eq!(outcome.summary.accepted, 1);

    let recorded = states(&fixture, outcome.process_id);
    let names = recorded.iter().map(|state| state.name).collect::<Vec<_>>();
    assert_eq!(names, vec![StateName::Started, StateName::Failed]);
    let messages = fixture
        .store
        .messages_for_state(recorded[1].status_id)
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].description,
        "archief/a.pdf: scanner timeout\nscanner unavailable"
    );

    let snapshot = read_snapshot(&fixture.folder, StepKind::VirusScan).expect("snapshot");
    assert_eq!(snapshot.result, ActionResult::Failed);
    assert_eq!(
        snapshot.failure.map(|failure| failure.message),
        Some("scanner unavailable".to_string())
    );
    assert!(snapshot.payload.is_none());
    assert_eq!(sink.methods().last(), Some(&"stepFinished"));
}

#[test]
fn panicking_step_is_contained_and_recorded_as_failed() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        PanickingStep,
        Arc::new(fixture.store.clone()),
        sink,
    );

    let outcome = handler.execute().expect("panic is contained");
    assert_eq!(outcome.state, LifecycleState::Failed);
    let failure = outcome.failure.expect("failure detail");
    assert!(failure.message.contains("archive index is corrupt"));

    let recorded = states(&fixture, outcome.process_id);
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[1].name, StateName::Failed);
    let messages = fixture
        .store
        .messages_for_state(recorded[1].status_id)
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert!(snapshot_path(&fixture.folder, StepKind::Unpack).is_file());
}

#[test]
fn payload_of_another_step_type_fails_the_run() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        WrongPayloadStep,
        Arc::new(fixture.store.clone()),
        sink,
    );

    let outcome = handler.execute().expect("execute");
    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(outcome
        .failure
        .expect("failure")
        .message
        .contains("`VirusScan` payload"));
}

#[test]
fn mixed_metadata_fails_before_the_step_body_runs() {
    let fixture = fixture(&["dossier.metadata", "dossier.mdto.xml"]);
    let sink = RecordingSink::new(&fixture);
    let step = ScanStep::new(1, 0);
    let ran = step.ran.clone();
    let mut handler = handler(&fixture, step, Arc::new(fixture.store.clone()), sink);

    let outcome = handler.execute().expect("execute");
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(outcome.state, LifecycleState::Failed);
    assert!(outcome
        .failure
        .expect("failure")
        .message
        .contains("1 ToPX and 1 MDTO"));
    let action = fixture
        .store
        .get_action(outcome.process_id)
        .expect("read")
        .expect("action recorded");
    assert_eq!(action.action_status, Some(ActionResult::Failed));
}

#[test]
fn snapshot_write_failure_is_returned_after_state_is_recorded() {
    let fixture = fixture(&["dossier.metadata"]);
    fs::create_dir_all(snapshot_path(&fixture.folder, StepKind::VirusScan))
        .expect("block snapshot path");
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(1, 0),
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );

    let err = handler.execute().expect_err("snapshot cannot be written");
    assert!(matches!(err, LifecycleError::ArtifactWrite { .. }));

    let process_id = handler.action_process_id().expect("process id");
    let names = states(&fixture, process_id)
        .into_iter()
        .map(|state| state.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec![StateName::Started, StateName::Completed]);
    assert_eq!(sink.methods().last(), Some(&"stepFinished"));

    let log = fs::read_to_string(fixture.state_root.join("logs/lifecycle.log")).expect("log");
    assert!(log.contains("step.snapshot_write_failed"));
}

struct BrokenSink;

impl ActionSink for BrokenSink {
    fn add_action(&self, action: &ProcessAction) -> Result<(), StoreError> {
        Err(StoreError::UnknownAction {
            process_id: action.process_id.to_string(),
        })
    }

    fn update_action_result(
        &self,
        process_id: ProcessId,
        _result: ActionResult,
        _summary: &ActionSummary,
        _result_files: &[String],
    ) -> Result<(), StoreError> {
        Err(StoreError::UnknownAction {
            process_id: process_id.to_string(),
        })
    }

    fn add_state(&self, state: &ActionStateEvent) -> Result<(), StoreError> {
        Err(StoreError::UnknownAction {
            process_id: state.process_id.to_string(),
        })
    }

    fn add_state_message(&self, message: &StateMessage) -> Result<(), StoreError> {
        Err(StoreError::UnknownState {
            status_id: message.status_id.to_string(),
        })
    }
}

#[test]
fn lost_audit_writes_do_not_fail_the_step_and_mark_the_collection_degraded() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(&fixture, ScanStep::new(2, 0), Arc::new(BrokenSink), sink);

    let outcome = handler.execute().expect("step still runs");
    assert_eq!(outcome.state, LifecycleState::Completed);
    assert!(outcome.snapshot_path.is_some());

    let registry = CollectionRegistry::new(
        IdentityResolver::new(&fixture.data_root),
        fixture.store.clone(),
    );
    let collection = registry.collection(fixture.session_id).expect("collection");
    let degraded = collection.audit_degraded.expect("degraded marker");
    assert_eq!(degraded.failures, 4);
    assert_eq!(degraded.last_operation, "add_state");

    let log = fs::read_to_string(fixture.state_root.join("logs/store.log")).expect("log");
    assert_eq!(log.matches("store.write_failed").count(), 4);
}

#[test]
fn session_binding_is_validated_and_immutable() {
    let fixture = fixture(&["dossier.metadata"]);
    let resolver = IdentityResolver::new(&fixture.data_root);
    let registry = Arc::new(CollectionRegistry::new(
        resolver.clone(),
        fixture.store.clone(),
    ));
    let controller = Arc::new(ExecutionController::new(
        Arc::new(fixture.store.clone()),
        RecordingSink::new(&fixture),
        registry,
        &fixture.state_root,
    ));
    let mut handler = StepHandler::new(ScanStep::new(1, 0), resolver, controller);

    assert!(matches!(
        handler.execute(),
        Err(LifecycleError::Step(StepError::SessionNotSet))
    ));
    assert!(matches!(
        handler.set_session_guid("  "),
        Err(StepError::Session(_))
    ));
    assert!(matches!(
        handler.set_session_guid("not-a-guid"),
        Err(StepError::Session(_))
    ));
    let unknown = SessionId::from_container_name("other.zip").to_string();
    assert!(handler.set_session_guid(&unknown).is_err());
    assert_eq!(handler.session_guid(), None);

    let bound = handler
        .set_session_guid(&fixture.session_id.to_string())
        .expect("bind");
    assert_eq!(handler.session_guid(), Some(bound));
    handler
        .set_session_guid(&fixture.session_id.to_string())
        .expect("rebinding the same session is a no-op");

    fs::write(fixture.data_root.join("other.zip"), b"zip").expect("second container");
    let other = SessionId::from_container_name("other.zip");
    fs::create_dir_all(fixture.data_root.join(other.to_string())).expect("other folder");
    assert!(matches!(
        handler.set_session_guid(&other.to_string()),
        Err(StepError::SessionAlreadySet { .. })
    ));
}

#[test]
fn helper_state_writers_need_a_bound_action() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(1, 0),
        Arc::new(fixture.store.clone()),
        sink,
    );
    assert!(handler.add_start_state().is_none());

    let outcome = handler.execute().expect("execute");
    let status_id = handler
        .add_failed_state("re-check requested")
        .expect("failed state");
    let messages = fixture
        .store
        .messages_for_state(status_id)
        .expect("messages");
    assert_eq!(messages[0].description, "re-check requested");
    assert_eq!(states(&fixture, outcome.process_id).len(), 3);

    assert!(handler.update_process_action(
        ActionResult::Error,
        &ActionSummary::with_counts(0, 1),
        &["VirusScan.csv".to_string()],
    ));
    let action = fixture
        .store
        .get_action(outcome.process_id)
        .expect("read")
        .expect("action");
    assert_eq!(action.action_status, Some(ActionResult::Error));
    assert_eq!(action.result_files, vec!["VirusScan.csv".to_string()]);

    let manual = handler.add_process_action().expect("bound session");
    assert_ne!(manual, outcome.process_id);
    assert_eq!(handler.action_process_id(), Some(manual));
    assert_eq!(
        fixture
            .store
            .actions_for_session(fixture.session_id)
            .expect("actions")
            .len(),
        2
    );
}

const FULL_RUN: [&str; 8] = [
    "notice",
    "collectionsStatus",
    "collectionStatus",
    "notice",
    "notice",
    "collectionsStatus",
    "collectionStatus",
    "stepFinished",
];

#[test]
fn unreadable_run_settings_of_the_running_session_still_reach_the_worker_service() {
    let fixture = fixture(&["dossier.metadata"]);
    fs::write(fixture.folder.join(RUN_SETTINGS_FILE_NAME), "{ truncated").expect("settings");
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(1, 0),
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );

    let outcome = handler.execute().expect("execute");
    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(sink.methods(), FULL_RUN.to_vec());

    let log = fs::read_to_string(fixture.state_root.join("logs/lifecycle.log")).expect("log");
    assert!(log.contains("registry.read_failed"));
    assert!(log.contains(RUN_SETTINGS_FILE_NAME));
}

#[test]
fn unreadable_run_settings_of_another_session_keep_the_overview_push() {
    let fixture = fixture(&["dossier.metadata"]);
    fs::write(fixture.data_root.join("andere.zip"), b"zip").expect("second container");
    let other = SessionId::from_container_name("andere.zip");
    let other_folder = fixture.data_root.join(other.to_string());
    fs::create_dir_all(&other_folder).expect("other folder");
    fs::write(other_folder.join(RUN_SETTINGS_FILE_NAME), "[1,").expect("settings");
    let sink = RecordingSink::new(&fixture);
    let mut handler = handler(
        &fixture,
        ScanStep::new(1, 0),
        Arc::new(fixture.store.clone()),
        sink.clone(),
    );

    handler.execute().expect("execute");
    assert_eq!(sink.methods(), FULL_RUN.to_vec());
}

fn assert_precondition_failure(fixture: &Fixture, outcome_message: &str, expected: &str) {
    assert!(
        outcome_message.contains(expected),
        "`{outcome_message}` should mention `{expected}`"
    );
    let actions = fixture
        .store
        .actions_for_session(fixture.session_id)
        .expect("actions");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_status, Some(ActionResult::Failed));

    let recorded = states(fixture, actions[0].process_id);
    let failed = recorded
        .iter()
        .filter(|state| state.name == StateName::Failed)
        .collect::<Vec<_>>();
    assert_eq!(failed.len(), 1);
    let messages = fixture
        .store
        .messages_for_state(failed[0].status_id)
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].description.contains(expected));

    let snapshot = read_snapshot(&fixture.folder, StepKind::VirusScan).expect("snapshot");
    assert_eq!(snapshot.state, LifecycleState::Failed);
}

#[test]
fn container_removed_after_binding_fails_the_run_without_running_the_step() {
    let fixture = fixture(&["dossier.metadata"]);
    let sink = RecordingSink::new(&fixture);
    let step = ScanStep::new(1, 0);
    let ran = step.ran.clone();
    let mut handler = handler(&fixture, step, Arc::new(fixture.store.clone()), sink);
    fs::remove_file(fixture.data_root.join(CONTAINER)).expect("remove container");

    let outcome = handler.execute().expect("execute");
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(outcome.state, LifecycleState::Failed);
    let message = outcome.failure.expect("failure").message;
    assert_precondition_failure(&fixture, &message, CONTAINER);
}

#[test]
fn session_without_metadata_fails_the_run_without_running_the_step() {
    let fixture = fixture(&[]);
    let sink = RecordingSink::new(&fixture);
    let step = ScanStep::new(1, 0);
    let ran = step.ran.clone();
    let mut handler = handler(&fixture, step, Arc::new(fixture.store.clone()), sink);

    let outcome = handler.execute().expect("execute");
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(outcome.state, LifecycleState::Failed);
    let message = outcome.failure.expect("failure").message;
    assert_precondition_failure(&fixture, &message, "no ToPX or MDTO metadata");
}

/// Keeps the session each notification belongs to, in arrival order.
#[derive(Default)]
struct SessionOrderSink {
    seen: Mutex<Vec<(&'static str, Option<SessionId>, Option<LifecycleState>)>>,
}

impl NotificationSink for SessionOrderSink {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let entry = match notification {
            Notification::Notice(notice) => (Some(notice.session_id), Some(notice.state)),
            Notification::CollectionsStatus(_) => (None, None),
            Notification::CollectionStatus { session_id, .. }
            | Notification::StepFinished { session_id, .. } => (Some(*session_id), None),
        };
        // Widen the window for another dispatch to slip in between pushes.
        thread::yield_now();
        self.seen
            .lock()
            .expect("seen lock")
            .push((notification.method(), entry.0, entry.1));
        Ok(())
    }
}

#[test]
fn concurrent_dispatches_publish_each_event_as_one_uninterrupted_group() {
    let fixture = fixture(&["dossier.metadata"]);
    fs::write(fixture.data_root.join("tweede.tar"), b"tar").expect("second container");
    let second = SessionId::from_container_name("tweede.tar");
    fs::create_dir_all(fixture.data_root.join(second.to_string())).expect("second folder");

    let resolver = IdentityResolver::new(&fixture.data_root);
    let sink = Arc::new(SessionOrderSink::default());
    let controller = Arc::new(ExecutionController::new(
        Arc::new(fixture.store.clone()),
        sink.clone(),
        Arc::new(CollectionRegistry::new(
            resolver.clone(),
            fixture.store.clone(),
        )),
        &fixture.state_root,
    ));

    const RUNS: usize = 10;
    let barrier = Arc::new(Barrier::new(2));
    let workers = [fixture.session_id, second]
        .into_iter()
        .map(|session_id| {
            let location = resolver.resolve(session_id).expect("resolve");
            let controller = Arc::clone(&controller);
            let barrier = Arc::clone(&barrier);
            let store = fixture.store.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..RUNS {
                    let action = ProcessAction {
                        process_id: ProcessId::generate(),
                        session_id,
                        name: "VirusScan".to_string(),
                        description: "Scan for viruses".to_string(),
                        creation: now_utc(),
                        action_status: Some(ActionResult::Executing),
                        result_files: Vec::new(),
                        statistics_summary: None,
                    };
                    store.add_action(&action).expect("add action");
                    for state in [LifecycleState::Started, LifecycleState::Completed] {
                        let event = LifecycleEvent::new(
                            session_id,
                            Some(action.process_id),
                            StepKind::VirusScan,
                            state,
                            "Scan for viruses",
                            ActionSummary::with_counts(1, 0),
                        );
                        controller
                            .dispatch(&location, &event, None)
                            .expect("dispatch");
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("worker");
    }

    let seen = sink.seen.lock().expect("seen lock").clone();
    assert_eq!(seen.len(), 2 * RUNS * (3 + 4));
    let mut index = 0;
    while index < seen.len() {
        let (method, session, state) = seen[index];
        assert_eq!(method, "notice", "group starts with its notice at {index}");
        let session = session.expect("notice session");
        let mut expected = vec![
            ("collectionsStatus", None),
            ("collectionStatus", Some(session)),
        ];
        if state == Some(LifecycleState::Completed) {
            expected.push(("stepFinished", Some(session)));
        }
        for (offset, (method, owner)) in expected.iter().enumerate() {
            let entry = seen[index + 1 + offset];
            assert_eq!((entry.0, entry.1), (*method, *owner), "entry {}", index + 1 + offset);
        }
        index += 1 + expected.len();
    }
}
