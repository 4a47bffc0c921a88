//! End-to-end run tests against scripted completions.

mod common;

use async_trait::async_trait;
use common::{CritiquePolicy, ScriptedDriver, Stage, StaticSource, test_config};
use novelist_core::{
    Concept, ConceptId, ConceptStatus, HistoryRecord, ManuscriptDraft, RunId, RunPhase, RunState,
    Score,
};
use novelist_error::{
    CompletionErrorKind, NovelistErrorKind, NovelistResult, StorageError, StorageErrorKind,
};
use novelist_interface::RunStore;
use novelist_pipeline::{RunCoordinator, RunRequest};
use novelist_storage::{FileRunStore, InMemoryRunStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

fn run_id(name: &str) -> RunId {
    name.parse().unwrap()
}

fn coordinator(
    driver: Arc<ScriptedDriver>,
    source: StaticSource,
    store: Arc<dyn RunStore>,
) -> RunCoordinator {
    RunCoordinator::new(driver, Arc::new(source), store)
}

async fn assert_contiguous(store: &dyn RunStore, run_id: &RunId, concept_id: ConceptId) -> usize {
    let history = store.load_history(run_id, concept_id).await.unwrap();
    for (index, draft) in history.iter().enumerate() {
        assert_eq!(*draft.iteration() as usize, index, "gap in {concept_id}");
    }
    history.len()
}

#[tokio::test]
async fn test_two_ideas_from_ten_segments_both_done() {
    let driver = Arc::new(ScriptedDriver::new().ideas_per_response(2));
    let store = Arc::new(InMemoryRunStore::new());
    let coordinator = coordinator(driver.clone(), StaticSource::with_segments(10), store.clone());
    let id = run_id("two-ideas");

    let summary = coordinator
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 3)))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert!(!summary.paused);
    assert_eq!(summary.completed.len(), 2);
    assert!(summary.failed.is_empty());

    let concepts = store.load_concepts(&id).await.unwrap();
    assert_eq!(concepts.len(), 2);
    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(state.selected().len(), 2);
    assert_eq!(*state.phase(), RunPhase::Complete);

    for concept in &concepts {
        let drafts = assert_contiguous(store.as_ref(), &id, *concept.id()).await;
        assert!(drafts >= 1 && drafts <= 3);
        assert_eq!(state.status_of(*concept.id()), Some(&ConceptStatus::Done));
        assert!(store.manuscript(&id, *concept.id()).await.is_some());
    }
    assert_eq!(driver.calls(Stage::Ideas), 1);
    assert_eq!(driver.calls(Stage::Evaluation), 2);
}

#[tokio::test]
async fn test_resuming_complete_run_makes_no_calls() {
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("idempotent");
    let first = Arc::new(ScriptedDriver::new());
    coordinator(first, StaticSource::with_segments(3), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 2)))
        .await
        .unwrap();

    let second = Arc::new(ScriptedDriver::new());
    let saves_before = store.state_saves(&id).await;
    let summary = coordinator(second.clone(), StaticSource::unreadable(), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 2)))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(second.total_calls(), 0);
    assert_eq!(store.state_saves(&id).await, saves_before);
}

#[tokio::test]
async fn test_fatal_idea_generation_leaves_phase_and_records_failure() {
    let driver = Arc::new(ScriptedDriver::new().fail_once(
        Stage::Ideas,
        CompletionErrorKind::Unauthorized("bad key".into()),
    ));
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("fatal-ideas");

    let err = coordinator(driver.clone(), StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 3)))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), NovelistErrorKind::Completion(_)));

    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(*state.phase(), RunPhase::IdeaGeneration);
    assert!(state.failure().as_deref().unwrap().contains("bad key"));
    assert_eq!(driver.calls(Stage::Ideas), 1);
}

#[tokio::test]
async fn test_unreadable_source_is_persisted_as_run_failure() {
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("no-source");

    let result = coordinator(
        Arc::new(ScriptedDriver::new()),
        StaticSource::unreadable(),
        store.clone(),
    )
    .run(RunRequest::new(id.clone(), "missing.txt", test_config(2, 3)))
    .await;
    assert!(result.is_err());

    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(*state.phase(), RunPhase::IdeaGeneration);
    assert!(state.failure().is_some());
}

#[tokio::test]
async fn test_no_usable_ideas_aborts_run() {
    let driver = Arc::new(ScriptedDriver::new().idea_responses(vec![
        "I cannot help with that.".to_string(),
        "```json\n[{\"name\": \"half\"}]\n```".to_string(),
        "still nothing".to_string(),
        "nope".to_string(),
    ]));
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("no-ideas");

    let err = coordinator(driver.clone(), StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 3)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No ideas"));
    // One request plus three extra rounds
    assert_eq!(driver.calls(Stage::Ideas), 4);
}

#[tokio::test]
async fn test_refinement_never_exceeds_requested_or_evaluated() {
    // Only one usable concept per response and no extra rounds
    let driver = Arc::new(ScriptedDriver::new().ideas_per_response(1));
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("bounded");
    let mut config = test_config(4, 2);
    config.run.extra_idea_rounds = 0;

    let summary = coordinator(driver, StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", config))
        .await
        .unwrap();

    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(state.concept_ids().len(), 1);
    assert_eq!(state.selected().len(), 1);
    assert!(state.selected().len() <= (*state.requested_ideas() as usize).min(state.concept_ids().len()));
    assert_eq!(summary.completed.len(), 1);
}

#[tokio::test]
async fn test_select_top_k_picks_best_rated() {
    let driver = Arc::new(
        ScriptedDriver::new()
            .ideas_per_response(3)
            .rating("idea_1", 4)
            .rating("idea_2", 9)
            .rating("idea_3", 6),
    );
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("top-k");
    let mut config = test_config(3, 1);
    config.run.select_top_k = Some(2);

    coordinator(driver, StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", config))
        .await
        .unwrap();

    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(state.selected(), &vec![ConceptId::new(2), ConceptId::new(3)]);
    assert_eq!(store.load_scores(&id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_cancelled_run_pauses_and_resumes_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileRunStore::new(dir.path()));
    let id = run_id("pause-resume");
    let token = CancellationToken::new();
    let mut config = test_config(2, 4);
    config.run.workers = 1;

    let first = Arc::new(
        ScriptedDriver::new()
            .critique_policy(CritiquePolicy::Never)
            .cancel_on(Stage::Critique, 2, token.clone()),
    );
    let summary = coordinator(first, StaticSource::with_segments(10), store.clone())
        .with_cancellation(token)
        .run(RunRequest::new(id.clone(), "melos.txt", config.clone()))
        .await
        .unwrap();

    assert!(summary.paused);
    assert_eq!(summary.phase, RunPhase::Refinement);
    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status_of(ConceptId::new(1)), Some(&ConceptStatus::Paused));
    assert_eq!(state.status_of(ConceptId::new(2)), Some(&ConceptStatus::Paused));

    // Simulate a crash in the middle of an append
    let history_path = store
        .concept_dir(&id, ConceptId::new(1))
        .join("history.jsonl");
    let mut bytes = std::fs::read(&history_path).unwrap();
    bytes.extend_from_slice(b"{\"record\":\"draft\",\"concept_");
    std::fs::write(&history_path, bytes).unwrap();

    let second = Arc::new(ScriptedDriver::new().critique_policy(CritiquePolicy::Never));
    let summary = coordinator(second.clone(), StaticSource::with_segments(10), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", config))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.completed.len(), 2);
    assert_eq!(second.calls(Stage::Ideas), 0);
    assert_eq!(second.calls(Stage::Evaluation), 0);
    for concept_id in [ConceptId::new(1), ConceptId::new(2)] {
        assert_eq!(assert_contiguous(store.as_ref(), &id, concept_id).await, 4);
    }
}

#[tokio::test]
async fn test_summary_is_requested_once_and_reused() {
    let driver = Arc::new(ScriptedDriver::new());
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("summarized");
    let mut config = test_config(2, 1);
    config.run.summarize_source = true;

    coordinator(driver.clone(), StaticSource::with_segments(10), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", config))
        .await
        .unwrap();

    assert_eq!(driver.calls(Stage::Summary), 1);
    let state = store.load_state(&id).await.unwrap().unwrap();
    assert!(state.source_summary().is_some());
    assert!(driver.prompts(Stage::Ideas)[0].contains("A runner keeps his promise"));
    assert!(driver.prompts(Stage::Draft)[0].contains("A runner keeps his promise"));
}

#[tokio::test]
async fn test_seed_concepts_are_shown_and_not_duplicated() {
    let seed = serde_json::json!({
        "name": "idea_1",
        "setting": "Setting number 1",
        "plot": "Plot number 1"
    });
    let driver = Arc::new(ScriptedDriver::new().ideas_per_response(2));
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("seeded");

    coordinator(driver.clone(), StaticSource::with_segments(5), store.clone())
        .run(
            RunRequest::new(id.clone(), "melos.txt", test_config(2, 1))
                .with_seed_concepts(vec![seed]),
        )
        .await
        .unwrap();

    let prompts = driver.prompts(Stage::Ideas);
    assert!(prompts[0].contains("Setting number 1"));
    let concepts = store.load_concepts(&id).await.unwrap();
    assert_eq!(concepts.len(), 2);
    assert!(concepts.iter().all(|c| c.setting() != "Setting number 1"));
    // The duplicate of the seed cost one extra round
    assert_eq!(prompts.len(), 2);
}

/// Store whose history appends start failing after a budget. When
/// `interrupt` is set, exporting a manuscript cancels that token.
struct FlakyStore {
    inner: InMemoryRunStore,
    appends_left: AtomicUsize,
    interrupt: Option<CancellationToken>,
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn load_state(&self, run_id: &RunId) -> NovelistResult<Option<RunState>> {
        self.inner.load_state(run_id).await
    }

    async fn save_state(&self, state: &RunState) -> NovelistResult<()> {
        self.inner.save_state(state).await
    }

    async fn save_concepts(&self, run_id: &RunId, concepts: &[Concept]) -> NovelistResult<()> {
        self.inner.save_concepts(run_id, concepts).await
    }

    async fn load_concepts(&self, run_id: &RunId) -> NovelistResult<Vec<Concept>> {
        self.inner.load_concepts(run_id).await
    }

    async fn save_scores(&self, run_id: &RunId, scores: &[Score]) -> NovelistResult<()> {
        self.inner.save_scores(run_id, scores).await
    }

    async fn load_scores(&self, run_id: &RunId) -> NovelistResult<Vec<Score>> {
        self.inner.load_scores(run_id).await
    }

    async fn append_history(&self, run_id: &RunId, record: &HistoryRecord) -> NovelistResult<()> {
        let left = self.appends_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StorageError::new(StorageErrorKind::Io("disk full".into())).into());
        }
        self.appends_left.store(left - 1, Ordering::SeqCst);
        self.inner.append_history(run_id, record).await
    }

    async fn load_history(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
    ) -> NovelistResult<Vec<ManuscriptDraft>> {
        self.inner.load_history(run_id, concept_id).await
    }

    async fn export_manuscript(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
        text: &str,
    ) -> NovelistResult<()> {
        if let Some(token) = &self.interrupt {
            token.cancel();
        }
        self.inner.export_manuscript(run_id, concept_id, text).await
    }
}

#[tokio::test]
async fn test_failed_concept_can_be_reopened_and_finished() {
    let inner = InMemoryRunStore::new();
    let flaky = Arc::new(FlakyStore {
        inner: inner.clone(),
        appends_left: AtomicUsize::new(2),
        interrupt: None,
    });
    let id = run_id("reopen");
    let mut config = test_config(1, 3);
    config.run.workers = 1;
    let driver = Arc::new(ScriptedDriver::new().critique_policy(CritiquePolicy::Never));

    let summary = coordinator(driver.clone(), StaticSource::with_segments(5), flaky)
        .run(RunRequest::new(id.clone(), "melos.txt", config.clone()))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].1.contains("disk full"));

    let healthy: Arc<dyn RunStore> = Arc::new(inner.clone());
    let coordinator = coordinator(driver.clone(), StaticSource::with_segments(5), healthy);
    let state = coordinator.reopen(&id, ConceptId::new(1)).await.unwrap();
    assert_eq!(*state.phase(), RunPhase::Refinement);

    let summary = coordinator
        .run(RunRequest::new(id.clone(), "melos.txt", config))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.completed, vec![ConceptId::new(1)]);
    assert_eq!(assert_contiguous(&inner, &id, ConceptId::new(1)).await, 3);

    let report = coordinator.report(&id).await.unwrap();
    assert_eq!(report.drafts.get(&ConceptId::new(1)), Some(&3));
    let text = report.to_string();
    assert!(text.contains("Run reopen [complete]"));
    assert!(text.contains("idea-001"));

    // Done concepts stay done
    assert!(coordinator.reopen(&id, ConceptId::new(1)).await.is_err());
}

#[tokio::test]
async fn test_interrupt_after_last_export_is_not_a_pause() {
    let token = CancellationToken::new();
    let store = Arc::new(FlakyStore {
        inner: InMemoryRunStore::new(),
        appends_left: AtomicUsize::new(usize::MAX),
        interrupt: Some(token.clone()),
    });
    let id = run_id("late-interrupt");
    let driver = Arc::new(ScriptedDriver::new().ideas_per_response(1));

    let summary = coordinator(driver, StaticSource::with_segments(5), store.clone())
        .with_cancellation(token.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(1, 3)))
        .await
        .unwrap();

    assert!(token.is_cancelled());
    assert!(summary.is_complete());
    assert!(!summary.paused);
    assert_eq!(summary.completed, vec![ConceptId::new(1)]);
    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(*state.phase(), RunPhase::Complete);
}

#[tokio::test]
async fn test_failed_extra_idea_round_keeps_accepted_concepts() {
    let driver = Arc::new(
        ScriptedDriver::new()
            .ideas_per_response(1)
            .fail_after(Stage::Ideas, 1, CompletionErrorKind::Timeout("down".into())),
    );
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("partial-ideas");

    let summary = coordinator(driver.clone(), StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 3)))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert!(summary.failed.is_empty());
    assert_eq!(summary.completed, vec![ConceptId::new(1)]);
    assert_eq!(store.load_concepts(&id).await.unwrap().len(), 1);
    // One answered request, then one round of exhausted retries
    assert_eq!(driver.calls(Stage::Ideas), 4);
    let state = store.load_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status_of(ConceptId::new(1)), Some(&ConceptStatus::Done));
}

#[tokio::test]
async fn test_failing_first_idea_request_fails_the_run() {
    let driver = Arc::new(ScriptedDriver::new().fail_after(
        Stage::Ideas,
        0,
        CompletionErrorKind::Http {
            status: 401,
            message: "bad key".into(),
        },
    ));
    let store = Arc::new(InMemoryRunStore::new());
    let id = run_id("no-ideas");

    let result = coordinator(driver.clone(), StaticSource::with_segments(5), store.clone())
        .run(RunRequest::new(id.clone(), "melos.txt", test_config(2, 3)))
        .await;

    assert!(result.is_err());
    assert_eq!(driver.calls(Stage::Ideas), 1);
    assert!(store.load_concepts(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_report_of_unknown_run_fails() {
    let coordinator = coordinator(
        Arc::new(ScriptedDriver::new()),
        StaticSource::with_segments(1),
        Arc::new(InMemoryRunStore::new()),
    );
    assert!(coordinator.report(&run_id("ghost")).await.is_err());
}
