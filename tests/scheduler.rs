// tests/scheduler.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clusterdag::errors::ClusterdagError;
use clusterdag::model::{ClusterId, CommandContext, PageRequest};
use clusterdag::plan::persist_plan;
use clusterdag::service::{Orchestrator, OrchestratorOptions};
use clusterdag::store::{MemoryStore, Store};
use clusterdag::types::{Command, CommandLevel, ComponentCategory, JobState};
use clusterdag_test_utils::builders::{seed_cluster, CommandBuilder, StackBuilder};
use clusterdag_test_utils::scripted_agent::ScriptedAgent;
use clusterdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn setup(agent: &ScriptedAgent, max_concurrent_jobs: usize) -> (Orchestrator, ClusterId) {
    init_tracing();
    let stack = StackBuilder::new("demo")
        .service("svc", "svc")
        .component("svc", "a", ComponentCategory::Master)
        .component("svc", "b", ComponentCategory::Master)
        .build();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let cluster_id = seed_cluster(store.as_ref(), &stack, "c1", &["h1"]);
    let options = OrchestratorOptions {
        max_concurrent_jobs,
        ..OrchestratorOptions::default()
    };
    let orch = Orchestrator::new(Arc::new(stack), store, Arc::new(agent.clone()), options);
    (orch, cluster_id)
}

fn start(cluster_id: ClusterId, component: &str) -> CommandContext {
    CommandBuilder::new(CommandLevel::Component, Command::Start)
        .cluster(cluster_id)
        .component(component, &["h1"])
        .build()
}

#[tokio::test]
async fn concurrency_limit_queues_extra_jobs() -> TestResult {
    let agent = ScriptedAgent::new();
    let gate = agent.gate("a");
    let (orch, cluster_id) = setup(&agent, 1);

    let first = orch.submit(&start(cluster_id, "a"))?;
    with_timeout(gate.wait_started()).await;

    let second = orch.submit(&start(cluster_id, "b"))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(agent.calls().len(), 1, "second job must wait for a permit");
    assert!(!second.handle.is_finished());
    assert_eq!(orch.job(second.job_id)?.job.state, JobState::Pending);

    gate.release();
    assert_eq!(with_timeout(first.handle.wait()).await?, JobState::Successful);
    assert_eq!(with_timeout(second.handle.wait()).await?, JobState::Successful);
    assert_eq!(agent.labels(), vec!["a:START@h1", "b:START@h1"]);
    Ok(())
}

#[tokio::test]
async fn independent_jobs_run_side_by_side() -> TestResult {
    let agent = ScriptedAgent::new();
    let gate_a = agent.gate("a");
    let gate_b = agent.gate("b");
    let (orch, cluster_id) = setup(&agent, 2);

    let first = orch.submit(&start(cluster_id, "a"))?;
    let second = orch.submit(&start(cluster_id, "b"))?;

    // Both are inside the agent at the same time.
    with_timeout(gate_a.wait_started()).await;
    with_timeout(gate_b.wait_started()).await;
    assert_eq!(orch.job(first.job_id)?.job.state, JobState::Processing);
    assert_eq!(orch.job(second.job_id)?.job.state, JobState::Processing);

    gate_a.release();
    gate_b.release();
    assert_eq!(with_timeout(first.handle.wait()).await?, JobState::Successful);
    assert_eq!(with_timeout(second.handle.wait()).await?, JobState::Successful);
    Ok(())
}

#[tokio::test]
async fn running_job_cannot_be_retried() -> TestResult {
    let agent = ScriptedAgent::new();
    let gate = agent.gate("a");
    let (orch, cluster_id) = setup(&agent, 4);

    let submission = orch.submit(&start(cluster_id, "a"))?;
    with_timeout(gate.wait_started()).await;
    assert!(orch.is_running(submission.job_id));

    assert!(matches!(
        orch.retry(submission.job_id),
        Err(ClusterdagError::JobAlreadyRunning(id)) if id == submission.job_id
    ));

    gate.release();
    assert_eq!(with_timeout(submission.handle.wait()).await?, JobState::Successful);
    assert!(!orch.is_running(submission.job_id));

    // Finished jobs release their claim; now the state check applies.
    assert!(matches!(
        orch.retry(submission.job_id),
        Err(ClusterdagError::NotRetryable { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn jobs_are_listed_newest_first_per_cluster() -> TestResult {
    let agent = ScriptedAgent::new();
    let (orch, cluster_id) = setup(&agent, 4);

    let mut ids = Vec::new();
    for component in ["a", "b", "a"] {
        let submission = orch.submit(&start(cluster_id, component))?;
        ids.push(submission.job_id);
        with_timeout(submission.handle.wait()).await?;
    }

    let first = orch.list_jobs(Some(cluster_id), PageRequest { page_num: 1, page_size: 2 })?;
    assert_eq!(first.total, 3);
    let listed: Vec<_> = first.items.iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);
    assert!(first.items.iter().all(|j| j.state.is_terminal()));

    let second = orch.list_jobs(Some(cluster_id), PageRequest { page_num: 2, page_size: 2 })?;
    assert_eq!(second.items.iter().map(|j| j.id).collect::<Vec<_>>(), vec![ids[0]]);

    assert_eq!(orch.list_jobs(None, PageRequest::default())?.total, 0);
    Ok(())
}

#[tokio::test]
async fn failed_job_cannot_be_started_again() -> TestResult {
    let agent = ScriptedAgent::new().fail("a");
    let (orch, cluster_id) = setup(&agent, 1);

    let command = CommandBuilder::new(CommandLevel::Component, Command::Start)
        .cluster(cluster_id)
        .component("a", &["h1"])
        .component("b", &["h1"])
        .build();
    let submission = orch.submit(&command)?;
    let job_id = submission.job_id;
    assert_eq!(with_timeout(submission.handle.wait()).await?, JobState::Failed);

    match orch.start(job_id) {
        Err(ClusterdagError::JobNotPending { job_id: id, state }) => {
            assert_eq!(id, job_id);
            assert_eq!(state, JobState::Failed);
        }
        other => panic!("expected JobNotPending, got {other:?}"),
    }

    let snapshot = orch.job(job_id)?;
    assert_eq!(snapshot.job.state, JobState::Failed);
    let stages: Vec<_> = snapshot.stages.iter().map(|s| s.state).collect();
    assert_eq!(stages, vec![JobState::Failed, JobState::Canceled]);
    assert_eq!(agent.labels(), vec!["a:START@h1"]);
    assert!(!orch.is_running(job_id));
    Ok(())
}

#[tokio::test]
async fn persisted_job_starts_once() -> TestResult {
    let agent = ScriptedAgent::new();
    let (orch, cluster_id) = setup(&agent, 1);

    let plan = orch.plan(&start(cluster_id, "a"))?;
    let job_id = persist_plan(orch.store().as_ref(), &plan)?;

    assert_eq!(with_timeout(orch.start(job_id)?.wait()).await?, JobState::Successful);
    assert!(matches!(
        orch.start(job_id),
        Err(ClusterdagError::JobNotPending { state: JobState::Successful, .. })
    ));
    assert!(matches!(orch.start(9_999), Err(ClusterdagError::JobNotFound(9_999))));
    Ok(())
}

#[tokio::test]
async fn job_with_a_finished_stage_is_refused() -> TestResult {
    let agent = ScriptedAgent::new();
    let (orch, cluster_id) = setup(&agent, 1);

    let plan = orch.plan(&start(cluster_id, "a"))?;
    let job_id = persist_plan(orch.store().as_ref(), &plan)?;
    let stage_id = orch.job(job_id)?.stages[0].id;
    orch.store().set_stage_state(stage_id, JobState::Successful)?;

    let outcome = with_timeout(orch.start(job_id)?.wait()).await;
    assert!(
        matches!(outcome, Err(ClusterdagError::StageNotPending { stage_id: id, .. }) if id == stage_id),
        "got {outcome:?}"
    );
    assert!(agent.calls().is_empty());
    assert_eq!(orch.job(job_id)?.job.state, JobState::Pending);
    Ok(())
}
