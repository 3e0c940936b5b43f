mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{started, test_config, wait_terminal, FakeAgent};
use switchboard::config::SaturationPolicy;
use switchboard::protocol::{AgentTransport, ProtocolClient};
use switchboard::scheduler::NO_SUITABLE_AGENT;
use switchboard::{AgentStatus, Message, Role, SchedulerError, Task, TaskState};

fn task(text: &str) -> Task {
    Task::new(Message::text(Role::User, text))
}

#[tokio::test]
async fn task_without_agents_fails_with_reason() {
    let coordinator = started(test_config()).await;

    for i in 0..5 {
        let id = coordinator.submit_task(task(&format!("job {i}"))).await.unwrap();
        let status = wait_terminal(&coordinator, &id).await;
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.error.as_deref(), Some(NO_SUITABLE_AGENT));
    }
    assert_eq!(coordinator.snapshot().scheduler.failed_total, 5);
    coordinator.stop().await;
}

#[tokio::test]
async fn successful_dispatch_walks_the_state_machine_and_releases_load() {
    let agent = FakeAgent::spawn("Worker", &["echo"]).await;
    let gate = agent.gate();
    let coordinator = started(test_config()).await;
    let record = coordinator.register_agent(&agent.url, false).await.unwrap();

    let id = coordinator
        .submit_task(task("hello").with_context("ctx-1").with_session("sess-1"))
        .await
        .unwrap();
    let first = coordinator.task_status(&id).unwrap().state;
    assert!(matches!(first, TaskState::Submitted | TaskState::InProgress));

    // the agent holds the request: one dispatch in flight
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while agent.task_hits() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "agent never contacted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(coordinator.task_status(&id).unwrap().state, TaskState::InProgress);
    assert_eq!(coordinator.scheduler().load(&record.id), 1);

    gate.add_permits(1);
    let status = wait_terminal(&coordinator, &id).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(coordinator.scheduler().load(&record.id), 0);

    let snapshot = coordinator.scheduler().task(&id).unwrap();
    assert_eq!(snapshot.assigned_agent.as_deref(), Some(record.id.as_str()));
    assert_eq!(snapshot.history.len(), 2);
    assert_eq!(snapshot.history[1].role, Role::Agent);
    assert_eq!(snapshot.artifacts.len(), 1);

    let envelope = agent.last_envelope().unwrap();
    assert_eq!(envelope["a2a_protocol"]["message_type"], "task_request");
    assert_eq!(envelope["a2a_protocol"]["version"], "1.0");
    assert_eq!(envelope["a2a_protocol"]["source_agent"], "switchboard");
    assert_eq!(envelope["a2a_protocol"]["target_agent"], "Worker");
    assert!(envelope["a2a_protocol"]["correlation_id"].is_string());
    assert_eq!(envelope["payload"]["task_id"], id.as_str());
    assert_eq!(envelope["payload"]["context_id"], "ctx-1");
    assert_eq!(envelope["payload"]["session_id"], "sess-1");
    assert_eq!(envelope["payload"]["message"]["parts"][0]["content"], "hello");
    coordinator.stop().await;
}

#[tokio::test]
async fn failed_dispatch_without_alternate_marks_agent_unhealthy() {
    let agent = FakeAgent::spawn("Broken", &[]).await.failing();
    let coordinator = started(test_config()).await;
    let record = coordinator.register_agent(&agent.url, false).await.unwrap();

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    let status = wait_terminal(&coordinator, &id).await;

    assert_eq!(status.state, TaskState::Failed);
    assert!(status.error.unwrap().contains("500"));
    assert_eq!(
        coordinator.get_agent(&record.id).unwrap().status,
        AgentStatus::Unhealthy
    );
    assert_eq!(coordinator.scheduler().load(&record.id), 0);
    assert_eq!(agent.task_hits(), 1);
    coordinator.stop().await;
}

#[tokio::test]
async fn failover_uses_exactly_one_alternate() {
    let broken = FakeAgent::spawn("Broken", &[]).await.failing();
    let healthy = FakeAgent::spawn("Healthy", &[]).await;
    let bystander = FakeAgent::spawn("Bystander", &[]).await;
    let mut cfg = test_config();
    cfg.scheduler.workers = 1;
    let coordinator = started(cfg).await;
    let broken_record = coordinator.register_agent(&broken.url, false).await.unwrap();
    let healthy_record = coordinator.register_agent(&healthy.url, false).await.unwrap();
    coordinator.register_agent(&bystander.url, false).await.unwrap();

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    let status = wait_terminal(&coordinator, &id).await;

    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(
        coordinator.get_agent(&broken_record.id).unwrap().status,
        AgentStatus::Unhealthy
    );
    assert_eq!(broken.task_hits(), 1);
    assert_eq!(healthy.task_hits(), 1);
    assert_eq!(bystander.task_hits(), 0);
    assert_eq!(
        coordinator.scheduler().task(&id).unwrap().assigned_agent,
        Some(healthy_record.id)
    );
    coordinator.stop().await;
}

#[tokio::test]
async fn failover_stops_after_second_failure() {
    let first = FakeAgent::spawn("First", &[]).await.failing();
    let second = FakeAgent::spawn("Second", &[]).await.failing();
    let third = FakeAgent::spawn("Third", &[]).await;
    let mut cfg = test_config();
    cfg.scheduler.workers = 1;
    let coordinator = started(cfg).await;
    for agent in [&first, &second, &third] {
        coordinator.register_agent(&agent.url, false).await.unwrap();
    }

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    let status = wait_terminal(&coordinator, &id).await;

    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(first.task_hits() + second.task_hits(), 2);
    assert_eq!(third.task_hits(), 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn cancel_on_completed_task_is_rejected() {
    let agent = FakeAgent::spawn("Worker", &[]).await;
    let coordinator = started(test_config()).await;
    coordinator.register_agent(&agent.url, false).await.unwrap();

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    let done = wait_terminal(&coordinator, &id).await;
    assert_eq!(done.state, TaskState::Completed);

    assert!(!coordinator.cancel_task(&id));
    assert_eq!(coordinator.task_status(&id).unwrap(), done);
    coordinator.stop().await;
}

#[tokio::test]
async fn cancel_during_dispatch_is_final() {
    let agent = FakeAgent::spawn("Slow", &[]).await;
    let gate = agent.gate();
    let coordinator = started(test_config()).await;
    let record = coordinator.register_agent(&agent.url, false).await.unwrap();

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    while agent.task_hits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.cancel_task(&id));
    assert!(!coordinator.cancel_task(&id));

    gate.add_permits(1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while coordinator.scheduler().load(&record.id) != 0 {
        assert!(tokio::time::Instant::now() < deadline, "dispatch never resolved");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(coordinator.task_status(&id).unwrap().state, TaskState::Cancelled);
    let stats = coordinator.snapshot().scheduler;
    assert_eq!(stats.cancelled_total, 1);
    assert_eq!(stats.completed_total, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn least_loaded_agent_receives_the_next_task() {
    let busy = FakeAgent::spawn("Busy", &[]).await;
    let idle = FakeAgent::spawn("Idle", &[]).await;
    let busy_gate = busy.gate();
    let coordinator = started(test_config()).await;
    let busy_record = coordinator.register_agent(&busy.url, false).await.unwrap();
    coordinator.register_agent(&idle.url, false).await.unwrap();

    // ties go to the first registered agent
    let held = coordinator.submit_task(task("first")).await.unwrap();
    while busy.task_hits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(coordinator.scheduler().load(&busy_record.id), 1);

    let next = coordinator.submit_task(task("second")).await.unwrap();
    assert_eq!(wait_terminal(&coordinator, &next).await.state, TaskState::Completed);
    assert_eq!(idle.task_hits(), 1);
    assert_eq!(busy.task_hits(), 1);

    busy_gate.add_permits(1);
    assert_eq!(wait_terminal(&coordinator, &held).await.state, TaskState::Completed);
    assert_eq!(coordinator.scheduler().load(&busy_record.id), 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn saturated_queue_rejects_new_work() {
    let agent = FakeAgent::spawn("Slow", &[]).await;
    let gate = agent.gate();
    let mut cfg = test_config();
    cfg.scheduler.workers = 1;
    cfg.scheduler.queue_capacity = 1;
    cfg.scheduler.saturation = SaturationPolicy::Reject;
    let coordinator = started(cfg).await;
    coordinator.register_agent(&agent.url, false).await.unwrap();

    let in_flight = coordinator.submit_task(task("one")).await.unwrap();
    while agent.task_hits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let queued = coordinator.submit_task(task("two")).await.unwrap();
    let err = coordinator.submit_task(task("three")).await.unwrap_err();
    assert_eq!(err, SchedulerError::Saturated { capacity: 1 });
    assert_eq!(coordinator.snapshot().scheduler.queued, 1);

    gate.add_permits(2);
    for id in [in_flight, queued] {
        assert_eq!(wait_terminal(&coordinator, &id).await.state, TaskState::Completed);
    }
    coordinator.stop().await;
}

#[tokio::test]
async fn blocking_policy_waits_for_queue_space() {
    let agent = FakeAgent::spawn("Slow", &[]).await;
    let gate = agent.gate();
    let mut cfg = test_config();
    cfg.scheduler.workers = 1;
    cfg.scheduler.queue_capacity = 1;
    cfg.scheduler.saturation = SaturationPolicy::Block;
    let coordinator = started(cfg).await;
    coordinator.register_agent(&agent.url, false).await.unwrap();

    coordinator.submit_task(task("one")).await.unwrap();
    while agent.task_hits() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    coordinator.submit_task(task("two")).await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        coordinator.submit_task(task("three")),
    )
    .await;
    assert!(blocked.is_err(), "submit should wait while the queue is full");

    gate.add_permits(3);
    let id = tokio::time::timeout(Duration::from_secs(5), coordinator.submit_task(task("four")))
        .await
        .expect("queue space frees up")
        .unwrap();
    assert_eq!(wait_terminal(&coordinator, &id).await.state, TaskState::Completed);
    coordinator.stop().await;
}

#[tokio::test]
async fn card_declared_endpoint_is_used_for_dispatch() {
    let agent = FakeAgent::spawn("Custom", &[]).await;
    agent.state.declare_endpoint.store(true, Ordering::SeqCst);
    let coordinator = started(test_config()).await;
    coordinator.register_agent(&agent.url, false).await.unwrap();

    let id = coordinator.submit_task(task("hello")).await.unwrap();
    assert_eq!(wait_terminal(&coordinator, &id).await.state, TaskState::Completed);
    assert_eq!(agent.state.custom_hits.load(Ordering::SeqCst), 1);
    coordinator.stop().await;
}

#[tokio::test]
async fn status_poll_reaches_the_agent() {
    let agent = FakeAgent::spawn("Worker", &[]).await;
    let client = ProtocolClient::new(&Default::default(), &Default::default()).unwrap();

    let body = client.get_status(&agent.url, "task 1/a").await.unwrap();
    assert_eq!(body["task_id"], "task 1/a");
    assert_eq!(body["status"], "completed");
    assert!(client.health_check(&agent.url).await);

    agent.set_healthy(false);
    assert!(!client.health_check(&agent.url).await);
}

#[tokio::test]
async fn stopped_platform_rejects_submissions() {
    let coordinator = started(test_config()).await;
    coordinator.stop().await;
    assert_eq!(
        coordinator.submit_task(task("late")).await.unwrap_err(),
        SchedulerError::NotRunning
    );
}
