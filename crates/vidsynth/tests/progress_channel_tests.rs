//! Delivery of workflow progress to channel subscribers.

mod common;

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;

use common::{request, ProvidersBuilder, TestHarness};
use vidsynth::pipeline::Workflow;
use vidsynth::{EventKind, JobStatus, ProgressChannel, ProgressEvent};

fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn subscriber_receives_every_stage_in_order() {
    let harness = TestHarness::new();
    let workflow = harness.workflow(ProvidersBuilder::new().build(&harness.output_dir()));
    let job = harness.create_job(&request("Photosynthesis"));

    let mut rx = harness.channel.connect("browser-1");
    harness.channel.subscribe("browser-1", &job.id);

    workflow.run(&job.id, &job.request()).await.unwrap();

    let events = drain(&mut rx);
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![0, 25, 50, 70, 85, 100]);
    assert!(events.iter().all(|e| e.job_id == job.id));
    assert_eq!(events.last().unwrap().kind, EventKind::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_do_not_cross_streams() {
    let harness = TestHarness::new();
    let workflow = Arc::new(harness.workflow(ProvidersBuilder::new().build(&harness.output_dir())));

    let topics = ["Photosynthesis", "Plate tectonics", "Black holes", "Vaccines"];
    let jobs: Vec<_> = topics
        .iter()
        .map(|topic| harness.create_job(&request(topic)))
        .collect();

    let mut receivers = Vec::new();
    for (i, job) in jobs.iter().enumerate() {
        let connection_id = format!("conn-{}", i);
        let rx = harness.channel.connect(&connection_id);
        harness.channel.subscribe(&connection_id, &job.id);
        receivers.push(rx);
    }

    let runs = jobs.iter().map(|job| {
        let workflow = Arc::clone(&workflow);
        let id = job.id.clone();
        let request = job.request();
        tokio::spawn(async move { workflow.run(&id, &request).await })
    });
    for result in join_all(runs).await {
        result.unwrap().unwrap();
    }

    for (job, rx) in jobs.iter().zip(receivers.iter_mut()) {
        let events = drain(rx);
        assert!(events.iter().all(|e| e.job_id == job.id));
        let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![0, 25, 50, 70, 85, 100]);

        let stored = harness.registry.get(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.topic, job.topic);
        assert!(stored
            .script
            .unwrap()
            .narration
            .contains(job.topic.as_str()));
    }
}

#[tokio::test]
async fn late_subscriber_gets_nothing_but_status_is_complete() {
    let harness = TestHarness::new();
    let workflow = harness.workflow(ProvidersBuilder::new().build(&harness.output_dir()));
    let job = harness.create_job(&request("Photosynthesis"));
    workflow.run(&job.id, &job.request()).await.unwrap();

    let mut rx = harness.channel.connect("late");
    harness.channel.subscribe("late", &job.id);

    assert!(drain(&mut rx).is_empty());
    let job = harness.registry.get(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.video_path.is_some());
    assert!(job.blueprint.is_some());
}

#[tokio::test]
async fn every_watcher_of_a_job_gets_the_events() {
    let harness = TestHarness::new();
    let workflow = harness.workflow(ProvidersBuilder::new().build(&harness.output_dir()));
    let first = harness.create_job(&request("Photosynthesis"));
    let second = harness.create_job(&request("Plate tectonics"));

    let mut tab_a = harness.channel.connect("tab-a");
    let mut tab_b = harness.channel.connect("tab-b");
    harness.channel.subscribe("tab-a", &first.id);
    harness.channel.subscribe("tab-b", &first.id);
    harness.channel.subscribe("tab-b", &second.id);

    workflow.run(&first.id, &first.request()).await.unwrap();
    workflow.run(&second.id, &second.request()).await.unwrap();

    assert_eq!(drain(&mut tab_a).len(), 6);
    let b_events = drain(&mut tab_b);
    assert_eq!(b_events.len(), 12);
    for id in [&first.id, &second.id] {
        let progress: Vec<u8> = b_events
            .iter()
            .filter(|e| &e.job_id == id)
            .map(|e| e.progress)
            .collect();
        assert_eq!(progress, vec![0, 25, 50, 70, 85, 100]);
    }
}

#[tokio::test]
async fn disconnected_client_is_dropped() {
    let harness = TestHarness::new();
    let workflow = harness.workflow(ProvidersBuilder::new().build(&harness.output_dir()));
    let job = harness.create_job(&request("Photosynthesis"));

    let mut rx = harness.channel.connect("gone");
    harness.channel.subscribe("gone", &job.id);
    harness.channel.disconnect("gone");

    workflow.run(&job.id, &job.request()).await.unwrap();

    assert!(rx.recv().await.is_none());
    assert_eq!(harness.channel.subscriber_count(&job.id), 0);
    assert_eq!(harness.registry.get(&job.id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn slow_subscriber_never_blocks_the_workflow() {
    let harness = TestHarness::new();
    let channel = Arc::new(ProgressChannel::new(2));
    let workflow = Workflow::new(
        harness.config.clone(),
        ProvidersBuilder::new().build(&harness.output_dir()),
        harness.registry.clone(),
        channel.clone(),
    );
    let job = harness.create_job(&request("Photosynthesis"));

    let mut rx = channel.connect("slow");
    channel.subscribe("slow", &job.id);

    workflow.run(&job.id, &job.request()).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].progress, 0);
    assert_eq!(harness.registry.get(&job.id).unwrap().status, JobStatus::Completed);
}
