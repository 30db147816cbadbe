//! Event delivery order equals commit order, for every subscriber.

mod common;

use common::{collect_events, open_workspace, session_seqs, two_function_engine, F1, F2};
use osanwe::core::Addr;
use osanwe::events::{Event, EventFilter};
use osanwe::jobs::{JobOutcome, JobSpec};
use osanwe::session::Mutation;

#[tokio::test(flavor = "multi_thread")]
async fn all_subscribers_observe_the_same_order() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let mut sub_a = workspace.subscribe(EventFilter::SESSION);
    let mut sub_b = workspace.subscribe(EventFilter::SESSION);

    // A mix of cheap gate mutations.
    for i in 0..10u64 {
        workspace
            .session()
            .apply_mutation(Mutation::SetComment {
                addr: F1,
                text: Some(format!("note {}", i)),
            })
            .expect("comment should commit");
    }

    let seqs_a = session_seqs(&collect_events(&mut sub_a, 10).await);
    let seqs_b = session_seqs(&collect_events(&mut sub_b, 10).await);
    assert_eq!(seqs_a, seqs_b);
    // And the shared order is the commit order: strictly increasing.
    assert!(seqs_a.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_jobs_still_commit_in_one_total_order() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let mut sub_a = workspace.subscribe(EventFilter::SESSION);
    let mut sub_b = workspace.subscribe(EventFilter::SESSION);

    // Disjoint keys: may run concurrently, but commits are serialized at
    // the gate and observed identically by both subscribers.
    let h1 = workspace.jobs().submit(JobSpec::analyze(F1));
    let h2 = workspace.jobs().submit(JobSpec::analyze(F2));
    assert_eq!(h1.wait().await, JobOutcome::Done);
    assert_eq!(h2.wait().await, JobOutcome::Done);

    // Each analyze commits BeginAnalysis + ApplyAnalysis: 4 session
    // events total.
    let seqs_a = session_seqs(&collect_events(&mut sub_a, 4).await);
    let seqs_b = session_seqs(&collect_events(&mut sub_b, 4).await);
    assert_eq!(seqs_a, seqs_b);
    assert!(seqs_a.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread")]
async fn events_reflect_already_applied_state() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let mut sub = workspace.subscribe(EventFilter::SESSION);

    let handle = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(handle.wait().await, JobOutcome::Done);

    // By the time FunctionAnalyzed arrives, the session already serves
    // the analyzed snapshot: no speculative notifications.
    for event in collect_events(&mut sub, 2).await {
        let Event::Session(cs) = event else { continue };
        for change in &cs.changes {
            if let osanwe::session::Change::FunctionAnalyzed { entry, .. } = change {
                let f = workspace.session().function(*entry).expect("function");
                assert!(!f.blocks.is_empty());
                assert_eq!(f.status, osanwe::core::AnalysisStatus::Complete);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_mutations_publish_nothing() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let mut sub = workspace.subscribe(EventFilter::SESSION);

    workspace
        .session()
        .apply_mutation(Mutation::SetComment {
            addr: Addr(0x9999_9999),
            text: Some("nowhere".into()),
        })
        .expect_err("unmapped address must be rejected");
    workspace
        .session()
        .apply_mutation(Mutation::SetComment {
            addr: F1,
            text: Some("real".into()),
        })
        .expect("mapped address commits");

    let events = collect_events(&mut sub, 1).await;
    let seqs = session_seqs(&events);
    assert_eq!(seqs, vec![1]);
}
