//! View registry: scope intersection, close semantics, rebind.

mod common;

use common::{open_workspace, two_function_engine, F1, F2};
use osanwe::core::{Addr, AddrRange};
use osanwe::jobs::{JobOutcome, JobSpec};
use osanwe::session::Mutation;
use osanwe::views::{Projection, ViewKind, ViewScope};

#[tokio::test(flavor = "multi_thread")]
async fn view_bound_elsewhere_receives_nothing() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let graph_f1 = workspace.views().open(ViewKind::Graph, ViewScope::Function(F1));
    let graph_f2 = workspace.views().open(ViewKind::Graph, ViewScope::Function(F2));

    let handle = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(handle.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;

    let f1_view = workspace.views().view(graph_f1).expect("open view");
    let f2_view = workspace.views().view(graph_f2).expect("open view");
    assert!(f1_view.render.events_seen > 0);
    assert_eq!(f2_view.render.events_seen, 0);
    // And the notified view's projection reflects the analyzed graph.
    assert_eq!(
        f1_view.render.projection,
        Projection::Graph { blocks: 2, edges: 1 }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_view_gets_zero_further_callbacks() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let listing = workspace
        .views()
        .open(ViewKind::Listing, ViewScope::Function(F1));

    workspace
        .session()
        .apply_mutation(Mutation::SetComment {
            addr: F1,
            text: Some("first".into()),
        })
        .unwrap();
    common::settle(&workspace).await;
    let seen_before = workspace
        .views()
        .view(listing)
        .expect("open view")
        .render
        .events_seen;
    assert_eq!(seen_before, 1);

    assert!(workspace.views().close(listing));
    // N further mutations, zero further callbacks.
    for i in 0..5 {
        workspace
            .session()
            .apply_mutation(Mutation::SetComment {
                addr: F1,
                text: Some(format!("after close {}", i)),
            })
            .unwrap();
    }
    common::settle(&workspace).await;
    assert!(workspace.views().view(listing).is_none());
    assert!(!workspace.views().close(listing));
}

#[tokio::test(flavor = "multi_thread")]
async fn rebind_swaps_scope_atomically() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let graph = workspace.views().open(ViewKind::Graph, ViewScope::Function(F1));

    workspace.views().rebind(graph, ViewScope::Function(F2)).unwrap();

    // After rebind the view tracks F2 only.
    let h2 = workspace.jobs().submit(JobSpec::analyze(F2));
    assert_eq!(h2.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;
    let after_f2 = workspace.views().view(graph).unwrap().render.events_seen;
    assert!(after_f2 > 0);

    let h1 = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(h1.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;
    let after_f1 = workspace.views().view(graph).unwrap().render.events_seen;
    assert_eq!(after_f1, after_f2);

    // Rebinding an unknown view errors.
    let bogus = osanwe::views::ViewId(uuid::Uuid::new_v4());
    assert!(workspace.views().rebind(bogus, ViewScope::Global).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn range_scope_intersects_partial_overlap() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let touching = workspace.views().open(
        ViewKind::Listing,
        ViewScope::Range(AddrRange::new(Addr(0x1030), Addr(0x1100))),
    );
    let disjoint = workspace.views().open(
        ViewKind::Listing,
        ViewScope::Range(AddrRange::new(Addr(0x3000), Addr(0x3100))),
    );

    let handle = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(handle.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;

    assert!(workspace.views().view(touching).unwrap().render.events_seen > 0);
    assert_eq!(workspace.views().view(disjoint).unwrap().render.events_seen, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn body_scoped_view_is_notified_when_its_function_goes_stale() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let handle = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(handle.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;

    // Bound to a slice of f1's body that excludes the entry.
    let body = workspace.views().open(
        ViewKind::Listing,
        ViewScope::Range(AddrRange::new(Addr(0x1010), Addr(0x1030))),
    );

    workspace
        .session()
        .invalidate(AddrRange::new(Addr(0x1018), Addr(0x1028)))
        .unwrap();
    common::settle(&workspace).await;

    // The whole function went stale, so the body slice must hear it.
    let snapshot = workspace.views().view(body).expect("open view");
    assert_eq!(snapshot.render.events_seen, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn decompilation_view_sees_only_fresh_text() {
    let (workspace, _dir) = open_workspace(two_function_engine());
    let view = workspace
        .views()
        .open(ViewKind::Decompilation, ViewScope::Function(F1));

    let analyze = workspace.jobs().submit(JobSpec::analyze(F1));
    assert_eq!(analyze.wait().await, JobOutcome::Done);
    let decompile = workspace.jobs().submit(JobSpec::decompile(F1));
    assert_eq!(decompile.wait().await, JobOutcome::Done);
    common::settle(&workspace).await;
    let snapshot = workspace.views().view(view).unwrap();
    let Projection::Decompilation { text: Some(text) } = snapshot.render.projection else {
        panic!("expected decompiled text, got {:?}", snapshot.render.projection);
    };
    assert!(text.contains("f1"));

    // Patching inside the function stales the artifact; the view's next
    // refresh shows no text rather than inconsistent text.
    workspace
        .session()
        .apply_mutation(Mutation::PatchBytes {
            addr: Addr(0x1010),
            bytes: vec![0x90],
            comment: None,
        })
        .unwrap();
    common::settle(&workspace).await;
    let snapshot = workspace.views().view(view).unwrap();
    assert_eq!(
        snapshot.render.projection,
        Projection::Decompilation { text: None }
    );
}
