//! End-to-end engine runs with a real filesystem watch and a short debounce
//! window. Timing-sensitive, so windows and waits carry generous margins.

use git_fixture::GitFixture;
use std::time::Duration;
use umbra::{shadow, ChangeSummary, Config, Engine};

fn wait_for_summary(
    summaries: &smol::channel::Receiver<ChangeSummary>,
    timeout: Duration,
) -> Option<ChangeSummary> {
    smol::block_on(smol::future::or(
        async { summaries.recv().await.ok() },
        async {
            smol::Timer::after(timeout).await;
            None
        },
    ))
}

fn engine_for(shadow_root: &std::path::Path) -> Engine {
    umbra_log::test();
    Engine::new(Config {
        debounce_secs: 1,
        shadow_root: Some(shadow_root.to_path_buf()),
        ..Config::default()
    })
}

#[test]
fn watched_edit_flows_through_to_a_wip_commit() {
    let fixture = GitFixture::new().expect("fixture");
    fixture.commit_file("a.txt", "x", "base").expect("commit");
    let shadow_root = tempfile::tempdir().expect("root");
    let engine = engine_for(shadow_root.path());
    let summaries = engine.summaries();

    engine.open_repository(fixture.dir()).expect("open");
    fixture.write_file("a.txt", "y").expect("write");

    let summary =
        wait_for_summary(&summaries, Duration::from_secs(20)).expect("summary within 20s");
    assert_eq!(summary.text, "a.txt is modified");

    let root = fixture.dir().canonicalize().expect("canonicalize");
    let shadow_workdir = shadow::shadow_path(shadow_root.path(), &root);
    assert_eq!(
        std::fs::read_to_string(shadow_workdir.join("a.txt")).expect("read"),
        "y"
    );

    let history = engine.wip_history(fixture.dir()).expect("history");
    assert_eq!(history[0].summary, "a.txt is modified");

    engine.shutdown();
}

#[test]
fn bursts_inside_one_window_yield_one_commit() {
    let fixture = GitFixture::new().expect("fixture");
    fixture.commit_file("a.txt", "x", "base").expect("commit");
    let shadow_root = tempfile::tempdir().expect("root");
    let engine = engine_for(shadow_root.path());
    let summaries = engine.summaries();

    engine.open_repository(fixture.dir()).expect("open");
    let baseline = engine.wip_history(fixture.dir()).expect("history").len();

    // Two bursts for the same path, well inside the 1s window.
    fixture.write_file("a.txt", "y").expect("write");
    std::thread::sleep(Duration::from_millis(100));
    fixture.write_file("a.txt", "z").expect("write");

    let summary =
        wait_for_summary(&summaries, Duration::from_secs(20)).expect("summary within 20s");
    assert_eq!(summary.text, "a.txt is modified");

    // Let any spurious second flush land before counting.
    std::thread::sleep(Duration::from_secs(3));
    assert!(
        wait_for_summary(&summaries, Duration::from_millis(100)).is_none(),
        "second burst must not produce a second summary"
    );
    let history = engine.wip_history(fixture.dir()).expect("history");
    assert_eq!(history.len(), baseline + 1, "exactly one commit");

    engine.shutdown();
}

#[test]
fn delete_worktree_works_after_a_restart() {
    let fixture = GitFixture::new().expect("fixture");
    fixture.commit_file("a.txt", "x", "base").expect("commit");
    let shadow_root = tempfile::tempdir().expect("root");

    // First process creates the worktree and exits.
    {
        let engine = engine_for(shadow_root.path());
        engine.open_repository(fixture.dir()).expect("open");
        engine
            .snapshot_now(fixture.dir(), "Before restart")
            .expect("snapshot");
        engine.shutdown();
    }
    let root = fixture.dir().canonicalize().expect("canonicalize");
    let shadow_dir = shadow::shadow_path(shadow_root.path(), &root);
    assert!(shadow_dir.exists(), "worktree survived the first process");

    // Second process deletes it without ever running a batch.
    let engine = engine_for(shadow_root.path());
    engine.open_repository(fixture.dir()).expect("open");
    engine.delete_wip_worktree(fixture.dir()).expect("delete");
    engine.shutdown();

    assert!(!shadow_dir.exists(), "worktree directory must be gone");
}

#[test]
fn mirror_writes_do_not_retrigger_the_watch() {
    let fixture = GitFixture::new().expect("fixture");
    fixture.commit_file("a.txt", "x", "base").expect("commit");
    // The shadow root inside the watched tree is the worst case for
    // self-exclusion.
    let shadow_root = fixture.dir().join("shadow-root");
    let engine = engine_for(&shadow_root);
    let summaries = engine.summaries();

    engine.open_repository(fixture.dir()).expect("open");
    fixture.write_file("a.txt", "y").expect("write");

    let summary =
        wait_for_summary(&summaries, Duration::from_secs(20)).expect("summary within 20s");
    assert_eq!(summary.text, "a.txt is modified");

    // The mirror's own writes under shadow-root must not feed back into a
    // second batch.
    assert!(
        wait_for_summary(&summaries, Duration::from_secs(3)).is_none(),
        "mirror writes fed back into the pipeline"
    );

    engine.shutdown();
}
