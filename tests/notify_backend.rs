// tests/notify_backend.rs

//! End to end through the real `notify` backend and the system clock.

mod common;
use crate::common::{init_tracing, wait_until, with_timeout, Fixture, Recorder, TestResult};

use std::time::Duration;

use sourcebox::{ChangeType, SourceBox, WatchState};

/// Long enough for the default rename window plus a stray duplicate event.
const SETTLE: Duration = Duration::from_millis(400);

async fn watching(fx: &Fixture) -> Result<(SourceBox, Recorder), Box<dyn std::error::Error>> {
    let sb = SourceBox::new(&fx.root, None::<&str>);
    let rec = Recorder::new();
    sb.add_handler(rec.handler())?;
    with_timeout(sb.watch()).await?;
    // Let the OS watch settle before touching the tree.
    tokio::time::sleep(Duration::from_millis(100)).await;
    rec.clear();
    Ok((sb, rec))
}

async fn wait_for(rec: &Recorder, count: usize) {
    let seen = rec.clone();
    assert!(
        wait_until(|| seen.len() >= count).await,
        "expected {count} events, got {:?}",
        rec.changes()
    );
}

fn change(kind: ChangeType, path: &str) -> (ChangeType, String) {
    (kind, path.to_string())
}

#[tokio::test]
async fn real_watcher_reports_new_files() -> TestResult {
    init_tracing();
    let fx = Fixture::new();
    let (sb, rec) = watching(&fx).await?;

    fx.write("a.txt", "hello");
    wait_for(&rec, 1).await;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(rec.changes(), vec![change(ChangeType::Create, "a.txt")]);

    sb.unwatch();
    assert!(!sb.is_watching());
    Ok(())
}

#[tokio::test]
async fn real_watcher_reports_deletes() -> TestResult {
    init_tracing();
    let fx = Fixture::new();
    fx.write("a.txt", "hello");
    let (sb, rec) = watching(&fx).await?;

    std::fs::remove_file(fx.path("a.txt"))?;
    wait_for(&rec, 1).await;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(rec.changes(), vec![change(ChangeType::Delete, "a.txt")]);
    assert!(sb.cache().get("a.txt")?.is_none());
    Ok(())
}

#[tokio::test]
async fn real_rename_is_delete_then_create_once() -> TestResult {
    init_tracing();
    let fx = Fixture::new();
    fx.write("a/b.txt", "content");
    std::fs::create_dir_all(fx.path("c"))?;
    let (sb, rec) = watching(&fx).await?;

    std::fs::rename(fx.path("a/b.txt"), fx.path("c/b.txt"))?;
    wait_for(&rec, 2).await;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        rec.changes(),
        vec![
            change(ChangeType::Delete, "a/b.txt"),
            change(ChangeType::Create, "c/b.txt"),
        ]
    );
    assert_eq!(sb.cache().paths()?, vec!["c/b.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn real_rename_into_a_new_directory_is_delete_then_create() -> TestResult {
    init_tracing();
    let fx = Fixture::new();
    fx.write("a/b.txt", "content");
    let (sb, rec) = watching(&fx).await?;

    std::fs::create_dir_all(fx.path("c"))?;
    std::fs::rename(fx.path("a/b.txt"), fx.path("c/b.txt"))?;
    wait_for(&rec, 2).await;
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        rec.changes(),
        vec![
            change(ChangeType::Delete, "a/b.txt"),
            change(ChangeType::Create, "c/b.txt"),
        ]
    );
    assert_eq!(sb.cache().paths()?, vec!["c/b.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn watching_a_missing_root_fails_and_leaves_the_box_stopped() -> TestResult {
    init_tracing();
    let fx = Fixture::new();
    let sb = SourceBox::new(fx.dir.path().join("nope"), None::<&str>);

    assert!(with_timeout(sb.watch()).await.is_err());
    assert_eq!(sb.state(), WatchState::Stopped);
    assert!(!sb.is_watching());
    Ok(())
}
