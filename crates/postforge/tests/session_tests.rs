//! Session store round trips: snapshot overwrite, log append, archive bundle.

use std::fs::{self, File};
use std::path::Path;

use postforge::orchestrator::{BatchPhase, BatchRun};
use postforge::plan::{ContentPlan, Post, PromptOption};
use postforge::session::{LogEntry, SessionError, SessionStore, ARCHIVE_FILE, LOG_FILE};

fn sample_run() -> BatchRun {
    BatchRun::from_plan(
        ContentPlan {
            posts: vec![Post {
                id: 1,
                concept: "Phrasal verbs".into(),
                description: "Teach three phrasal verbs".into(),
                options: vec![
                    PromptOption::new("watercolor kiwi reading"),
                    PromptOption::new("vector badge kiwi"),
                ],
            }],
        },
        "3 posts, one about phrasal verbs",
    )
}

fn sample_entry(n: u32) -> LogEntry {
    LogEntry::new(
        "3 posts, one about phrasal ver",
        n,
        "Phrasal verbs",
        "1",
        "a, prompt with a comma",
        Path::new("output/post_1_opt_1_20260101000000.png"),
    )
}

#[test]
fn snapshot_roundtrip_preserves_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    let run = sample_run();
    store.save_snapshot(&run).unwrap();
    let restored = store.load_snapshot().unwrap();

    assert_eq!(restored.phase, BatchPhase::PlanReady);
    assert_eq!(restored.brief_snippet, run.brief_snippet);
    assert_eq!(restored.posts.len(), 1);
    assert_eq!(restored.posts[0].options.len(), 2);
    assert_eq!(
        restored.posts[0].options[1].original_prompt,
        "vector badge kiwi"
    );
}

#[test]
fn snapshot_is_overwritten_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    let mut run = sample_run();
    store.save_snapshot(&run).unwrap();

    run.advance(BatchPhase::Rendering, None).unwrap();
    run.advance(BatchPhase::ImagesGenerated, None).unwrap();
    run.attempted = 2;
    store.save_snapshot(&run).unwrap();

    let restored = store.load_snapshot().unwrap();
    assert_eq!(restored.phase, BatchPhase::ImagesGenerated);
    assert_eq!(restored.attempted, 2);
    assert_eq!(restored.transitions.len(), 2);
}

#[test]
fn missing_snapshot_is_a_clear_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let err = store.load_snapshot().unwrap_err();
    assert!(matches!(err, SessionError::Missing(_)));
    assert!(err.to_string().contains("run `generate` first"));
}

#[test]
fn clear_snapshot_keeps_log_and_images() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    store.save_snapshot(&sample_run()).unwrap();
    store.append_log(&[sample_entry(1)]).unwrap();
    fs::write(dir.path().join("post_1_opt_1_x.png"), b"img").unwrap();

    store.clear_snapshot().unwrap();

    assert!(store.load_snapshot().is_err());
    assert!(dir.path().join(LOG_FILE).exists());
    assert!(dir.path().join("post_1_opt_1_x.png").exists());
}

#[test]
fn log_header_is_written_exactly_once_across_appends() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    store.append_log(&[sample_entry(1), sample_entry(2)]).unwrap();
    store.append_log(&[sample_entry(3)]).unwrap();

    let raw = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
    let header_count = raw.lines().filter(|l| l.starts_with("date,")).count();
    assert_eq!(header_count, 1);
    // Header + 3 rows.
    assert_eq!(raw.lines().count(), 4);
    // Fields with commas stay intact under CSV quoting.
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let rows: Vec<LogEntry> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].prompt, "a, prompt with a comma");
    assert_eq!(rows[2].post_id, 3);
}

#[test]
fn appending_nothing_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    store.append_log(&[]).unwrap();
    assert!(!dir.path().join(LOG_FILE).exists());
}

#[test]
fn archive_bundles_files_and_skips_itself() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    fs::write(dir.path().join("post_1_opt_1_x.png"), b"imgdata").unwrap();
    store.append_log(&[sample_entry(1)]).unwrap();
    store.save_snapshot(&sample_run()).unwrap();

    let archive_path = store.bundle_archive().unwrap();
    assert!(archive_path.exists());

    // Bundling twice must not pull the previous archive into the new one.
    let archive_path = store.bundle_archive().unwrap();
    let archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"post_1_opt_1_x.png"));
    assert!(names.contains(&LOG_FILE));
    assert!(names.contains(&"session.json"));
    assert!(!names.contains(&ARCHIVE_FILE));
}

#[test]
fn archive_of_empty_directory_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let archive_path = store.bundle_archive().unwrap();
    let archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 0);
}
