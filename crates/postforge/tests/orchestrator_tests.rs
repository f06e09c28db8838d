//! Batch loop semantics against scripted models — filesystem only, no network.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use postforge::config::ImageSize;
use postforge::gemini::{ImageBytes, ImageModel, ModelError, RenderSettings};
use postforge::orchestrator::{BatchOrchestrator, BatchPhase, BatchRun};
use postforge::plan::{parse_plan_response, OptionStatus};
use postforge::regen::{self, RegenOutcome};
use postforge::renderer::ImageRenderer;

const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// What the scripted model does on a given call.
#[derive(Clone, Copy)]
enum ScriptedCall {
    /// Return a small PNG payload.
    Image,
    /// Answer without any inline image part.
    NoPayload,
    /// Fail the call outright.
    Fail,
}

/// Scripted image model: plays `script` call by call (last entry repeats),
/// records every prompt, and can trip a stop token after N calls to emulate
/// an operator hitting stop while a render is in flight.
struct ScriptedImageModel {
    calls: AtomicUsize,
    script: Vec<ScriptedCall>,
    prompts: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedImageModel {
    fn new(script: Vec<ScriptedCall>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script,
            prompts: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    fn always(call: ScriptedCall) -> Self {
        Self::new(vec![call])
    }

    fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageModel for ScriptedImageModel {
    async fn generate_image(
        &self,
        prompt: &str,
        _settings: &RenderSettings,
    ) -> Result<Option<ImageBytes>, ModelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }
        let call = self
            .script
            .get(n - 1)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(ScriptedCall::Image);
        match call {
            ScriptedCall::Image => Ok(Some(ImageBytes {
                bytes: PNG_STUB.to_vec(),
                mime_type: Some("image/png".into()),
            })),
            ScriptedCall::NoPayload => Ok(None),
            ScriptedCall::Fail => Err(ModelError::Api {
                status: 500,
                body: "scripted failure".into(),
            }),
        }
    }
}

fn settings() -> RenderSettings {
    RenderSettings {
        aspect_ratio: "1:1".into(),
        image_size: ImageSize::OneK,
    }
}

fn plan_json(posts: usize, options: usize) -> String {
    let posts: Vec<serde_json::Value> = (1..=posts)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "concept": format!("Concept {id}"),
                "description": format!("Post {id} description"),
                "options": (1..=options)
                    .map(|n| format!("prompt for post {id} option {n}"))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({ "posts": posts }).to_string()
}

fn make_run(posts: usize, options: usize) -> BatchRun {
    let plan = parse_plan_response(&plan_json(posts, options)).unwrap();
    BatchRun::from_plan(plan, "3 posts, one about phrasal verbs")
}

#[tokio::test]
async fn attempts_every_option_and_reaches_full_progress() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::always(ScriptedCall::Image);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(2, 3);
    let report = orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 6);
    assert_eq!(report.total, 6);
    assert_eq!(report.generated, 6);
    assert_eq!(report.failed, 0);
    assert!(!report.stopped);
    assert_eq!(model.call_count(), 6);
    assert_eq!(run.phase, BatchPhase::ImagesGenerated);
    assert!((run.progress() - 1.0).abs() < f64::EPSILON);
    assert_eq!(report.entries.len(), 6);

    for post in &run.posts {
        for option in &post.options {
            assert_eq!(option.status, OptionStatus::Generated);
            let path = option.path.as_ref().unwrap();
            let metadata = fs::metadata(path).unwrap();
            assert!(metadata.len() > 0);
        }
    }
}

#[tokio::test]
async fn stop_after_first_option_leaves_the_rest_pending() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let model = ScriptedImageModel::always(ScriptedCall::Image).cancel_after(1, cancel.clone());
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(3, 3);
    let report = orchestrator.run(&mut run, &cancel).await.unwrap();

    assert_eq!(report.attempted, 1);
    assert!(report.stopped);
    assert_eq!(model.call_count(), 1);
    assert_eq!(run.phase, BatchPhase::Stopped);
    assert!(run.progress() < 1.0);

    let settled: usize = run
        .posts
        .iter()
        .flat_map(|p| &p.options)
        .filter(|o| o.is_settled())
        .count();
    let pending: usize = run
        .posts
        .iter()
        .flat_map(|p| &p.options)
        .filter(|o| o.status == OptionStatus::Pending)
        .count();
    assert_eq!(settled, 1);
    assert_eq!(pending, 3 * 3 - 1);
}

#[tokio::test]
async fn payload_less_renders_mark_errors_and_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::always(ScriptedCall::NoPayload);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(1, 3);
    let report = orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.generated, 0);
    assert_eq!(report.failed, 3);
    assert!(report.entries.is_empty());
    assert_eq!(run.phase, BatchPhase::ImagesGenerated);

    for option in &run.posts[0].options {
        assert_eq!(option.status, OptionStatus::Error);
        assert!(option.path.is_none());
        assert!(option.message.contains("no image payload"));
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn sibling_renders_survive_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::new(vec![
        ScriptedCall::Image,
        ScriptedCall::Fail,
        ScriptedCall::Image,
    ]);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(1, 3);
    let report = orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.generated, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.entries.len(), 2);

    let statuses: Vec<_> = run.posts[0].options.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            OptionStatus::Generated,
            OptionStatus::Error,
            OptionStatus::Generated
        ]
    );
    assert!(run.posts[0].options[1].message.contains("HTTP 500"));
}

#[tokio::test]
async fn zero_total_skips_the_render_phase() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::always(ScriptedCall::Image);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(2, 0);
    let report = orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(report.attempted, 0);
    assert!(!report.stopped);
    assert_eq!(model.call_count(), 0);
    assert_eq!(run.phase, BatchPhase::ImagesGenerated);
    assert!((run.progress() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn log_entries_carry_plan_fields() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::always(ScriptedCall::Image);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(1, 2);
    let report = orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    let entry = &report.entries[1];
    assert_eq!(entry.post_id, 1);
    assert_eq!(entry.concept, "Concept 1");
    assert_eq!(entry.option_num, "2");
    assert_eq!(entry.prompt, "prompt for post 1 option 2");
    assert_eq!(entry.brief_snippet, "3 posts, one about phrasal ver");
    assert!(entry.file_path.contains("post_1_opt_2_"));
}

#[tokio::test]
async fn regeneration_appends_correction_and_keeps_prior_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::always(ScriptedCall::Image);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(1, 1);
    orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    let first_path = run.posts[0].options[0].path.clone().unwrap();
    let first_bytes = fs::read(&first_path).unwrap();

    let outcome = regen::regenerate(&renderer, dir.path(), &mut run, 1, 1, "make it blue")
        .await
        .unwrap();
    let RegenOutcome::Replaced { entry } = outcome else {
        panic!("expected a replaced outcome");
    };

    // The renderer saw original + separator + correction.
    let prompts = model.prompts.lock().unwrap();
    assert_eq!(
        prompts.last().map(String::as_str),
        Some("prompt for post 1 option 1\n\nCORRECTIONS: make it blue")
    );
    drop(prompts);

    // Prior file untouched; the record moved to a new _v2 file.
    assert!(first_path.exists());
    assert_eq!(fs::read(&first_path).unwrap(), first_bytes);
    let option = &run.posts[0].options[0];
    assert_ne!(option.path.as_ref().unwrap(), &first_path);
    assert!(option.filename.as_deref().unwrap().contains("_v2_"));
    assert_eq!(entry.option_num, "1_v2");
}

#[tokio::test]
async fn failed_regeneration_keeps_the_generated_state() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedImageModel::new(vec![ScriptedCall::Image, ScriptedCall::NoPayload]);
    let renderer = ImageRenderer::new(&model, settings());
    let orchestrator = BatchOrchestrator::new(&renderer, dir.path());

    let mut run = make_run(1, 1);
    orchestrator
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();
    let before = run.posts[0].options[0].clone();

    let outcome = regen::regenerate(&renderer, dir.path(), &mut run, 1, 1, "fix it")
        .await
        .unwrap();
    assert!(matches!(outcome, RegenOutcome::Failed { .. }));
    assert_eq!(run.posts[0].options[0], before);
    assert!(before.path.unwrap().exists());
}
