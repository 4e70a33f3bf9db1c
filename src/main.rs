use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use scene_video::api::{ImageSynthesizer, QwenClient, ScriptModel};
use scene_video::scene::{JobRequest, Phase, VideoArtifact};
use scene_video::store::{JsonSceneStore, SceneStore};
use scene_video::trigger::{until_interrupted, Debouncer};
use scene_video::video::{Assembler, BackendState, FfmpegBackend, RenderBackend};
use scene_video::{Orchestrator, PipelineConfig};
use tracing::{error, info, warn};

const WATCH_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "scene-video")]
#[command(about = "Turn a script into a crossfaded slideshow video using AI", long_about = None)]
struct Args {
    /// Script text
    #[arg(short, long)]
    text: Option<String>,

    /// Script file path
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Total video length, minutes part
    #[arg(short, long, default_value_t = 0)]
    minutes: u32,

    /// Total video length, seconds part (0-59)
    #[arg(short, long, default_value_t = 30)]
    seconds: u32,

    /// Output video file path
    #[arg(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// Working directory for staged images and scene records
    #[arg(short = 'w', long, default_value = "./output")]
    work_dir: PathBuf,

    /// Crossfade length between scenes, in seconds
    #[arg(long, default_value_t = 1.0)]
    crossfade: f64,

    /// Re-render whenever the script file changes
    #[arg(long, requires = "file")]
    watch: bool,

    /// Quiet period before a changed script is re-rendered
    #[arg(long, default_value_t = 2000)]
    debounce_ms: u64,

    /// DashScope API key
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();

    let api_key = match args.api_key.clone() {
        Some(key) => key,
        None => std::env::var("DASHSCOPE_API_KEY").context(
            "DASHSCOPE_API_KEY not found; set it via --api-key or the DASHSCOPE_API_KEY environment variable",
        )?,
    };

    if args.text.is_none() && args.file.is_none() {
        bail!("either --text or --file must be provided");
    }

    let config = PipelineConfig::default()
        .with_work_dir(&args.work_dir)
        .with_crossfade(args.crossfade)
        .with_debounce(Duration::from_millis(args.debounce_ms));

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .context("Failed to create work directory")?;

    let backend = FfmpegBackend::new(config.work_dir.join("render"));
    if let BackendState::Unavailable(reason) = backend.init().await {
        bail!("render backend unavailable: {}", reason);
    }

    let client = QwenClient::new(api_key, &config)?;
    let store = JsonSceneStore::open(config.work_dir.join("scenes.json")).await?;
    let orchestrator = Orchestrator::new(
        &client,
        &client,
        &backend,
        &store,
        Assembler::new(config.crossfade_secs),
    );

    if args.watch {
        return watch_script(&args, &config, &orchestrator, &backend).await;
    }

    let script = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?,
        (None, None) => unreachable!("checked above"),
    };

    let request = JobRequest::from_parts(script, args.minutes, args.seconds)?;
    info!("Input text length: {} characters", request.script().len());

    if let Err(e) = run_and_export(&orchestrator, request, &args.output).await {
        error!("Video generation failed: {}", e);
        std::process::exit(1);
    }

    info!("Video generation completed successfully!");
    Ok(())
}

/// Re-renders the script file each time it settles after an edit.
async fn watch_script<M, S, B, D>(
    args: &Args,
    config: &PipelineConfig,
    orchestrator: &Orchestrator<'_, M, S, B, D>,
    backend: &B,
) -> anyhow::Result<()>
where
    M: ScriptModel,
    S: ImageSynthesizer,
    B: RenderBackend,
    D: SceneStore,
{
    let Some(path) = args.file.as_deref() else {
        bail!("--watch requires --file");
    };
    info!(
        "Watching {} (quiet period {:?}); press Ctrl-C to stop",
        path.display(),
        config.debounce
    );

    let mut debouncer = Debouncer::new(config.debounce);
    let mut ticker = tokio::time::interval(WATCH_POLL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match tokio::fs::read_to_string(path).await {
            Ok(text) => debouncer.observe(text, Instant::now()),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        }

        let gate_open = !orchestrator.is_active() && backend.is_ready();
        let Some(script) = debouncer.poll(Instant::now(), gate_open) else {
            continue;
        };

        let request = match JobRequest::from_parts(script, args.minutes, args.seconds) {
            Ok(request) => request,
            Err(e) => {
                warn!("Not rendering: {}", e);
                continue;
            }
        };

        let run = run_and_export(orchestrator, request, &args.output);
        match until_interrupted(run, tokio::signal::ctrl_c()).await {
            None => {
                info!("Stopping watch; the render in progress was abandoned");
                return Ok(());
            }
            Some(Err(e)) => error!("Video generation failed: {}", e),
            Some(Ok(_)) => {}
        }
    }
}

/// Runs one job while logging snapshot changes, then copies the artifact to `output`.
async fn run_and_export<M, S, B, D>(
    orchestrator: &Orchestrator<'_, M, S, B, D>,
    request: JobRequest,
    output: &Path,
) -> anyhow::Result<VideoArtifact>
where
    M: ScriptModel,
    S: ImageSynthesizer,
    B: RenderBackend,
    D: SceneStore,
{
    let mut updates = orchestrator.subscribe();
    let run = orchestrator.submit_run(request);
    tokio::pin!(run);

    let mut last = (Phase::Idle, 0usize, 0u8);
    let artifact = loop {
        tokio::select! {
            result = &mut run => break result?,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut run).await?;
                }
                let snap = updates.borrow_and_update().clone();
                let now = (snap.phase, snap.progress.current, snap.render_progress);
                if now == last {
                    continue;
                }
                match snap.phase {
                    Phase::Analyzing => info!("Analyzing script..."),
                    Phase::AcquiringImages => info!(
                        "Generating images {}/{}",
                        snap.progress.current, snap.progress.total
                    ),
                    Phase::Assembling => info!("Rendering video {}%", snap.render_progress),
                    _ => {}
                }
                last = now;
            }
        }
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(&artifact.path, output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Video saved to: {}", output.display());
    Ok(artifact)
}
