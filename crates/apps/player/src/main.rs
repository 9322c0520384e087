mod config;
mod probe;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use oldtom_audio::{AudioEngine, OptimizationUpdate, SyntheticImpulse};
use oldtom_narration::{
    MemoryAudioStore, NarrationSession, NarrativeContent, OfflineSynthesizer, Synchronizer,
    TimelineEvent, ToneTrackSource,
};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::PlayerConfig;
use crate::probe::HeadlessProbe;

const BUNDLED_CHAPTER: &str = include_str!("../content/chapter1.json");

#[derive(Parser, Debug)]
#[command(name = "oldtom-player")]
#[command(about = "Headless player for Old Tom narrated chapters", long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/oldtom/player.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Content file, JSON or TOML (overrides the config)
    #[arg(long)]
    content: Option<PathBuf>,

    /// Start at this segment id instead of the first
    #[arg(long)]
    segment: Option<String>,

    /// Simulated frame rate (overrides the config)
    #[arg(long)]
    fps: Option<f32>,

    /// Report this battery level at startup (0.0 to 1.0)
    #[arg(long)]
    battery: Option<f32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "oldtom_player={0},oldtom_narration={0},oldtom_audio={0}",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Old Tom Player v{}", env!("CARGO_PKG_VERSION"));

    let mut config = PlayerConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(fps) = args.fps {
        anyhow::ensure!(fps > 0.0, "--fps must be positive");
        config.fps = fps;
    }
    if let Some(level) = args.battery {
        config.device.battery = Some(level);
    }
    if let Some(content) = args.content {
        config.content = Some(content);
    }

    let content = Arc::new(load_content(config.content.as_deref())?);
    tracing::info!("Loaded '{}' ({} segments)", content.title, content.len());

    let mut engine = AudioEngine::new(config.audio.clone());
    engine
        .init(&HeadlessProbe::new(config.device.clone()))
        .context("Failed to initialize audio engine")?;
    engine
        .load_reverb(&SyntheticImpulse::default())
        .await
        .context("Failed to load reverb")?;
    let mut optimizations = engine.governor()?.subscribe();

    let synthesizer = OfflineSynthesizer {
        words_per_minute: config.timeline.words_per_minute,
        ..OfflineSynthesizer::default()
    };
    let synchronizer = Synchronizer::new(
        config.timeline.clone(),
        content.clone(),
        Arc::new(synthesizer),
        Arc::new(MemoryAudioStore::new()),
        Arc::new(ToneTrackSource::default()),
    );
    let mut events = synchronizer.subscribe();
    let mut session = NarrationSession::new(synchronizer);

    match &args.segment {
        Some(id) => session
            .jump_to(&mut engine, id)
            .await
            .with_context(|| format!("Failed to start segment {id}"))?,
        None => session
            .start(&mut engine)
            .await
            .context("Failed to start session")?,
    }

    let dt = config.frame_time();
    let every = u64::from(config.time_update_every.max(1));
    let mut frame: u64 = 0;

    loop {
        engine.tick(dt)?;
        session.tick(&mut engine, dt)?;
        let now = engine.now();

        for event in events.drain() {
            if matches!(event, TimelineEvent::TimeUpdate { .. }) && frame % every != 0 {
                continue;
            }
            emit(now, serde_json::to_value(&event)?);
        }
        for update in optimizations.drain() {
            emit(now, optimization_json(&update)?);
        }

        if session.segment_complete() && !session.advance(&mut engine).await? {
            break;
        }

        frame += 1;
        if now >= config.max_seconds {
            tracing::warn!("Stopping after {:.1}s of simulated time", now);
            break;
        }
    }

    tracing::info!(
        "Played {} frames ({:.1}s simulated)",
        frame,
        engine.now()
    );
    engine.dispose();
    Ok(())
}

fn load_content(path: Option<&Path>) -> Result<NarrativeContent> {
    let Some(path) = path else {
        return NarrativeContent::from_json(BUNDLED_CHAPTER).context("Bundled chapter is invalid");
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read content {}", path.display()))?;
    let content = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => NarrativeContent::from_toml(&text),
        _ => NarrativeContent::from_json(&text),
    };
    content.with_context(|| format!("Invalid content {}", path.display()))
}

fn optimization_json(update: &OptimizationUpdate) -> Result<Value> {
    let mut value = serde_json::to_value(update)?;
    if let Value::Object(map) = &mut value {
        map.insert("type".into(), json!("optimization-update"));
    }
    Ok(value)
}

/// Print one event per line on stdout
fn emit(now: f64, mut value: Value) {
    if let Value::Object(map) = &mut value {
        map.insert("engine_time".into(), json!(now));
    }
    println!("{value}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_chapter_loads() {
        let content = load_content(None).unwrap();
        assert!(content.len() >= 3);
    }

    #[test]
    fn optimization_updates_are_tagged() {
        let update = OptimizationUpdate {
            profile: oldtom_audio::OptimizationProfile::Balanced,
            settings: oldtom_audio::OptimizationProfile::Balanced.settings(),
            reasons: Vec::new(),
        };
        let value = optimization_json(&update).unwrap();
        assert_eq!(value["type"], "optimization-update");
    }
}
