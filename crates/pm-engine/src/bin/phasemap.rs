use anyhow::Context;
use pm_engine::{EngineConfig, PhaseDiagramEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("PHASEMAP_CONFIG").unwrap_or_else(|_| "phasemap.json".to_string());
    let config = EngineConfig::from_file(&config_path)
        .with_context(|| format!("loading {config_path}"))?;

    let engine = PhaseDiagramEngine::from_config(config)?;
    let diagram = engine.run()?;

    let present = diagram.minima.iter().filter(|m| m.is_some()).count();
    info!(
        "Phase diagram '{}': {} of {} points solved{}",
        engine.config().name,
        present,
        diagram.minima.len(),
        if diagram.resumed() { " (resumed)" } else { "" }
    );
    if let Some(status) = &diagram.sweep {
        if let Some(seconds) = status.duration_seconds() {
            info!("Sweep {} took {}s", status.id, seconds);
        }
    }

    Ok(())
}
