use crate::cli::actions::Action;
use crate::defense::{AlarmSink, DefenseConfig, FileSink, TracingSink};
use crate::vigil::{new, users::StaticUsers, SharedVerifier};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        defenses,
        config,
        users,
        alarm_log,
    } = action;

    let cfg = match config {
        Some(path) => DefenseConfig::from_file(&path)?,
        None => DefenseConfig::default(),
    };

    let verifier: SharedVerifier = match users {
        Some(path) => Arc::new(StaticUsers::from_file(&path)?),
        None => {
            info!("No users file given, using built-in demo users");
            Arc::new(StaticUsers::demo())
        }
    };

    let mut sinks: Vec<Arc<dyn AlarmSink>> = vec![Arc::new(TracingSink)];
    if let Some(path) = alarm_log {
        let sink = FileSink::open(&path)
            .with_context(|| format!("Failed to open alarm log {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }

    new(port, defenses, cfg, verifier, sinks).await?;

    Ok(())
}
