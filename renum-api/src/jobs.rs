//! Background Jobs
//!
//! Periodic cooperative sweeps that stay out of the request path:
//! - pattern mining over interaction logs
//! - memory consolidation into knowledge snapshots
//!
//! Cadence: the sweep interval is configurable; consolidation itself only
//! fires for agents with at least `SNAPSHOT_MIN_CHUNKS` new memory chunks
//! in the trailing 24 h window, and is idempotent per window.

use crate::state::AppState;
use chrono::{DurationRound, TimeDelta, Utc};
use renum_core::{SNAPSHOT_MIN_CHUNKS, SNAPSHOT_WINDOW};
use renum_memory::MemoryStore;
use std::time::Duration;
use tracing::{debug, warn};

/// Default interval between background sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawn the background sweep loop.
pub fn spawn_background_jobs(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval_secs = std::env::var("RENUM_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(SWEEP_INTERVAL);
        let mut ticker = tokio::time::interval(interval_secs);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = run_sweep(&state).await {
                warn!(error = %e, "Background sweep failed");
            }
        }
    })
}

/// One pass over all active agents.
async fn run_sweep(state: &AppState) -> crate::error::ApiResult<()> {
    let agent_ids = state.db.all_agent_ids().await?;
    debug!(agents = agent_ids.len(), "Background sweep starting");

    // The snapshot window is aligned to day boundaries so repeated sweeps
    // inside one day target the same (idempotent) window.
    let window_start = Utc::now()
        .duration_trunc(TimeDelta::days(1))
        .unwrap_or_else(|_| Utc::now());
    let window_end = window_start + TimeDelta::from_std(SNAPSHOT_WINDOW).unwrap_or_default();

    for agent_id in agent_ids {
        if let Err(e) = state.orchestrator_miner_sweep(agent_id).await {
            warn!(agent_id = %agent_id, error = %e, "Pattern sweep failed");
        }

        match state.memory.chunks_in_window(agent_id, window_start, window_end).await {
            Ok(count) if count >= SNAPSHOT_MIN_CHUNKS => {
                match state.memory.consolidate(agent_id, window_start, window_end).await {
                    Ok(Some(snapshot_id)) => {
                        debug!(agent_id = %agent_id, snapshot_id = %snapshot_id, "Snapshot taken");
                    }
                    Ok(None) => {}
                    Err(e) => warn!(agent_id = %agent_id, error = %e, "Consolidation failed"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(agent_id = %agent_id, error = %e, "Chunk count failed"),
        }
    }
    Ok(())
}

impl AppState {
    async fn orchestrator_miner_sweep(
        &self,
        agent_id: renum_core::AgentId,
    ) -> crate::error::ApiResult<usize> {
        // The gateway is the learning store in production.
        let mined = self.miner.sweep(&self.db, agent_id).await?;
        Ok(mined)
    }
}
