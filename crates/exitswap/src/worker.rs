//! Background rotation on a fixed interval.

use std::time::Duration;
use tokio::sync::broadcast;

use crate::state::AppState;
use exitswap_common::RotationPolicy;

/// Rotate every `interval` until shutdown is signalled
pub async fn rotation_worker(
    state: AppState,
    interval: Duration,
    policy: RotationPolicy,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval = ?interval, unique = policy.unique, "Auto-rotation started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match state.rotate(policy).await {
                    Ok((address, snapshot)) => {
                        tracing::info!(
                            address = %address,
                            rotations = snapshot.rotations,
                            "Scheduled rotation complete"
                        );
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(
                            error = %e,
                            "Scheduled rotation failed, will retry next tick"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Scheduled rotation failed");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Auto-rotation shutting down");
                break;
            }
        }
    }
}
