// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Injectable waiting for the polling and retry loops

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};

#[async_trait]
pub trait Delay: Send + Sync + fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Real time, via `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wait for `duration`, or fail with [`PipelineError::Cancelled`] if `cancel`
/// fires first
pub async fn pause(
    delay: &dyn Delay,
    duration: Duration,
    cancel: &CancellationToken,
    during: &str,
) -> Result<()> {
    ensure_active(cancel, during)?;
    tokio::select! {
        _ = cancel.cancelled() => Err(cancelled(during)),
        _ = delay.sleep(duration) => Ok(()),
    }
}

/// Fail if `cancel` has already fired
pub fn ensure_active(cancel: &CancellationToken, during: &str) -> Result<()> {
    if cancel.is_cancelled() {
        Err(cancelled(during))
    } else {
        Ok(())
    }
}

fn cancelled(during: &str) -> PipelineError {
    PipelineError::Cancelled {
        during: during.to_string(),
    }
}
