//! Gas limits from read-only simulation, with a configured ceiling when simulation fails.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::EstimationError,
    runtime::{GasInfo, GasQuery, Runtime},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasSource {
    Estimated,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasDecision {
    pub limit: u64,
    pub source: GasSource,
}

pub struct GasEstimator {
    runtime: Arc<dyn Runtime>,
}

impl GasEstimator {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self { runtime }
    }

    pub async fn estimate(&self, query: &GasQuery) -> Result<GasInfo, EstimationError> {
        let info = self.runtime.calculate_gas(query).await?;
        debug!(min_limit = info.min_limit, burned = info.burned, "gas simulated");
        Ok(info)
    }

    /// The simulated minimum limit, or `ceiling` if simulation fails for any reason.
    pub async fn estimate_or_fallback(&self, query: &GasQuery, ceiling: u64) -> GasDecision {
        match self.estimate(query).await {
            Ok(info) => GasDecision {
                limit: info.min_limit,
                source: GasSource::Estimated,
            },
            Err(err) => {
                warn!(
                    error = %err,
                    gas_limit = ceiling,
                    "gas estimation failed; using fallback ceiling"
                );
                GasDecision {
                    limit: ceiling,
                    source: GasSource::Fallback,
                }
            }
        }
    }

    /// Simulated minimum limit raised by `bump_percent`. No fallback.
    pub async fn estimate_with_margin(
        &self,
        query: &GasQuery,
        bump_percent: u64,
    ) -> Result<u64, EstimationError> {
        let info = self.estimate(query).await?;
        Ok(apply_margin(info.min_limit, bump_percent))
    }
}

/// `limit * (100 + bump_percent) / 100`, saturating at `u64::MAX`.
pub fn apply_margin(limit: u64, bump_percent: u64) -> u64 {
    let bumped = u128::from(limit) * (100 + u128::from(bump_percent)) / 100;
    u64::try_from(bumped).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Bytes;
    use growstreams_types::{ActorId, Payload};

    use super::*;
    use crate::runtime::{dev::GasBehaviour, DevRuntime, GasDestination};

    fn upload_query() -> GasQuery {
        GasQuery {
            source: ActorId::ZERO,
            destination: GasDestination::Upload {
                code: Bytes::from_static(b"\0asm"),
            },
            payload: Payload::Opaque(Bytes::new()),
            value: 0,
            keep_result: true,
        }
    }

    #[test]
    fn margin_is_proportional_and_saturates() {
        assert_eq!(apply_margin(1_000, 20), 1_200);
        assert_eq!(apply_margin(1_000, 0), 1_000);
        assert_eq!(apply_margin(u64::MAX, 20), u64::MAX);
    }

    #[tokio::test]
    async fn uses_simulated_limit() {
        let runtime = Arc::new(DevRuntime::new());
        let estimator = GasEstimator::new(runtime);
        let decision = estimator.estimate_or_fallback(&upload_query(), 42).await;
        assert_eq!(decision.source, GasSource::Estimated);
        assert_ne!(decision.limit, 42);
    }

    #[tokio::test]
    async fn falls_back_to_ceiling_on_failure() {
        let runtime = Arc::new(DevRuntime::new());
        runtime.set_gas_behaviour(GasBehaviour::Fail);
        let estimator = GasEstimator::new(runtime);

        let decision = estimator
            .estimate_or_fallback(&upload_query(), 500_000_000_000)
            .await;
        assert_eq!(
            decision,
            GasDecision {
                limit: 500_000_000_000,
                source: GasSource::Fallback,
            }
        );
        assert!(estimator.estimate_with_margin(&upload_query(), 20).await.is_err());
    }
}
