use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::{AdmissionController, Decision, SweepReport};
use super::identity::CallerIdentity;
use super::partition::{PartitionKey, PartitionKeyResolver};
use super::registry::PolicyRegistry;
use crate::config::AdmissionSettings;
use crate::error::AdmissionError;
use crate::telemetry::Metrics;

struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owned admission service: policies, partitioning and quota state.
///
/// Built once at startup and shared behind an `Arc`. Call
/// [`start_sweeper`](Self::start_sweeper) to run background maintenance and
/// [`shutdown`](Self::shutdown) on teardown.
pub struct AdmissionManager {
    registry: Arc<PolicyRegistry>,
    resolver: PartitionKeyResolver,
    controller: AdmissionController,
    metrics: Option<Arc<Metrics>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl AdmissionManager {
    pub fn new(registry: PolicyRegistry, settings: &AdmissionSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            resolver: PartitionKeyResolver::new(),
            controller: AdmissionController::new(settings.idle_windows),
            metrics: None,
            sweeper: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    /// Decide whether a caller may proceed under `policy_name`.
    ///
    /// Errors fail closed: the caller must be refused.
    pub fn evaluate(
        &self,
        policy_name: &str,
        identity: &CallerIdentity,
        now: Instant,
    ) -> Result<Decision, AdmissionError> {
        let (policy, role) = match self.registry.resolve_with_role(policy_name, identity) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(policy = policy_name, error = %err, "admission refused");
                if let Some(m) = &self.metrics {
                    m.record_admission_error(policy_name, err.as_str());
                }
                return Err(err);
            }
        };
        // Role-based quotas are counted under the role that selected them.
        let key = match role {
            Some(role) => PartitionKey::from_role(role),
            None => self.resolver.resolve_key(identity),
        };
        let decision = self.controller.try_acquire(&policy, &key, now);
        self.observe(policy.name(), &key, &decision);
        Ok(decision)
    }

    /// Check a fixed policy for an already resolved partition.
    pub fn try_acquire(
        &self,
        policy_name: &str,
        key: &PartitionKey,
        now: Instant,
    ) -> Result<Decision, AdmissionError> {
        let policy = self.registry.resolve(policy_name)?;
        let decision = self.controller.try_acquire(&policy, key, now);
        self.observe(policy.name(), key, &decision);
        Ok(decision)
    }

    fn observe(&self, policy: &str, key: &PartitionKey, decision: &Decision) {
        if let Decision::Rejected { retry_after } = decision {
            debug!(
                policy,
                partition = %key,
                retry_after_ms = retry_after.as_millis() as u64,
                "admission rejected"
            );
        }
        if let Some(m) = &self.metrics {
            m.record_admission_decision(policy, decision.as_str());
        }
    }

    /// Run one maintenance pass.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let report = self.controller.sweep(now);
        if report.evicted > 0 {
            debug!(evicted = report.evicted, retained = report.retained, "evicted idle partitions");
            if let Some(m) = &self.metrics {
                m.record_partitions_evicted(report.evicted as u64);
            }
        }
        report
    }

    /// Spawn the periodic sweep. Calling it twice keeps the first sweeper.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.sweep(Instant::now());
                    }
                }
            }
        });
        info!(interval_ms = interval.as_millis() as u64, "admission sweeper started");
        *slot = Some(Sweeper { token, handle });
    }

    /// Stop the sweeper and reject every queued caller.
    pub async fn shutdown(&self) -> usize {
        let sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sweeper) = sweeper {
            sweeper.token.cancel();
            if let Err(e) = sweeper.handle.await {
                warn!(error = %e, "admission sweeper did not stop cleanly");
            }
        }
        let rejected = self.controller.shutdown(Instant::now());
        info!(rejected, "admission manager shut down");
        rejected
    }
}
