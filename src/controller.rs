//! Controller - runs one retention invocation end to end

use crate::config::{Config, TableRef};
use crate::cooldown::CooldownTracker;
use crate::error::{Result, StoreError};
use crate::models::Outcome;
use crate::policy::{count_rows, delete_oldest, RetentionPolicy};
use crate::probe::CapacityProbe;
use crate::sink::StateSink;
use crate::store::Connector;
use crate::supervisor::ConnectionSupervisor;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// One invocation: cooldown, connect, probe, decide, delete, record.
///
/// The store handle lives only for the duration of [`Controller::run_once`].
/// The cooldown is optional; without it every invocation probes.
pub struct Controller<C, S> {
    supervisor: ConnectionSupervisor<C>,
    probe: CapacityProbe,
    policy: RetentionPolicy,
    table: TableRef,
    cooldown: Option<CooldownTracker<S>>,
}

impl<C, S> Controller<C, S>
where
    C: Connector,
    S: StateSink,
{
    pub fn new(
        supervisor: ConnectionSupervisor<C>,
        probe: CapacityProbe,
        policy: RetentionPolicy,
        table: TableRef,
        cooldown: Option<CooldownTracker<S>>,
    ) -> Self {
        Self {
            supervisor,
            probe,
            policy,
            table,
            cooldown,
        }
    }

    /// Wire a controller from configuration. A zero `skip_rounds` disables the cooldown.
    pub fn from_config(connector: C, sink: S, config: &Config) -> Self {
        let cooldown = (config.skip_rounds > 0).then(|| CooldownTracker::new(sink, config.skip_rounds));
        Self::new(
            ConnectionSupervisor::new(connector, config.retry_interval, config.connect_timeout),
            CapacityProbe::from_config(config.probe, &config.table),
            RetentionPolicy::new(config.threshold, config.delete_percentage),
            config.table.clone(),
            cooldown,
        )
    }

    /// Run a single invocation.
    ///
    /// Only a connection timeout is an error; store failures after connecting
    /// end the round as [`Outcome::NoOp`] or [`Outcome::DeleteFailed`].
    pub async fn run_once(&self) -> Result<Outcome> {
        let span = info_span!("invocation", run_id = %Uuid::new_v4(), table = %self.table.qualified());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<Outcome> {
        if let Some(cooldown) = &self.cooldown {
            if let Some(state) = cooldown.should_skip().await {
                return Ok(Outcome::Skipped {
                    rounds_remaining: state.rounds_remaining,
                });
            }
        }

        let store = self.supervisor.acquire().await?;
        let outcome = self.check_capacity(&store).await;

        if let Some(cooldown) = &self.cooldown {
            cooldown.record_outcome(outcome.deleted()).await;
        }

        info!(outcome = ?outcome, "Invocation finished");
        Ok(outcome)
    }

    async fn check_capacity(&self, store: &C::Store) -> Outcome {
        let usage = match self.probe.sample(store).await {
            Ok(usage) => usage,
            Err(e) => return no_op("capacity probe failed", e),
        };
        let ratio = usage.ratio();

        let decision = match self
            .policy
            .decide(&usage, || count_rows(store, &self.table))
            .await
        {
            Ok(decision) => decision,
            Err(e) => return no_op("row count failed", e),
        };

        if !decision.should_delete {
            return Outcome::BelowThreshold { ratio };
        }
        if decision.rows_to_delete == 0 {
            info!(ratio, "Over threshold but no rows to delete");
            return Outcome::NothingToDelete { ratio };
        }

        match delete_oldest(store, &self.table, decision.rows_to_delete).await {
            Ok(reported) => {
                info!(
                    rows_deleted = decision.rows_to_delete,
                    reported_by_store = reported,
                    "Deleted oldest rows"
                );
                Outcome::Deleted {
                    ratio,
                    rows_deleted: decision.rows_to_delete,
                }
            }
            Err(e) => {
                log_store_error("delete failed", &e);
                Outcome::DeleteFailed {
                    ratio,
                    rows_to_delete: decision.rows_to_delete,
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn no_op(stage: &str, err: StoreError) -> Outcome {
    log_store_error(stage, &err);
    Outcome::NoOp {
        reason: format!("{}: {}", stage, err),
    }
}

fn log_store_error(stage: &str, err: &StoreError) {
    match err {
        StoreError::Server { code, message, trace } => error!(
            code = %code,
            message = %message,
            trace = trace.as_deref().unwrap_or(""),
            "{}", stage
        ),
        other => error!(error = %other, "{}", stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_keeps_stage_and_error() {
        let outcome = no_op("row count failed", StoreError::Transport("broken pipe".to_string()));
        assert_eq!(
            outcome,
            Outcome::NoOp {
                reason: "row count failed: Transport error: broken pipe".to_string()
            }
        );
    }
}
