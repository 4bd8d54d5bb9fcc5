use std::sync::Arc;
use std::time::{Duration, Instant};

use fira_models::{AgentsConfig, RunResult};
use fira_store::OutputStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::Adapters;
use crate::credentials::Credentials;
use crate::error::AgentError;
use crate::parser::{extract_json, file_field};
use crate::roles::{CapabilityBundle, SessionKind};
use crate::runtime::AgentRuntime;
use crate::session::{ExternalSession, SessionScope};
use crate::stitch::StitchingWorkflow;
use crate::toolbox::{RoleToolbox, ToolContext};

/// Runs one research question through the coordinator and its team.
pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    config: AgentsConfig,
    adapters: Adapters,
    sessions: Vec<Arc<dyn ExternalSession>>,
    credentials: Credentials,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        config: AgentsConfig,
        adapters: Adapters,
        sessions: Vec<Arc<dyn ExternalSession>>,
        credentials: Credentials,
    ) -> Self {
        Self {
            runtime,
            config,
            adapters,
            sessions,
            credentials,
        }
    }

    pub fn config(&self) -> &AgentsConfig {
        &self.config
    }

    pub fn store(&self) -> &OutputStore {
        &self.adapters.store
    }

    pub async fn run(
        &self,
        question: &str,
        max_turns: u32,
        deadline: Duration,
    ) -> Result<RunResult, AgentError> {
        self.run_with_cancel(question, max_turns, deadline, CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`], also stopping when `cancel` fires. Every
    /// session opened by the run is closed before this returns, whatever the
    /// outcome.
    pub async fn run_with_cancel(
        &self,
        question: &str,
        max_turns: u32,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<RunResult, AgentError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, max_turns, deadline_secs = deadline.as_secs(), "Starting research run");

        // 1. Credentials, before anything is spawned
        self.credentials.require(&self.config.required_credentials)?;

        // 2. Roles
        let available: Vec<SessionKind> = self.sessions.iter().map(|s| s.kind()).collect();
        let bundle = Arc::new(CapabilityBundle::build(&self.config, &available));

        let scope = Arc::new(SessionScope::new());
        let base = ToolContext {
            runtime: Arc::clone(&self.runtime),
            bundle: Arc::clone(&bundle),
            adapters: self.adapters.clone(),
            sessions: Arc::clone(&scope),
            stitcher: None,
            specialist_max_turns: self.config.specialist_max_turns,
        };
        let stitcher = StitchingWorkflow::spawn(base.clone(), self.stitch_turns(max_turns));
        let ctx = ToolContext {
            stitcher: Some(stitcher.handle()),
            ..base
        };

        // 3 + 4. Sessions, then the coordinator, under the deadline
        let work = async {
            self.open_sessions(&scope, &bundle).await?;
            let coordinator = Arc::clone(&bundle.coordinator);
            let toolbox = RoleToolbox::new(Arc::clone(&coordinator), ctx);
            self.runtime
                .run(&coordinator, &toolbox, question, max_turns)
                .await
                .map_err(delegation_error)
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(deadline, work) => match result {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(deadline.as_secs())),
            },
        };

        // 5. Release, on every path
        stitcher.shutdown().await;
        let closed = scope.close_all().await;
        debug!(%run_id, closed, "Sessions released");

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                warn!(%run_id, error = %e, "Research run failed");
                return Err(e);
            }
        };

        // 6. Best-effort extraction
        let payload = extract_json(&output);
        let report_path = payload
            .as_ref()
            .and_then(file_field)
            .and_then(|file| match self.adapters.store.resolve(file) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(%run_id, file, error = %e, "Could not resolve report file");
                    None
                }
            });

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %run_id,
            elapsed_ms,
            report = ?report_path,
            "Research run complete"
        );

        Ok(RunResult {
            run_id,
            output,
            payload,
            report_path,
            elapsed_ms,
        })
    }

    /// The editor's cap, never above the coordinator's.
    fn stitch_turns(&self, max_turns: u32) -> u32 {
        let configured = self.config.stitch_max_turns;
        if configured > max_turns {
            warn!(
                stitch_max_turns = configured,
                max_turns, "Stitch turn cap exceeds coordinator cap, clamping"
            );
            return max_turns;
        }
        configured
    }

    /// Open every session the bundle references. A connect failure leaves
    /// the already-open sessions registered in `scope` for release.
    async fn open_sessions(
        &self,
        scope: &SessionScope,
        bundle: &CapabilityBundle,
    ) -> Result<(), AgentError> {
        for kind in bundle.session_kinds() {
            let Some(session) = self.sessions.iter().find(|s| s.kind() == kind) else {
                continue;
            };
            scope
                .open(Arc::clone(session))
                .await
                .map_err(|e| match e {
                    AgentError::Session(_) => e,
                    other => AgentError::Session(other.to_string()),
                })?;
            info!(session = ?kind, "Session opened");
        }
        Ok(())
    }
}

/// Coordinator failures surface as `Delegation`, except the ones the caller
/// must tell apart.
fn delegation_error(e: AgentError) -> AgentError {
    match e {
        AgentError::Timeout(_)
        | AgentError::Cancelled
        | AgentError::Configuration(_)
        | AgentError::Delegation(_) => e,
        other => AgentError::Delegation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_failures_become_delegation() {
        assert!(matches!(
            delegation_error(AgentError::MaxTurns(40)),
            AgentError::Delegation(_)
        ));
        assert!(matches!(
            delegation_error(AgentError::Transient("503".to_string())),
            AgentError::Delegation(_)
        ));
        assert!(matches!(
            delegation_error(AgentError::Timeout(5)),
            AgentError::Timeout(5)
        ));
        assert!(matches!(
            delegation_error(AgentError::Cancelled),
            AgentError::Cancelled
        ));
    }
}
