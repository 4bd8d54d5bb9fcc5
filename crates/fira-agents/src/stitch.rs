use std::sync::Arc;

use fira_models::{StitchReply, StitchRequest};
use fira_store::ArtifactManifest;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::parser::report_file;
use crate::toolbox::{RoleToolbox, ToolContext};

struct StitchJob {
    request: StitchRequest,
    reply: oneshot::Sender<Result<StitchReply, AgentError>>,
}

/// Sending side of the report-stitching task, held by the coordinator's
/// toolbox.
#[derive(Clone)]
pub struct StitchHandle {
    tx: mpsc::Sender<StitchJob>,
}

impl StitchHandle {
    pub async fn stitch(&self, request: StitchRequest) -> Result<StitchReply, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StitchJob { request, reply })
            .await
            .map_err(|_| AgentError::Delegation("report editor is not running".to_string()))?;
        rx.await.map_err(|_| {
            AgentError::Delegation("report editor stopped before replying".to_string())
        })?
    }
}

/// The report editor running as its own task. Jobs are handled one at a
/// time, each with the editor's turn cap.
pub struct StitchingWorkflow {
    handle: StitchHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StitchingWorkflow {
    pub fn spawn(ctx: ToolContext, max_turns: u32) -> Self {
        let (tx, mut rx) = mpsc::channel::<StitchJob>(4);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = token.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                let result = tokio::select! {
                    _ = token.cancelled() => Err(AgentError::Cancelled),
                    result = run_job(&ctx, &job.request, max_turns) => result,
                };
                if job.reply.send(result).is_err() {
                    debug!("Stitch requester went away before the reply");
                }
            }
            debug!("Stitching workflow stopped");
        });

        Self {
            handle: StitchHandle { tx },
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> StitchHandle {
        self.handle.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Stitching task panicked");
        }
    }
}

async fn run_job(
    ctx: &ToolContext,
    request: &StitchRequest,
    max_turns: u32,
) -> Result<StitchReply, AgentError> {
    let manifest = ArtifactManifest::from_names(&ctx.adapters.store, &request.files)?;
    if !manifest.missing().is_empty() {
        warn!(missing = ?manifest.missing(), "Report references files that do not exist");
    }

    let mut input = serde_json::to_value(request)?;
    input["manifest"] = serde_json::to_value(manifest.entries().collect::<Vec<_>>())?;
    let input = serde_json::to_string_pretty(&input)?;

    let editor = Arc::clone(&ctx.bundle.editor);
    let toolbox = RoleToolbox::new(Arc::clone(&editor), ctx.clone());
    info!(files = manifest.len(), "Stitching report");
    let output = ctx.runtime.run(&editor, &toolbox, &input, max_turns).await?;

    Ok(StitchReply {
        file: report_file(&output),
        output,
    })
}
