use std::path::{Path, PathBuf};

use tracing::Level;

use super::WorkflowContext;
use crate::error::{Result, TfsaError};
use crate::sandbox::LiveStatus;
use crate::status::{DestroyStatus, ExecutionStatus};
use crate::store::StoreError;
use crate::tags;
use crate::terraform::{ExecLog, TerraformCommand, Variable, parse_outputs, sanitize};

/// Which status slot a shared step reports its failure into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Execute,
    Destroy,
}

/// Runs the individual terraform steps against one working directory.
///
/// Each step records a status transition and an "Error" live status on
/// failure, then hands the original error back to the caller.
pub struct TerraformExecutor<'a> {
    ctx: &'a WorkflowContext,
    working_dir: PathBuf,
    exec_log: ExecLog,
}

impl<'a> TerraformExecutor<'a> {
    pub fn new(ctx: &'a WorkflowContext, working_dir: PathBuf, exec_log: ExecLog) -> Self {
        Self {
            ctx,
            working_dir,
            exec_log,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn exec_log(&self) -> &ExecLog {
        &self.exec_log
    }

    pub async fn init(&self, phase: Phase) -> Result<()> {
        tracing::info!("performing terraform init");
        self.message("running Terraform Init...").await;

        let result = async {
            let state_key = format!(
                "{}/{}.tfstate",
                self.ctx.sandbox_id,
                self.ctx.data.tf_uuid().await?
            );
            let backend_config = self
                .ctx
                .backend
                .build_backend_config(&self.working_dir, &state_key)?;
            let cmd = TerraformCommand::init(&backend_config);

            self.report(LiveStatus::Progress(10), "Executing Terraform Init...")
                .await;
            self.run_command(&cmd).await?;
            self.report(LiveStatus::Progress(30), "Init Passed").await;
            Ok::<(), TfsaError>(())
        }
        .await;

        match (result, phase) {
            (Ok(()), _) => Ok(()),
            (Err(e), Phase::Execute) => Err(self
                .fail_execution(ExecutionStatus::InitFailed, "Init Failed", e)
                .await),
            (Err(e), Phase::Destroy) => Err(self.fail_destroy("Init Failed", e).await),
        }
    }

    pub async fn tag(&self) -> Result<()> {
        if !self.ctx.inputs.apply_tags() {
            tracing::info!("skipping adding tags to terraform resources");
            self.message("apply tags is false, skipping adding tags...")
                .await;
            return Ok(());
        }

        tracing::info!("adding tags to terraform resources");
        self.message("apply tags is true, generating tags...").await;

        match self.apply_merged_tags() {
            Ok(()) => Ok(()),
            Err(e) => Err(self
                .fail_execution(ExecutionStatus::PlanFailed, "Tagging Failed", e)
                .await),
        }
    }

    pub async fn plan(&self) -> Result<()> {
        tracing::info!("running terraform plan");
        self.message("generating Terraform Plan...").await;

        let result = async {
            let cmd = TerraformCommand::plan(&self.variables()?);
            self.report(LiveStatus::Progress(40), "Executing Terraform Plan...")
                .await;
            self.run_command(&cmd).await?;
            self.report(LiveStatus::Progress(60), "Plan Passed").await;
            Ok::<(), TfsaError>(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self
                .fail_execution(ExecutionStatus::PlanFailed, "Plan Failed", e)
                .await),
        }
    }

    pub async fn apply(&self) -> Result<()> {
        tracing::info!("running terraform apply");
        self.message("executing Terraform Apply...").await;

        let result = async {
            self.report(LiveStatus::Progress(70), "Executing Terraform Apply...")
                .await;
            self.run_command(&TerraformCommand::apply()).await?;
            self.ctx
                .data
                .set_execution_status(ExecutionStatus::ApplyPassed)
                .await?;
            self.report(LiveStatus::Online, "Apply Passed").await;
            Ok::<(), TfsaError>(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self
                .fail_execution(ExecutionStatus::ApplyFailed, "Apply Failed", e)
                .await),
        }
    }

    pub async fn save_outputs(&self) -> Result<()> {
        tracing::info!("running 'terraform output -json'");

        let result = async {
            let raw = self.run_command(&TerraformCommand::output_json()).await?;
            let outputs = parse_outputs(&raw)?;
            self.ctx.inputs.save_outputs(&outputs).await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(error = %e, "error occurred while trying to parse terraform outputs");
        }
        result
    }

    pub async fn destroy(&self) -> Result<()> {
        tracing::info!("performing terraform destroy");
        self.message("running Terraform Destroy...").await;

        let result = async {
            let cmd = TerraformCommand::destroy(&self.variables()?);
            self.report(LiveStatus::Progress(50), "Executing Terraform Destroy...")
                .await;
            self.run_command(&cmd).await?;
            self.ctx
                .data
                .set_destroy_status(DestroyStatus::DestroyPassed)
                .await?;
            self.report(LiveStatus::Offline, "Destroy Passed").await;
            Ok::<(), TfsaError>(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail_destroy("Destroy Failed", e).await),
        }
    }

    fn apply_merged_tags(&self) -> Result<()> {
        let custom = self.ctx.inputs.custom_tags()?;
        let merged = tags::merge_tags(&custom, &self.ctx.default_tags)?;
        tracing::info!(count = merged.len(), working_dir = %self.working_dir.display(), "applying tags");
        self.ctx.tagger.apply(&self.working_dir, &merged)
    }

    fn variables(&self) -> Result<Vec<Variable>> {
        let mut vars = self.ctx.inputs.mapped_variables();
        vars.extend(self.ctx.inputs.input_variables()?);
        Ok(vars)
    }

    async fn run_command(&self, cmd: &TerraformCommand) -> Result<String> {
        match self.ctx.runner.run(&cmd.args, &self.working_dir).await {
            Ok(raw) => {
                if cmd.loggable() {
                    let clean = sanitize::clean(&raw);
                    self.exec_log.record(cmd.kind, &clean, Level::INFO).await;
                }
                Ok(raw)
            }
            Err(e) => {
                if let TfsaError::Execution { detail, .. } = &e {
                    tracing::error!(command = %cmd.kind, output = %detail, "error occurred while trying to execute terraform");
                    if cmd.loggable() {
                        self.exec_log.record(cmd.kind, detail, Level::ERROR).await;
                    }
                }
                Err(e)
            }
        }
    }

    async fn fail_execution(
        &self,
        status: ExecutionStatus,
        description: &str,
        err: TfsaError,
    ) -> TfsaError {
        if let Err(store_err) = self.record_execution_failure(status).await {
            tracing::error!(status = %status, error = %store_err, "failed to record execution status");
        }
        self.report(LiveStatus::Error, description).await;
        err
    }

    /// A failure before apply never replaces an apply outcome; resources from
    /// the earlier apply still exist and must stay destroyable.
    async fn record_execution_failure(&self, status: ExecutionStatus) -> Result<(), StoreError> {
        if status.is_pre_apply_failure() {
            let current = self.ctx.data.execution_status().await?;
            if current.has_applied() {
                tracing::warn!(
                    kept = %current,
                    failed = %status,
                    "keeping previous apply status after pre-apply failure"
                );
                return Ok(());
            }
        }
        self.ctx.data.set_execution_status(status).await
    }

    async fn fail_destroy(&self, description: &str, err: TfsaError) -> TfsaError {
        if let Err(store_err) = self
            .ctx
            .data
            .set_destroy_status(DestroyStatus::DestroyFailed)
            .await
        {
            tracing::error!(error = %store_err, "failed to record destroy status");
        }
        self.report(LiveStatus::Error, description).await;
        err
    }

    async fn report(&self, status: LiveStatus, description: &str) {
        if let Err(e) = self.ctx.reporter.set_live_status(status, description).await {
            tracing::warn!(status = %status, error = %e, "failed to update live status");
        }
    }

    async fn message(&self, message: &str) {
        if let Err(e) = self.ctx.reporter.write_message(message).await {
            tracing::warn!(error = %e, "failed to write sandbox message");
        }
    }
}
