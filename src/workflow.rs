//! Execute and destroy workflows for one sandbox service.

mod executor;

pub use executor::{Phase, TerraformExecutor};

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, TfsaError};
use crate::inputs::InputOutput;
use crate::lock::SandboxLock;
use crate::sandbox::Reporter;
use crate::status::{RunStatus, SandboxData};
use crate::tags::{ResourceTagger, TagSet};
use crate::terraform::{BackendInjector, ExecLog, ProcessRunner};
use crate::workdir::{self, ModuleStager, NoModuleSource};

const EXECUTE_BLOCKED: &str = "Execution is not enabled due to either failed previous Execution \
     (*Try Destroy first) or Successfully executed previously without successfully destroying it first";
const DESTROY_BLOCKED: &str = "Destroy blocked because APPLY was not yet executed";

/// Collaborators shared by every step of a workflow.
pub struct WorkflowContext {
    pub sandbox_id: String,
    pub runner: Arc<dyn ProcessRunner>,
    pub data: SandboxData,
    pub reporter: Arc<dyn Reporter>,
    pub inputs: Arc<dyn InputOutput>,
    pub tagger: Arc<dyn ResourceTagger>,
    pub backend: BackendInjector,
    pub default_tags: TagSet,
}

/// Stored state for the `status` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub run: RunStatus,
    pub working_dir: Option<PathBuf>,
    pub remote_backend: bool,
}

pub struct SandboxWorkflow {
    ctx: WorkflowContext,
    stager: Arc<dyn ModuleStager>,
    lock_dir: PathBuf,
    log_dir: PathBuf,
}

impl SandboxWorkflow {
    pub fn new(ctx: WorkflowContext, lock_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            stager: Arc::new(NoModuleSource),
            lock_dir: lock_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn with_stager(mut self, stager: Arc<dyn ModuleStager>) -> Self {
        self.stager = stager;
        self
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    /// INIT, TAG, PLAN, APPLY, OUTPUT, in that order, stopping at the first failure.
    pub async fn execute(&self) -> Result<()> {
        let _lock = self.lock()?;

        let run_status = self.ctx.data.run_status().await?;
        if !run_status.can_execute() {
            tracing::warn!(
                execution = %run_status.execution,
                destroy = %run_status.destroy,
                "execution blocked"
            );
            self.message(EXECUTE_BLOCKED).await;
            return Err(TfsaError::config(EXECUTE_BLOCKED));
        }

        let working_dir = workdir::prepare_working_dir(&self.ctx.data, self.stager.as_ref()).await?;
        let executor = TerraformExecutor::new(&self.ctx, working_dir, self.exec_log());
        tracing::info!(
            sandbox_id = %self.ctx.sandbox_id,
            service = %self.ctx.data.scope(),
            working_dir = %executor.working_dir().display(),
            log = %executor.exec_log().path().display(),
            "starting execute workflow"
        );

        executor.init(Phase::Execute).await?;
        executor.tag().await?;
        executor.plan().await?;
        executor.apply().await?;
        executor.save_outputs().await?;

        if self.ctx.backend.is_remote() {
            workdir::remove_staging(&self.ctx.data).await?;
        }

        tracing::info!(sandbox_id = %self.ctx.sandbox_id, "execute workflow finished");
        Ok(())
    }

    pub async fn destroy(&self) -> Result<()> {
        let _lock = self.lock()?;

        if !self.ctx.backend.is_remote() && !workdir::has_working_dir(&self.ctx.data).await? {
            return Err(TfsaError::config(
                "Missing local folder for destroy and no remote state provider is configured",
            ));
        }

        let run_status = self.ctx.data.run_status().await?;
        if !run_status.can_destroy() {
            tracing::warn!(execution = %run_status.execution, "destroy blocked");
            self.message(DESTROY_BLOCKED).await;
            return Err(TfsaError::config(DESTROY_BLOCKED));
        }

        let working_dir = workdir::prepare_working_dir(&self.ctx.data, self.stager.as_ref()).await?;
        let executor = TerraformExecutor::new(&self.ctx, working_dir, self.exec_log());
        tracing::info!(
            sandbox_id = %self.ctx.sandbox_id,
            service = %self.ctx.data.scope(),
            working_dir = %executor.working_dir().display(),
            log = %executor.exec_log().path().display(),
            "starting destroy workflow"
        );

        executor.init(Phase::Destroy).await?;
        executor.destroy().await?;

        workdir::remove_staging(&self.ctx.data).await?;

        tracing::info!(sandbox_id = %self.ctx.sandbox_id, "destroy workflow finished");
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            run: self.ctx.data.run_status().await?,
            working_dir: self.ctx.data.working_dir().await?,
            remote_backend: self.ctx.backend.is_remote(),
        })
    }

    fn lock(&self) -> Result<SandboxLock> {
        SandboxLock::acquire(&self.lock_dir, &self.ctx.sandbox_id, self.ctx.data.scope())
    }

    fn exec_log(&self) -> ExecLog {
        ExecLog::new(&self.log_dir, &self.ctx.sandbox_id)
    }

    async fn message(&self, message: &str) {
        if let Err(e) = self.ctx.reporter.write_message(message).await {
            tracing::warn!(error = %e, "failed to write sandbox message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{APPLY_TAGS, AttributeMapper, CUSTOM_TAGS, StoreAttributeSink, TERRAFORM_OUTPUTS};
    use crate::sandbox::{LiveStatus, SandboxError};
    use crate::status::{DestroyStatus, ExecutionStatus};
    use crate::store::{FileStore, KeyValueStore};
    use crate::tags::TfvarsTagger;
    use crate::terraform::BackendProfile;
    use serial_test::serial;
    use crate::workdir::StagedModule;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const OUTPUT_JSON: &str =
        r#"{"public_ip": {"value": "10.0.0.1", "sensitive": false, "type": "string"}}"#;

    /// Answers by subcommand; anything not scripted to fail succeeds.
    #[derive(Default)]
    struct ScriptedRunner {
        failing: Mutex<Vec<&'static str>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn failing(failing: &[&'static str]) -> Self {
            let runner = Self::default();
            runner.fail_on(failing);
            runner
        }

        fn fail_on(&self, failing: &[&'static str]) {
            *self.failing.lock().unwrap() = failing.to_vec();
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn subcommands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|args| args[0].clone())
                .collect()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, args: &[String], _working_dir: &Path) -> Result<String> {
            self.calls.lock().unwrap().push(args.to_vec());
            let command = args[0].as_str();
            if self.failing.lock().unwrap().iter().any(|f| *f == command) {
                return Err(TfsaError::Execution {
                    command: command.to_string(),
                    detail: format!("Error: {} exploded", command),
                });
            }
            Ok(match command {
                "output" => OUTPUT_JSON.to_string(),
                other => format!("{} complete", other),
            })
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        statuses: Mutex<Vec<(String, String)>>,
        messages: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        fn statuses(&self) -> Vec<String> {
            self.statuses
                .lock()
                .unwrap()
                .iter()
                .map(|(status, _)| status.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn set_live_status(
            &self,
            status: LiveStatus,
            description: &str,
        ) -> std::result::Result<(), SandboxError> {
            self.statuses
                .lock()
                .unwrap()
                .push((status.to_string(), description.to_string()));
            Ok(())
        }

        async fn write_message(&self, message: &str) -> std::result::Result<(), SandboxError> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct TempStager {
        parent: PathBuf,
    }

    #[async_trait]
    impl ModuleStager for TempStager {
        async fn stage(&self) -> Result<StagedModule> {
            let staging_root = self.parent.join(format!("tfsa-{}", uuid::Uuid::new_v4()));
            let working_dir = staging_root.join(workdir::REPO_DIR);
            std::fs::create_dir_all(&working_dir)?;
            Ok(StagedModule {
                working_dir,
                staging_root,
            })
        }
    }

    struct Harness {
        dir: TempDir,
        store: Arc<dyn KeyValueStore>,
        runner: Arc<ScriptedRunner>,
        reporter: Arc<RecordingReporter>,
        workflow: SandboxWorkflow,
    }

    impl Harness {
        fn data(&self) -> &SandboxData {
            &self.workflow.context().data
        }

        fn log_contents(&self) -> String {
            let sandbox_logs = self.dir.path().join("logs").join("sb1");
            std::fs::read_dir(sandbox_logs)
                .unwrap()
                .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
                .collect()
        }
    }

    fn harness(runner: ScriptedRunner, attributes: &[(&str, &str)]) -> Harness {
        harness_with_backend(runner, attributes, BackendInjector::default())
    }

    fn harness_with_backend(
        runner: ScriptedRunner,
        attributes: &[(&str, &str)],
        backend: BackendInjector,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::new(dir.path().join("state"), "sb1"));
        let runner = Arc::new(runner);
        let reporter = Arc::new(RecordingReporter::default());

        let attributes: BTreeMap<String, String> = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let inputs = AttributeMapper::new(
            attributes,
            BTreeMap::new(),
            BTreeMap::new(),
            Arc::new(StoreAttributeSink::new(store.clone(), "tf")),
        );

        let ctx = WorkflowContext {
            sandbox_id: "sb1".to_string(),
            runner: runner.clone(),
            data: SandboxData::new(store.clone(), "tf"),
            reporter: reporter.clone(),
            inputs: Arc::new(inputs),
            tagger: Arc::new(TfvarsTagger::default()),
            backend,
            default_tags: crate::tags::default_tags("sb1", &Default::default()),
        };
        let workflow = SandboxWorkflow::new(ctx, dir.path().join("locks"), dir.path().join("logs"))
            .with_stager(Arc::new(TempStager {
                parent: dir.path().join("staging"),
            }));

        Harness {
            dir,
            store,
            runner,
            reporter,
            workflow,
        }
    }

    #[tokio::test]
    async fn test_execute_happy_path() {
        let h = harness(ScriptedRunner::default(), &[]);

        h.workflow.execute().await.unwrap();

        assert_eq!(h.runner.subcommands(), ["init", "plan", "apply", "output"]);
        let run = h.data().run_status().await.unwrap();
        assert_eq!(run.execution, ExecutionStatus::ApplyPassed);
        assert_eq!(run.destroy, DestroyStatus::None);
        assert_eq!(
            h.reporter.statuses(),
            ["Progress 10", "Progress 30", "Progress 40", "Progress 60", "Progress 70", "Online"]
        );
        assert_eq!(
            h.store
                .get(&StoreAttributeSink::key("tf", TERRAFORM_OUTPUTS))
                .await
                .unwrap()
                .as_deref(),
            Some("public_ip=10.0.0.1")
        );
        // local state keeps the working dir for a later destroy
        assert!(workdir::has_working_dir(h.data()).await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_log_skips_output_command() {
        let h = harness(ScriptedRunner::default(), &[]);
        h.workflow.execute().await.unwrap();

        let log = h.log_contents();
        assert!(log.contains("init complete"));
        assert!(log.contains("plan complete"));
        assert!(log.contains("apply complete"));
        assert!(!log.contains("10.0.0.1"));
        assert_eq!(log.matches(" START ]---").count(), 3);
        assert!(!log.contains("OUTPUT START"));
    }

    #[tokio::test]
    async fn test_apply_failure_stops_before_output() {
        let h = harness(ScriptedRunner::failing(&["apply"]), &[]);

        let err = h.workflow.execute().await.unwrap_err();

        assert!(err.is_execution());
        assert_eq!(h.runner.subcommands(), ["init", "plan", "apply"]);
        assert_eq!(
            h.data().execution_status().await.unwrap(),
            ExecutionStatus::ApplyFailed
        );
        assert_eq!(h.reporter.statuses().last().map(String::as_str), Some("Error"));
        assert!(h.log_contents().contains("Error: apply exploded"));
    }

    #[tokio::test]
    async fn test_plan_failure_records_plan_failed() {
        let h = harness(ScriptedRunner::failing(&["plan"]), &[]);

        assert!(h.workflow.execute().await.unwrap_err().is_execution());
        assert_eq!(h.runner.subcommands(), ["init", "plan"]);
        assert_eq!(
            h.data().execution_status().await.unwrap(),
            ExecutionStatus::PlanFailed
        );
    }

    #[tokio::test]
    async fn test_init_failure_records_init_failed() {
        let h = harness(ScriptedRunner::failing(&["init"]), &[]);

        assert!(h.workflow.execute().await.unwrap_err().is_execution());
        assert_eq!(h.runner.subcommands(), ["init"]);
        assert_eq!(
            h.data().execution_status().await.unwrap(),
            ExecutionStatus::InitFailed
        );
        // pre-apply failures do not block the next attempt
        assert!(h.data().run_status().await.unwrap().can_execute());
    }

    #[tokio::test]
    async fn test_tag_limit_aborts_before_plan() {
        let custom: Vec<String> = (0..49).map(|i| format!("t{i}=v")).collect();
        let custom = custom.join(",");
        let h = harness(
            ScriptedRunner::default(),
            &[(APPLY_TAGS, "true"), (CUSTOM_TAGS, custom.as_str())],
        );

        let err = h.workflow.execute().await.unwrap_err();

        assert!(err.is_config());
        assert_eq!(h.runner.subcommands(), ["init"]);
        assert_eq!(
            h.data().execution_status().await.unwrap(),
            ExecutionStatus::PlanFailed
        );
    }

    #[tokio::test]
    async fn test_execute_blocked_after_failed_apply() {
        let h = harness(ScriptedRunner::default(), &[]);
        h.data()
            .set_execution_status(ExecutionStatus::ApplyFailed)
            .await
            .unwrap();

        let err = h.workflow.execute().await.unwrap_err();

        assert!(err.is_config());
        assert!(h.runner.subcommands().is_empty());
        assert_eq!(h.reporter.messages.lock().unwrap().as_slice(), [EXECUTE_BLOCKED]);
        assert!(!h.dir.path().join("staging").exists());
    }

    #[tokio::test]
    async fn test_destroy_from_none_runs_nothing() {
        let h = harness(ScriptedRunner::default(), &[]);

        assert!(h.workflow.destroy().await.unwrap_err().is_config());
        assert!(h.runner.subcommands().is_empty());
        assert_eq!(
            h.data().destroy_status().await.unwrap(),
            DestroyStatus::None
        );
    }

    #[tokio::test]
    async fn test_destroy_gate_with_existing_working_dir() {
        let h = harness(ScriptedRunner::failing(&["plan"]), &[]);
        h.workflow.execute().await.unwrap_err();

        let err = h.workflow.destroy().await.unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains(DESTROY_BLOCKED));
        assert_eq!(h.runner.subcommands(), ["init", "plan"]);
    }

    #[tokio::test]
    async fn test_destroy_after_apply_cleans_up() {
        let h = harness(ScriptedRunner::default(), &[]);
        h.workflow.execute().await.unwrap();
        let root = h.data().staging_root().await.unwrap().unwrap();

        h.workflow.destroy().await.unwrap();

        assert_eq!(
            h.runner.subcommands(),
            ["init", "plan", "apply", "output", "init", "destroy"]
        );
        let run = h.data().run_status().await.unwrap();
        assert_eq!(run.execution, ExecutionStatus::ApplyPassed);
        assert_eq!(run.destroy, DestroyStatus::DestroyPassed);
        assert!(run.can_execute());
        assert_eq!(h.reporter.statuses().last().map(String::as_str), Some("Offline"));
        assert!(!root.exists());
        assert_eq!(h.data().working_dir().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_failure_records_destroy_failed() {
        let h = harness(ScriptedRunner::failing(&["destroy"]), &[]);
        h.workflow.execute().await.unwrap();

        assert!(h.workflow.destroy().await.unwrap_err().is_execution());

        let run = h.data().run_status().await.unwrap();
        assert_eq!(run.destroy, DestroyStatus::DestroyFailed);
        assert!(!run.can_execute());
        assert!(workdir::has_working_dir(h.data()).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_locked() {
        let h = harness(ScriptedRunner::default(), &[]);
        let _held = SandboxLock::acquire(&h.dir.path().join("locks"), "sb1", "tf").unwrap();

        let err = h.workflow.execute().await.unwrap_err();
        assert!(matches!(err, TfsaError::Locked { .. }));
        assert!(h.runner.subcommands().is_empty());
    }

    #[tokio::test]
    async fn test_status_report() {
        let h = harness(ScriptedRunner::default(), &[]);
        h.workflow.execute().await.unwrap();

        let report = h.workflow.status().await.unwrap();
        assert_eq!(report.run.execution, ExecutionStatus::ApplyPassed);
        assert!(report.working_dir.is_some());
        assert!(!report.remote_backend);
    }
    #[tokio::test]
    async fn test_failed_re_execute_keeps_apply_status() {
        let h = harness(ScriptedRunner::default(), &[]);
        h.workflow.execute().await.unwrap();

        h.runner.fail_on(&["plan"]);
        assert!(h.workflow.execute().await.unwrap_err().is_execution());
        let run = h.data().run_status().await.unwrap();
        assert_eq!(run.execution, ExecutionStatus::ApplyPassed);
        assert!(run.can_destroy());
        assert_eq!(h.reporter.statuses().last().map(String::as_str), Some("Error"));

        h.runner.fail_on(&["init"]);
        assert!(h.workflow.execute().await.unwrap_err().is_execution());
        assert_eq!(
            h.data().execution_status().await.unwrap(),
            ExecutionStatus::ApplyPassed
        );

        h.runner.fail_on(&[]);
        h.workflow.destroy().await.unwrap();
        assert_eq!(
            h.data().destroy_status().await.unwrap(),
            DestroyStatus::DestroyPassed
        );
    }

    #[tokio::test]
    async fn test_apply_tags_writes_tfvars_before_plan() {
        let h = harness(
            ScriptedRunner::default(),
            &[(APPLY_TAGS, "true"), (CUSTOM_TAGS, "team=infra,cost=42")],
        );

        h.workflow.execute().await.unwrap();

        assert_eq!(h.runner.subcommands(), ["init", "plan", "apply", "output"]);
        let working_dir = h.data().working_dir().await.unwrap().unwrap();
        let written =
            std::fs::read_to_string(working_dir.join(crate::tags::TAGS_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        let tags = &doc[crate::tags::DEFAULT_TAGS_VARIABLE];
        assert_eq!(tags["team"], "infra");
        assert_eq!(tags["cost"], "42");
        assert_eq!(tags["SandboxId"], "sb1");
        assert_eq!(tags["CreatedBy"], "tfsa");
    }

    #[tokio::test]
    async fn test_tags_skipped_when_disabled() {
        let h = harness(ScriptedRunner::default(), &[(CUSTOM_TAGS, "team=infra")]);

        h.workflow.execute().await.unwrap();

        let working_dir = h.data().working_dir().await.unwrap().unwrap();
        assert!(!working_dir.join(crate::tags::TAGS_FILE).exists());
    }

    #[tokio::test]
    #[serial]
    async fn test_remote_backend_cleans_up_and_destroys_without_local_dir() {
        const SECRET_VAR: &str = "TFSA_TEST_STATE_ACCESS_KEY";
        unsafe {
            std::env::set_var(SECRET_VAR, "s3cr3t");
        }

        let profile = BackendProfile {
            kind: "s3".to_string(),
            settings: BTreeMap::from([("bucket".to_string(), "tf-state".to_string())]),
            secret_env: BTreeMap::from([("access_key".to_string(), SECRET_VAR.to_string())]),
        };
        let backend = BackendInjector::new(
            Some("s3-state".to_string()),
            BTreeMap::from([("s3-state".to_string(), profile)]),
        );
        let h = harness_with_backend(ScriptedRunner::default(), &[], backend);
        let staging = h.dir.path().join("staging");

        h.workflow.execute().await.unwrap();

        let init = &h.runner.calls()[0];
        assert_eq!(init[0], "init");
        assert!(init.contains(&"-backend-config=access_key=s3cr3t".to_string()));
        assert_eq!(h.data().working_dir().await.unwrap(), None);
        assert_eq!(h.data().staging_root().await.unwrap(), None);
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);

        h.workflow.destroy().await.unwrap();

        unsafe {
            std::env::remove_var(SECRET_VAR);
        }

        assert_eq!(
            h.runner.subcommands(),
            ["init", "plan", "apply", "output", "init", "destroy"]
        );
        assert!(h.runner.calls()[4].contains(&"-backend-config=access_key=s3cr3t".to_string()));
        assert_eq!(
            h.data().destroy_status().await.unwrap(),
            DestroyStatus::DestroyPassed
        );
        assert_eq!(h.data().working_dir().await.unwrap(), None);
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}
