mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, StageArgs};
use tfsa::config::{self, ServiceConfig};
use tfsa::inputs::{
    ApiAttributeSink, AttributeMapper, AttributeSink, REMOTE_STATE_PROVIDER, StoreAttributeSink,
};
use tfsa::sandbox::{ApiReporter, Reporter, TracingReporter};
use tfsa::tags::{self, TfvarsTagger};
use tfsa::terraform::{BackendInjector, TerraformCli};
use tfsa::workdir::LocalStager;
use tfsa::{
    FileStore, KeyValueStore, SandboxClient, SandboxData, SandboxWorkflow, StatusReport,
    WorkflowContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli.config)?;
    let state_dir = cli
        .resolved_state_dir()
        .ok_or_else(|| eyre!("no local data directory on this platform, pass --state-dir"))?;

    let workflow = build_workflow(&cli, &config, &state_dir)?;

    match &cli.command {
        Command::Execute(args) => with_stager(workflow, args).execute().await?,
        Command::Destroy(args) => with_stager(workflow, args).destroy().await?,
        Command::Status => print_status(&config, &workflow.status().await?),
    }

    Ok(())
}

fn build_workflow(cli: &Cli, config: &ServiceConfig, state_dir: &Path) -> Result<SandboxWorkflow> {
    let service = config.service.name.as_str();

    let store: Arc<dyn KeyValueStore>;
    let reporter: Arc<dyn Reporter>;
    let sink: Arc<dyn AttributeSink>;

    match (&cli.api_url, &cli.api_token) {
        (Some(api_url), Some(token)) => {
            let client = SandboxClient::new(api_url.clone(), token, cli.sandbox_id.clone())?;
            tracing::info!(api_url = %api_url, sandbox_id = client.sandbox_id(), "using orchestration api");
            store = Arc::new(client.clone());
            reporter = Arc::new(ApiReporter::new(
                client.clone(),
                service,
                config.options.report_options(),
            ));
            sink = Arc::new(ApiAttributeSink::new(client, service));
        }
        _ => {
            tracing::info!(state_dir = %state_dir.display(), "no api configured, using local store");
            let local: Arc<dyn KeyValueStore> =
                Arc::new(FileStore::new(state_dir.join("store"), &cli.sandbox_id));
            store = local.clone();
            reporter = Arc::new(TracingReporter::new(service));
            sink = Arc::new(StoreAttributeSink::new(local, service));
        }
    }

    let inputs = AttributeMapper::new(
        config.attributes.clone(),
        config.inputs_map.clone(),
        config.outputs_map.clone(),
        sink,
    );
    let backend = BackendInjector::new(
        inputs.attribute(REMOTE_STATE_PROVIDER).map(str::to_string),
        config.backends.clone(),
    );

    let ctx = WorkflowContext {
        sandbox_id: cli.sandbox_id.clone(),
        runner: Arc::new(TerraformCli::new(config.options.timeout())),
        data: SandboxData::new(store, service),
        reporter,
        inputs: Arc::new(inputs),
        tagger: Arc::new(TfvarsTagger::default()),
        backend,
        default_tags: tags::default_tags(&cli.sandbox_id, &config.sandbox),
    };

    Ok(SandboxWorkflow::new(
        ctx,
        state_dir.join("locks"),
        state_dir.join("logs"),
    ))
}

fn with_stager(workflow: SandboxWorkflow, args: &StageArgs) -> SandboxWorkflow {
    match (&args.module_dir, &args.terraform_bin) {
        (Some(module_dir), Some(terraform_bin)) => {
            let staging_parent = args.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
            workflow.with_stager(Arc::new(LocalStager::new(
                module_dir,
                terraform_bin,
                staging_parent,
            )))
        }
        _ => workflow,
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn print_status(config: &ServiceConfig, report: &StatusReport) {
    let service = match &config.service.model {
        Some(model) => format!("{} ({})", config.service.name, model),
        None => config.service.name.clone(),
    };
    let working_dir = report
        .working_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "-".to_string());

    let rows = vec![
        StatusRow { field: "Service", value: service },
        StatusRow { field: "Execution status", value: report.run.execution.to_string() },
        StatusRow { field: "Destroy status", value: report.run.destroy.to_string() },
        StatusRow { field: "Can execute", value: report.run.can_execute().to_string() },
        StatusRow { field: "Can destroy", value: report.run.can_destroy().to_string() },
        StatusRow { field: "Remote state", value: report.remote_backend.to_string() },
        StatusRow { field: "Working dir", value: working_dir },
    ];

    println!("{}", Table::new(rows));
}
