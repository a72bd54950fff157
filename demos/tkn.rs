use std::{path::PathBuf, time::Duration};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use tknx::{
    Clients,
    apis::v1beta1,
    claputil,
    clock::SystemClock,
    determine_context, determine_namespace,
    gateway::{CallOptions, ListOptions},
    pipelinerun,
    prompt::DialoguerPrompt,
    resource::ResourceWizard,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "tkn", about = "Manage Tekton pipeline runs across API versions")]
struct Cli {
    #[arg(long, global = true, add = claputil::context_value_completer())]
    /// Kubeconfig context to use.
    context: Option<String>,

    #[arg(short, long, global = true)]
    /// Namespace to use; defaults to the context's namespace.
    namespace: Option<String>,

    #[arg(long, global = true, value_parser = parse_seconds)]
    /// Per-request timeout in seconds.
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    value
        .trim_end_matches('s')
        .parse()
        .map(Duration::from_secs)
        .map_err(|err| format!("invalid timeout {value:?}: {err}"))
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage pipeline runs.
    #[command(subcommand, alias = "pr")]
    Pipelinerun(PipelineRunCommand),
    /// Manage pipeline resources.
    #[command(subcommand, alias = "res")]
    Resource(ResourceCommand),
}

#[derive(Debug, Subcommand)]
enum PipelineRunCommand {
    /// Show a pipeline run with the status of its task runs.
    Describe {
        #[arg(add = claputil::pipelinerun_value_completer())]
        name: String,
    },
    /// List pipeline runs, most recently started first.
    List {
        /// Show at most this many runs; 0 shows all.
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },
    /// Create a pipeline run from a v1beta1 JSON manifest.
    Create {
        #[arg(short, long)]
        filename: PathBuf,
    },
    /// Cancel a running pipeline run.
    Cancel {
        #[arg(add = claputil::pipelinerun_value_completer())]
        name: String,
        #[arg(long, value_enum)]
        grace: Option<Grace>,
    },
    /// Delete a pipeline run.
    Delete {
        #[arg(add = claputil::pipelinerun_value_completer())]
        name: String,
    },
    /// Stream pipeline run events until interrupted.
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Grace {
    /// Cancel running tasks but still run `finally` tasks.
    Cancel,
    /// Let running tasks finish, then run `finally` tasks.
    Stop,
}

impl Grace {
    fn cancel_status(grace: Option<Self>) -> &'static str {
        match grace {
            None => "Cancelled",
            Some(Self::Cancel) => "CancelledRunFinally",
            Some(Self::Stop) => "StoppedRunFinally",
        }
    }
}

#[derive(Debug, Subcommand)]
enum ResourceCommand {
    /// Create a pipeline resource interactively.
    Create,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tknx::clap_complete::CompleteEnv::with_factory(Cli::command).complete();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tknx=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let context = determine_context(&cli.context)?;
    let namespace = determine_namespace(cli.namespace, &context);
    let clients = Clients::from_context(Some(context)).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    let mut opts = CallOptions::default().with_cancel(cancel);
    if let Some(timeout) = cli.timeout {
        opts = opts.with_timeout(timeout);
    }

    match cli.command {
        Command::Pipelinerun(command) => run_pipelinerun(&clients, &namespace, command, &opts).await,
        Command::Resource(ResourceCommand::Create) => {
            let created = ResourceWizard::new(&clients, &namespace)
                .with_options(opts)
                .run(&mut DialoguerPrompt::default())
                .await;
            match created {
                Ok(created) => println!("{}", created.created_message()),
                Err(err) if err.is_interrupted() => {}
                Err(err) => return Err(err.into()),
            }
            Ok(())
        }
    }
}

async fn run_pipelinerun(
    clients: &Clients,
    namespace: &str,
    command: PipelineRunCommand,
    opts: &CallOptions,
) -> anyhow::Result<()> {
    match command {
        PipelineRunCommand::Describe { name } => {
            let pr = pipelinerun::get(clients, namespace, &name, opts).await?;
            println!("{}", serde_json::to_string_pretty(&pr)?);
        }
        PipelineRunCommand::List { limit, selector } => {
            let mut list = ListOptions::default();
            if let Some(selector) = &selector {
                list = list.labels(selector);
            }
            let lines = pipelinerun::get_all_pipelineruns(
                clients,
                namespace,
                &list,
                limit,
                &SystemClock,
                opts,
            )
            .await?;
            if lines.is_empty() {
                println!("No PipelineRuns found");
            }
            for line in lines {
                println!("{line}");
            }
        }
        PipelineRunCommand::Create { filename } => {
            let manifest = std::fs::read_to_string(&filename)?;
            let pr: v1beta1::PipelineRun = serde_json::from_str(&manifest)?;
            let created = pipelinerun::create(clients, namespace, &pr, opts).await?;
            println!(
                "PipelineRun created: {}",
                created.metadata.name.as_deref().unwrap_or_default()
            );
        }
        PipelineRunCommand::Cancel { name, grace } => {
            let status = Grace::cancel_status(grace);
            pipelinerun::cancel(clients, namespace, &name, status, opts).await?;
            println!("PipelineRun cancelled: {name}");
        }
        PipelineRunCommand::Delete { name } => {
            pipelinerun::delete(clients, namespace, &name, opts).await?;
            println!("PipelineRun deleted: {name}");
        }
        PipelineRunCommand::Watch => {
            let mut events = pipelinerun::watch(clients, namespace, &ListOptions::default(), opts).await?;
            while let Some(event) = events.try_next().await? {
                println!("{:?}\t{}", event.kind, event.object.name());
            }
        }
    }
    Ok(())
}
