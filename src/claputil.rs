use std::{ffi::OsStr, future::Future};

use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use kube::config::Kubeconfig;
use tokio::{runtime::Handle, task};

use crate::{
    Clients, determine_namespace,
    gateway::{CallOptions, ListOptions},
    pipelinerun,
};

/// Keep the names starting with the (trimmed) `input`, in order.
fn matching<I, S>(names: I, input: &OsStr) -> Vec<CompletionCandidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let input = input.to_string_lossy();
    let input = input.trim();
    names
        .into_iter()
        .filter(|name| name.as_ref().starts_with(input))
        .map(|name| CompletionCandidate::new(name.as_ref()))
        .collect()
}

/// Run `fut` to completion from a synchronous completer.
///
/// If called on an existing Tokio runtime, `Runtime::block_on` would panic,
/// so a running runtime is entered through `block_in_place` instead.
fn block_on<F>(fut: F) -> F::Output
where
    F: Future,
    F::Output: Default,
{
    match Handle::try_current() {
        Ok(handle) => task::block_in_place(move || handle.block_on(fut)),
        Err(_) => tokio::runtime::Runtime::new()
            .map(|rt| rt.block_on(fut))
            .unwrap_or_default(),
    }
}

/// Create an `ArgValueCompleter` that lists contexts from the active kubeconfig.
pub fn context_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let Ok(kubeconfig) = Kubeconfig::read() else {
            return Vec::new();
        };
        matching(kubeconfig.contexts.iter().map(|named| &named.name), input)
    })
}

/// Create an `ArgValueCompleter` that lists PipelineRun names, newest first.
///
/// Runs are listed from the default namespace of the current context, so
/// this makes a network call and returns nothing on any failure.
///
/// Limitation: `--context` and `--namespace` are not considered.
/// See https://github.com/clap-rs/clap/issues/1910 for more details.
pub fn pipelinerun_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let names = async {
            let Ok(context) = crate::determine_context(&None) else {
                return Vec::new();
            };
            let namespace = determine_namespace(None, &context);
            let Ok(clients) = Clients::from_context(Some(context)).await else {
                return Vec::new();
            };
            let runs = pipelinerun::list_pipelineruns(
                &clients,
                &namespace,
                &ListOptions::default(),
                0,
                &CallOptions::default(),
            )
            .await
            .unwrap_or_default();
            runs.into_iter()
                .filter_map(|run| run.metadata.name)
                .collect::<Vec<_>>()
        };
        matching(block_on(names), input)
    })
}
