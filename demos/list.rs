use tknx::{
    Clients, clock::SystemClock, determine_context, determine_namespace,
    gateway::{CallOptions, ListOptions},
    pipelinerun,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let context = determine_context(&None)?;
    println!("context={context}");
    let namespace = determine_namespace(None, &context);
    println!("namespace={namespace}");

    let clients = Clients::from_context(Some(context)).await?;
    let lines = pipelinerun::get_all_pipelineruns(
        &clients,
        &namespace,
        &ListOptions::default(),
        10,
        &SystemClock,
        &CallOptions::default(),
    )
    .await?;

    for line in lines {
        println!("{line}");
    }

    Ok(())
}
