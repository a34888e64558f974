use anyhow::Context;
use clap::Parser;
use kg_config::{Cli, Command, LogFormat};

fn init_logging(log: &kg_config::LogArgs) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let store = kg_store::Store::connect(&cli.store.database_url)
        .await
        .context("connecting to state store")?;

    match cli.command {
        Command::Scan { target, run_id } => run_scan(store, &target, run_id).await,
        Command::Serve { llm, server } => run_serve(cli.store, store, llm, server).await,
    }
}

/// One-shot: diff the target tree against the last recorded snapshot, durably
/// record any structural refactors for the Graph Ingestor, and enqueue a
/// discovery event per new or modified file.
async fn run_scan(store: kg_store::Store, target: &std::path::Path, run_id: Option<uuid::Uuid>) -> anyhow::Result<()> {
    let run_id = run_id.unwrap_or_else(uuid::Uuid::new_v4);

    let existing = store.files().all(store.pool()).await?;
    let previous: std::collections::HashMap<String, String> = existing
        .iter()
        .map(|(path, file)| (path.clone(), file.checksum.clone()))
        .collect();

    let outcome = kg_workers::scanner::scan(target, &previous).context("scanning target directory")?;
    let files = kg_workers::scanner::files_for_scan(target, &outcome.new_or_modified, &existing)
        .context("reading scanned files")?;

    let mut txn = store.pool().begin().await?;
    let file_repo = store.files();
    for file in &files {
        file_repo.upsert(&mut txn, file).await?;
    }
    for refactor in &outcome.deleted {
        file_repo.apply_refactor(&mut txn, refactor).await?;
    }
    if !outcome.deleted.is_empty() {
        store.refactors().insert_many(&mut txn, &outcome.deleted).await?;
    }

    if !outcome.new_or_modified.is_empty() {
        let batcher_id = kg_automations::next_task_id();
        let mut paths = outcome.new_or_modified.iter();
        let first = paths.next().expect("checked non-empty above");
        kg_workers::dispatch::spawn_root(
            &mut txn,
            batcher_id,
            kg_automations::task_types::FILE_DISCOVERY_BATCHER,
            &kg_workers::file_discovery_batcher::PathDiscoveryEvent {
                file_path: first.clone(),
                run_id,
            },
        )
        .await?;
        for path in paths {
            kg_workers::dispatch::send(
                &mut txn,
                batcher_id,
                &kg_workers::file_discovery_batcher::PathDiscoveryEvent {
                    file_path: path.clone(),
                    run_id,
                },
            )
            .await?;
        }
    }

    txn.commit().await?;

    tracing::info!(
        %run_id,
        new_or_modified = outcome.new_or_modified.len(),
        refactors = outcome.deleted.len(),
        "scan complete"
    );
    Ok(())
}

/// Runs the resident worker server: every queue's Executor, polled until
/// `Ctrl-C`.
async fn run_serve(
    store_args: kg_config::StoreArgs,
    store: kg_store::Store,
    llm_args: kg_config::LlmArgs,
    server_args: kg_config::ServerArgs,
) -> anyhow::Result<()> {
    let kv = || async { kg_kv::Kv::connect(&store_args.redis_url).await.context("connecting to KV facility") };

    let graph = kg_graph::GraphStore::connect(
        &store_args.neo4j_uri,
        &store_args.neo4j_user,
        &store_args.neo4j_password,
        &store_args.neo4j_database,
    )
    .await
    .context("connecting to graph store")?;

    let http = reqwest::Client::new();
    let llm_inner = kg_llm::HttpClient::new(
        http,
        llm_args.llm_endpoint.clone(),
        llm_args.llm_api_key.clone(),
        llm_args.llm_model.clone(),
    );
    let llm = kg_llm::RetryingClient::new(llm_inner, llm_args.retry_config());
    let tokenizer = kg_llm::Tokenizer::new().context("loading tokenizer")?;

    let server = kg_automations::Server::new()
        .register(kg_workers::file_discovery_batcher::FileDiscoveryBatcher {
            target_root: std::env::current_dir()?,
            tokenizer: kg_llm::Tokenizer::new().context("loading tokenizer")?,
            kv: tokio::sync::Mutex::new(kv().await?),
            max_batch_tokens: llm_args.max_batch_tokens,
            max_file_size_bytes: llm_args.max_file_size_bytes,
        })
        .register(kg_workers::file_analysis_worker::FileAnalysisWorker {
            target_root: std::env::current_dir()?,
            tokenizer,
            llm: clone_retrying(&llm_args, &llm_args.llm_endpoint, &llm_args.llm_api_key, &llm_args.llm_model),
            kv: tokio::sync::Mutex::new(kv().await?),
            max_input_tokens: llm_args.max_input_tokens,
            max_correction_retries: llm_args.max_correction_retries,
        })
        .register(kg_workers::directory_resolution_worker::DirectoryResolutionWorker {
            store: store.clone(),
            llm: clone_retrying(&llm_args, &llm_args.llm_endpoint, &llm_args.llm_api_key, &llm_args.llm_model),
            max_correction_retries: llm_args.max_correction_retries,
        })
        .register(kg_workers::global_resolution_worker::GlobalResolutionWorker {
            store: store.clone(),
            llm: clone_retrying(&llm_args, &llm_args.llm_endpoint, &llm_args.llm_api_key, &llm_args.llm_model),
            max_input_tokens: llm_args.max_input_tokens,
            max_correction_retries: llm_args.max_correction_retries,
            tokenizer: kg_llm::Tokenizer::new().context("loading tokenizer")?,
        })
        .register(kg_workers::relationship_resolution_worker::RelationshipResolutionWorker {
            store: store.clone(),
            llm,
            max_correction_retries: llm_args.max_correction_retries,
            max_job_retries: server_args.job_max_retries,
            initial_backoff: llm_args.llm_initial_backoff,
        })
        .register(kg_workers::validation_worker::ValidationWorker {
            store: store.clone(),
            kv: tokio::sync::Mutex::new(kv().await?),
        })
        .register(kg_workers::reconciliation_worker::ReconciliationWorker {
            store: store.clone(),
            threshold: server_args.reconciliation_threshold,
        })
        .register(kg_workers::outbox_publisher::OutboxPublisher {
            batch_size: server_args.ingestor_batch_size,
            tick_interval: server_args.ingestor_interval,
            max_retries: server_args.outbox_max_retries,
        })
        .register(kg_workers::graph_ingestor::GraphIngestor {
            store: store.clone(),
            graph,
            batch_size: server_args.ingestor_batch_size,
            tick_interval: server_args.ingestor_interval,
        });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
    };

    server
        .serve(
            server_args.worker_concurrency,
            store.pool().clone(),
            server_args.dequeue_interval,
            server_args.heartbeat_timeout,
            shutdown,
        )
        .await;

    Ok(())
}

fn clone_retrying(
    llm_args: &kg_config::LlmArgs,
    endpoint: &url::Url,
    api_key: &str,
    model: &str,
) -> kg_llm::RetryingClient<kg_llm::HttpClient> {
    let inner = kg_llm::HttpClient::new(reqwest::Client::new(), endpoint.clone(), api_key.to_string(), model.to_string());
    kg_llm::RetryingClient::new(inner, llm_args.retry_config())
}
