//! Command-line and environment configuration for `kg-cli`. Every option
//! has an env-var fallback so the pipeline can run unattended in a
//! container, mirroring how the production daemon this is modeled on takes
//! its own configuration.

use std::time::Duration;

use clap::Parser;

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Connection settings for the three external facilities every worker
/// depends on: the state store, the job bus's KV/scripting side, and the
/// graph store.
#[derive(Parser, Debug, Clone)]
pub struct StoreArgs {
    /// Postgres URL backing both the durable task queue and the state store.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis URL backing the job bus's ephemeral KV/scripting facility.
    #[clap(long = "redis-url", env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[clap(long = "neo4j-uri", env = "NEO4J_URI", default_value = "bolt://127.0.0.1:7687")]
    pub neo4j_uri: String,
    #[clap(long = "neo4j-user", env = "NEO4J_USER", default_value = "neo4j")]
    pub neo4j_user: String,
    #[clap(long = "neo4j-password", env = "NEO4J_PASSWORD")]
    pub neo4j_password: String,
    #[clap(long = "neo4j-database", env = "NEO4J_DATABASE", default_value = "neo4j")]
    pub neo4j_database: String,
}

/// LLM endpoint and the retry/backoff/correction knobs every analysis pass
/// shares.
#[derive(Parser, Debug, Clone)]
pub struct LlmArgs {
    #[clap(long = "llm-endpoint", env = "LLM_ENDPOINT")]
    pub llm_endpoint: url::Url,
    #[clap(long = "llm-api-key", env = "LLM_API_KEY")]
    pub llm_api_key: String,
    #[clap(long = "llm-model", env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Maximum self-correction attempts when a response fails schema
    /// validation, per §6's `maxRetries`.
    #[clap(long = "max-correction-retries", env = "MAX_CORRECTION_RETRIES", default_value_t = 2)]
    pub max_correction_retries: u32,

    /// Transport-level retry count before a call is classed exhausted.
    #[clap(long = "llm-retry-count", env = "LLM_RETRY_COUNT", default_value_t = 3)]
    pub llm_retry_count: u32,
    #[clap(long = "llm-backoff-factor", env = "LLM_BACKOFF_FACTOR", default_value_t = 2.0)]
    pub llm_backoff_factor: f64,
    #[clap(
        long = "llm-initial-backoff",
        env = "LLM_INITIAL_BACKOFF",
        default_value = "250ms",
        value_parser = parse_duration,
    )]
    pub llm_initial_backoff: Duration,
    #[clap(long = "llm-breaker-threshold", env = "LLM_BREAKER_THRESHOLD", default_value_t = 5)]
    pub llm_breaker_threshold: u32,
    #[clap(
        long = "llm-breaker-cooldown",
        env = "LLM_BREAKER_COOLDOWN",
        default_value = "30s",
        value_parser = parse_duration,
    )]
    pub llm_breaker_cooldown: Duration,

    #[clap(long = "max-batch-tokens", env = "MAX_BATCH_TOKENS", default_value_t = 8_000)]
    pub max_batch_tokens: u32,
    #[clap(long = "max-input-tokens", env = "MAX_INPUT_TOKENS", default_value_t = 100_000)]
    pub max_input_tokens: usize,
    #[clap(long = "max-file-size-bytes", env = "MAX_FILE_SIZE_BYTES", default_value_t = 1_048_576)]
    pub max_file_size_bytes: u64,
}

impl LlmArgs {
    pub fn retry_config(&self) -> kg_llm::RetryConfig {
        kg_llm::RetryConfig {
            max_retries: self.llm_retry_count,
            backoff_factor: self.llm_backoff_factor,
            initial_interval: self.llm_initial_backoff,
            breaker_threshold: self.llm_breaker_threshold,
            breaker_cooldown: self.llm_breaker_cooldown,
        }
    }
}

/// Scheduling/concurrency knobs for the resident worker server, separate
/// from any one worker's own business logic.
#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Concurrent task permits; bounds how many tasks across all queues may
    /// be polled at once.
    #[clap(long = "worker-concurrency", env = "WORKER_CONCURRENCY", default_value_t = 16)]
    pub worker_concurrency: u32,

    #[clap(
        long = "dequeue-interval",
        env = "DEQUEUE_INTERVAL",
        default_value = "500ms",
        value_parser = parse_duration,
    )]
    pub dequeue_interval: Duration,

    #[clap(
        long = "heartbeat-timeout",
        env = "HEARTBEAT_TIMEOUT",
        default_value = "30s",
        value_parser = parse_duration,
    )]
    pub heartbeat_timeout: Duration,

    /// Batch size and tick interval shared by the Outbox Publisher and the
    /// Graph Ingestor's periodic pulls.
    #[clap(long = "ingestor-batch-size", env = "INGESTOR_BATCH_SIZE", default_value_t = 100)]
    pub ingestor_batch_size: i64,
    #[clap(
        long = "ingestor-interval",
        env = "INGESTOR_INTERVAL",
        default_value = "10s",
        value_parser = parse_duration,
    )]
    pub ingestor_interval: Duration,

    /// Outbox rows that fail bus submission this many times move to `DEAD`.
    #[clap(long = "outbox-max-retries", env = "OUTBOX_MAX_RETRIES", default_value_t = 5)]
    pub outbox_max_retries: i32,

    /// Job-level retries (distinct from the LLM transport retry above) for
    /// a Relationship-Resolution job before it's dead-lettered.
    #[clap(long = "job-max-retries", env = "JOB_MAX_RETRIES", default_value_t = 3)]
    pub job_max_retries: u32,

    #[clap(long = "reconciliation-threshold", env = "RECONCILIATION_THRESHOLD", default_value_t = kg_core::confidence::DEFAULT_THRESHOLD)]
    pub reconciliation_threshold: f32,
}

/// Logging options, independent of any one subcommand.
#[derive(Parser, Debug, Clone)]
pub struct LogArgs {
    #[clap(long = "log-format", env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
    #[clap(long = "log-filter", env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Top-level CLI: shared connection/logging args plus a subcommand.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Cognitive-triangulation code-knowledge-graph pipeline", long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub store: StoreArgs,
    #[clap(flatten)]
    pub log: LogArgs,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Walks a target directory, diffs it against the last recorded
    /// snapshot, and enqueues discovery events for every new or modified
    /// file (and durably records any deletes/renames for the Graph
    /// Ingestor).
    Scan {
        /// Root of the source repo to ingest.
        #[clap(long = "target", env = "TARGET_DIR")]
        target: std::path::PathBuf,
        #[clap(long = "run-id")]
        run_id: Option<uuid::Uuid>,
    },
    /// Runs the resident worker server, polling every registered queue
    /// until interrupted.
    Serve {
        #[clap(flatten)]
        llm: LlmArgs,
        #[clap(flatten)]
        server: ServerArgs,
    },
}
