use clap::Parser;

/// Process configuration.
///
/// Every option may be supplied as a flag or through the equivalently-named
/// environment variable; flags win.
#[derive(Clone, Debug, Parser)]
#[command(name = "traceflowd", about = "Traceflow span collector", version)]
pub struct Config {
    /// HTTP server port.
    #[arg(long, env = "PORT", default_value_t = 9090)]
    pub port: u16,

    /// Number of span-processing worker tasks.
    #[arg(long, env = "WORKERS", default_value_t = 10)]
    pub workers: usize,

    /// Span queue capacity.
    #[arg(long, env = "BUFFER_SIZE", default_value_t = 1000)]
    pub buffer_size: usize,

    /// Maximum number of traces to keep in memory.
    #[arg(long, env = "MAX_TRACES", default_value_t = 10_000)]
    pub max_traces: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
