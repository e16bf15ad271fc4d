//! Module: Main
//! But: Command-line driver for the connection key-pair pool.
//!
//! *Signed: kryon.kas*

use std::time::Duration;

use clap::Parser;
use hd_keypool::{
    DerivationJob, FailurePolicy, KeyPair, PathTemplate, PoolConfig, SeedMaterial,
    generate_partitioned, generate_pool_with, generate_random_mnemonic,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// --- Configuration ---

/// HD connection key-pair pool generator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// BIP-39 mnemonic. Takes precedence over --private-key.
    #[arg(short, long, env = "KEYPOOL_MNEMONIC", hide_env_values = true)]
    mnemonic: Option<String>,

    /// Raw seed as hex (16 to 64 bytes).
    #[arg(short, long, env = "KEYPOOL_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Mnemonic word count when generating a random seed: 12 or 24.
    #[arg(short, long, default_value_t = 24)]
    words: usize,

    /// Number of pairs in bulk mode.
    #[arg(short, long, default_value_t = hd_keypool::DEFAULT_POOL_SIZE)]
    count: u32,

    /// Use the partitioned worker pool instead of a bulk pool.
    #[arg(long, default_value_t = false)]
    partitioned: bool,

    /// Connections already holding a key pair (partitioned mode).
    #[arg(long, default_value_t = 0)]
    connections_count: u32,

    /// Unused key pairs still available (partitioned mode).
    #[arg(long, default_value_t = 0)]
    key_pair_count: u32,

    /// Last generated index; negative starts from scratch (partitioned mode).
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    resume_from: i64,

    /// Worker count (partitioned mode).
    #[arg(long, default_value_t = hd_keypool::config::DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Retries per failed slice. 0 aborts on the first failure.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Per-worker timeout in seconds. 0 waits forever.
    #[arg(long, default_value_t = 120)]
    job_timeout_secs: u64,

    /// Derivation path template.
    #[arg(long, default_value = hd_keypool::DEFAULT_PATH_TEMPLATE)]
    template: String,

    /// Number of threads for bulk mode.
    /// Défaut: All logical cores.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Print the pool as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Debug logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// --- Utilitaires ---

/// Installs the stderr subscriber. False if one was already installed.
fn init_logging(verbose: bool) -> bool {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: logging not initialized: {e}");
        return false;
    }
    true
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn print_pool(pairs: &[KeyPair], json: bool) {
    if json {
        match serde_json::to_string_pretty(pairs) {
            Ok(out) => println!("{out}"),
            Err(e) => fail(e),
        }
        return;
    }

    for pair in pairs {
        println!("{:>6}  A={}  Ad={}", pair.conn_index, pair.primary_hex(), pair.secondary_hex());
    }
}

// --- Exécution ---

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    // Configuration du ThreadPool
    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            fail(format!("failed to build thread pool: {e}"));
        }
    }

    let template = PathTemplate::parse(&args.template).unwrap_or_else(|e| fail(e));

    // Sans graine: generate one and show it, it is the only backup
    let seed = if args.mnemonic.is_none() && args.private_key.is_none() {
        let mnemonic = generate_random_mnemonic(args.words).unwrap_or_else(|e| fail(e));
        eprintln!("Mnemonic: {mnemonic}");
        SeedMaterial::from_mnemonic(&mnemonic.to_string())
    } else {
        SeedMaterial::new(args.mnemonic.as_deref(), args.private_key.as_deref())
    };

    let result = if args.partitioned {
        let failure_policy = match args.retries {
            0 => FailurePolicy::Abort,
            max_retries => FailurePolicy::Retry { max_retries },
        };
        let job_timeout = (args.job_timeout_secs > 0).then(|| Duration::from_secs(args.job_timeout_secs));
        let config = PoolConfig::default()
            .with_worker_count(args.workers)
            .with_path_template(template)
            .with_job_timeout(job_timeout)
            .with_failure_policy(failure_policy);

        let job = DerivationJob::new(seed, args.connections_count)
            .with_available(args.key_pair_count)
            .with_resume_index(args.resume_from);

        generate_partitioned(&job, &config)
    } else {
        generate_pool_with(&seed, args.count, &template)
    };

    match result {
        Ok(pairs) => print_pool(&pairs, args.json),
        Err(e) => fail(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_reports_second_install() {
        assert!(init_logging(false));
        // Global subscriber is already set, warns instead of silently ignoring
        assert!(!init_logging(true));
    }

    #[test]
    fn test_args_parse_partitioned_job() {
        let args = Args::parse_from([
            "hd-keypool",
            "--partitioned",
            "--connections-count",
            "12",
            "--resume-from",
            "-1",
        ]);
        assert!(args.partitioned);
        assert_eq!(args.connections_count, 12);
        assert_eq!(args.resume_from, -1);
        assert_eq!(args.workers, 5);
    }
}
