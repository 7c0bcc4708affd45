//! CLI command definitions for decrypt-pool.

use crate::api::HttpApiClient;
use crate::decrypt::reference::DEFAULT_CIPHER_KEY;
use crate::decrypt::{run_stages, XorDecrypter, XorDecrypterFactory, MAX_CLIENT_COUNT};
use crate::pipeline::{DecryptionPipeline, OrphanPolicy, PipelineConfig, StatsSnapshot};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default password service location.
const DEFAULT_API_URL: &str = "http://localhost:9000";

/// Default registration identity.
const DEFAULT_IDENTITY: &str = "decrypt-pool";

/// Generational worker pool for remote password decryption.
#[derive(Parser)]
#[command(name = "decrypt-pool")]
#[command(about = "Decrypt passwords from a remote service on a bounded worker pool")]
#[command(version)]
#[command(
    long_about = "decrypt-pool registers with a password service, decrypts the passwords it hands out on a pool of cancellable workers, and reports every result back for validation.\n\nExample usage:\n  decrypt-pool run --api-url http://localhost:9000 --pool-size 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

impl Cli {
    /// Worker threads for the runtime that executes this command.
    pub fn worker_threads(&self) -> usize {
        match &self.command {
            Commands::Run(args) => args.pool_size.clamp(1, MAX_CLIENT_COUNT),
            Commands::Decrypt(_) | Commands::Encrypt(_) => 1,
        }
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Register and decrypt passwords until interrupted.
    Run(RunArgs),

    /// Decrypt a single value with the reference cipher.
    Decrypt(DecryptArgs),

    /// Encrypt a plaintext with the reference cipher.
    Encrypt(EncryptArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Base URL of the password service.
    #[arg(long, env = "DECRYPT_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Name to register under.
    #[arg(long, env = "DECRYPT_IDENTITY", default_value = DEFAULT_IDENTITY)]
    pub identity: String,

    /// Concurrent workers per generation (1 to 7).
    #[arg(short = 'n', long, env = "DECRYPT_POOL_SIZE", default_value_t = MAX_CLIENT_COUNT)]
    pub pool_size: usize,

    /// Timeout for each remote call, in seconds.
    #[arg(long, env = "DECRYPT_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Discard results left on a generation when it is reset instead of
    /// validating them.
    #[arg(long, env = "DECRYPT_DROP_ORPHANS")]
    pub drop_orphans: bool,

    /// Key byte of the reference cipher.
    #[arg(long, env = "DECRYPT_CIPHER_KEY", default_value_t = DEFAULT_CIPHER_KEY)]
    pub cipher_key: u8,

    /// Output final stats as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    fn to_config(&self) -> PipelineConfig {
        let orphan_policy = if self.drop_orphans {
            OrphanPolicy::Drop
        } else {
            OrphanPolicy::Validate
        };

        PipelineConfig::new()
            .with_api_url(&self.api_url)
            .with_identity(&self.identity)
            .with_pool_size(self.pool_size)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_orphan_policy(orphan_policy)
            .with_cipher_key(self.cipher_key)
    }
}

/// Arguments for the decrypt command.
#[derive(Parser, Debug)]
pub struct DecryptArgs {
    /// Encrypted value as handed out by the password service.
    pub value: String,

    /// Key byte of the reference cipher.
    #[arg(long, env = "DECRYPT_CIPHER_KEY", default_value_t = DEFAULT_CIPHER_KEY)]
    pub cipher_key: u8,
}

/// Arguments for the encrypt command.
#[derive(Parser, Debug)]
pub struct EncryptArgs {
    /// Plaintext to encrypt.
    pub plaintext: String,

    /// Key byte of the reference cipher.
    #[arg(long, env = "DECRYPT_CIPHER_KEY", default_value_t = DEFAULT_CIPHER_KEY)]
    pub cipher_key: u8,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the decrypt-pool CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pool_command(args).await,
        Commands::Decrypt(args) => run_decrypt_command(args).await,
        Commands::Encrypt(args) => run_encrypt_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_pool_command(args: RunArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    config.validate()?;

    let remote = Arc::new(HttpApiClient::new(&config.api_url, config.request_timeout)?);
    let factory = Arc::new(XorDecrypterFactory::new(config.cipher_key));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    info!(
        api_url = %config.api_url,
        pool_size = config.pool_size,
        orphan_policy = ?config.orphan_policy,
        "Starting decryption pool"
    );

    let pipeline = DecryptionPipeline::connect(remote, factory, &config, &shutdown).await?;
    let stats = pipeline.run(shutdown).await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&stats)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &StatsSnapshot) {
    println!("\n=== Decryption Pool Results ===");
    println!("Generations:        {}", stats.generations);
    println!("Validated:          {}", stats.validated);
    println!("Transform failures: {}", stats.transform_failures);
    println!("Requeued:           {}", stats.requeued);
    println!("Rejected:           {}", stats.rejected);
    println!("Orphans recovered:  {}", stats.orphans_recovered);
    println!("Orphans dropped:    {}", stats.orphans_dropped);
    println!("Failure rate:       {:.1}%", stats.failure_rate() * 100.0);
}

// ============================================================================
// Cipher Commands
// ============================================================================

async fn run_decrypt_command(args: DecryptArgs) -> anyhow::Result<()> {
    let decrypter = XorDecrypter::new("cli", args.cipher_key);
    let plaintext = run_stages(&decrypter, &args.value).await?;
    println!("{plaintext}");
    Ok(())
}

fn run_encrypt_command(args: EncryptArgs) -> anyhow::Result<()> {
    let decrypter = XorDecrypter::new("cli", args.cipher_key);
    println!("{}", decrypter.encrypt(&args.plaintext));
    Ok(())
}
