//! retooter - reblog Mastodon posts that mention an account

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use libretooter::logging::{LogFormat, LoggingConfig};
use libretooter::platforms::mastodon::MastodonConnector;
use libretooter::{
    authenticate, AuthOutcome, Configuration, Credentials, Environment, Result, Retooter,
    RunSummary, StdinPrompt, Watermark,
};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "retooter")]
#[command(version)]
#[command(about = "Reblog Mastodon posts that mention an account")]
#[command(long_about = "\
retooter - reblog Mastodon posts that mention an account

DESCRIPTION:
    Fetches the notifications mentioning RETOOTER_ACCOUNT_NAME, and reblogs
    every post written by one of RETOOTER_ALLOWED_ACCOUNTS that the account
    has not reblogged yet. The highest processed status ID is kept in a
    since_id file, so runs can be scheduled as often as needed.

    Without CLIENT_ID, CLIENT_SECRET and ACCESS_TOKEN, retooter registers a new
    application, asks for an authorization code, prints the new credentials and
    exits without reblogging. This does not happen when GITHUB_ACTIONS is set.

ENVIRONMENT:
    RETOOTER_ACCOUNT_NAME      account to act as, user@domain (required)
    RETOOTER_ALLOWED_ACCOUNTS  newline-separated handles to reblog (required)
    RETOOTER_API_BASE_URL      API base URL (default: https://domain)
    RETOOTER_DRY_RUN           true/t/yes/y to only log what would be reblogged
    CLIENT_ID, CLIENT_SECRET, ACCESS_TOKEN  API credentials

EXIT CODES:
    0  - Success, or new credentials printed
    27 - Any error
")]
struct Cli {
    /// Log intended reblogs without performing them
    #[arg(long)]
    dry_run: bool,

    /// File holding the since_id watermark
    #[arg(long, value_name = "PATH", default_value = libretooter::watermark::SINCE_ID_FILE)]
    since_id_file: PathBuf,

    /// Fail instead of prompting when credentials are missing
    #[arg(long)]
    non_interactive: bool,

    /// Output format for the run summary
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log format (text, json or pretty)
    #[arg(long, env = "RETOOTER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        if e.needs_operator() {
            eprintln!("Fix the environment described in `retooter --help` and run again.");
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env = Environment::from_process()?;
    let mut config = Configuration::resolve(&env)?;
    config.dry_run |= cli.dry_run;

    let interactive = !(config.ci || cli.non_interactive);
    let credentials = Credentials::resolve(&env);

    let instance =
        match authenticate(&config, credentials, &MastodonConnector, &StdinPrompt, interactive)
            .await?
        {
            AuthOutcome::Authenticated(instance) => instance,
            AuthOutcome::Bootstrapped(credentials) => {
                print_new_credentials(&credentials);
                return Ok(());
            }
        };

    let watermark = Watermark::load(&cli.since_id_file)?;
    let mut retooter = Retooter::new(config, instance, watermark);
    let summary = retooter.repost_mentions().await?;

    print_summary(&summary, cli.format);
    Ok(())
}

fn print_new_credentials(credentials: &Credentials) {
    println!();
    println!("You find the new secrets below. Define them in the environment");
    println!("(for example as GitHub Actions secrets) before the next run.");
    println!();
    println!("{}", credentials.to_env_lines());
}

fn print_summary(summary: &RunSummary, format: OutputFormat) {
    if format == OutputFormat::Json {
        match serde_json::to_string(summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize run summary: {}", e),
        }
        return;
    }

    println!(
        "{} mention(s), {} reblogged, {} already reblogged, {} not allowed, since_id {}",
        summary.mentions,
        summary.reblogged.len(),
        summary.already_reblogged,
        summary.not_allowed,
        summary
            .since_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unset".to_string()),
    );
    if !summary.would_reblog.is_empty() {
        println!("Dry run, would have reblogged: {:?}", summary.would_reblog);
    }
}
