use clap::{Args, Parser, Subcommand};
use redash_mailer::config::{ConfigBuilder, EventFields, EventPayload};
use redash_mailer::mail::SmtpMailer;
use redash_mailer::redash::RedashClient;
use redash_mailer::report::{self, RunOutcome, SkipReason};
use tracing::{debug, error};

/// Send the results of a saved Redash query as CSV email reports
#[derive(Parser)]
#[command(name = "redash-mailer")]
#[command(about = "Send Redash query results via email", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a report, taking settings from options and the environment
    Send(SendArgs),
    /// Send a report described by a structured JSON payload
    Event {
        /// Path to the JSON payload, or '-' to read it from stdin
        #[arg(long)]
        payload: String,
    },
}

#[derive(Args)]
struct SendArgs {
    /// Label for this run, used only in logs
    #[arg(long)]
    event_name: Option<String>,

    /// Base URL of the Redash instance (env: REDASH_DOMAIN)
    #[arg(long)]
    domain: Option<String>,

    /// Redash query ID (env: REDASH_QUERY_ID)
    #[arg(long)]
    query_id: Option<String>,

    /// API key for the query's results (env: REDASH_QUERY_KEY)
    #[arg(long)]
    query_key: Option<String>,

    /// Recipient address(es), comma separated, or the name of a column
    /// containing recipient addresses (env: TO_ADDRESS)
    #[arg(long = "to")]
    to_address: Option<String>,

    /// Sender address (env: FROM_ADDRESS)
    #[arg(long = "from")]
    from_address: Option<String>,

    /// Email subject (env: EMAIL_SUBJECT)
    #[arg(long)]
    subject: Option<String>,

    /// Email body (env: EMAIL_BODY)
    #[arg(long)]
    body: Option<String>,

    /// SMTP relay host (env: SMTP_HOST)
    #[arg(long)]
    smtp_host: Option<String>,

    /// SMTP relay port (env: SMTP_PORT)
    #[arg(long)]
    smtp_port: Option<u16>,

    /// SMTP login (env: SMTP_LOGIN)
    #[arg(long)]
    smtp_login: Option<String>,

    /// SMTP password (env: SMTP_PASSWORD)
    #[arg(long)]
    smtp_password: Option<String>,

    /// Send an email even when the query returned no rows
    #[arg(long, value_name = "BOOL")]
    send_on_empty: Option<bool>,

    /// Send only when the query returned no rows (alert-style jobs)
    #[arg(long, value_name = "BOOL")]
    send_only_on_empty: Option<bool>,

    /// Append a "no data" note to the body when there is no attachment
    #[arg(long, value_name = "BOOL")]
    append_empty_note: Option<bool>,

    /// Timeout in seconds for the fetch and the SMTP session
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl From<SendArgs> for EventFields {
    fn from(args: SendArgs) -> Self {
        EventFields {
            event_name: args.event_name,
            domain: args.domain,
            query_id: args.query_id,
            query_key: args.query_key,
            to_address: args.to_address,
            from_address: args.from_address,
            subject: args.subject,
            body: args.body,
            smtp_host: args.smtp_host,
            smtp_port: args.smtp_port,
            smtp_login: args.smtp_login,
            smtp_password: args.smtp_password,
            send_on_empty: args.send_on_empty,
            send_only_on_empty: args.send_only_on_empty,
            append_empty_note: args.append_empty_note,
            timeout_secs: args.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("redash-mailer started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Send(args) => run_with_fields(args.into()).await,
        Commands::Event { payload } => run_event(&payload).await,
    };

    match result {
        Ok(RunOutcome::Sent { messages }) => {
            println!("Sent {messages} message(s)");
        }
        Ok(RunOutcome::Skipped(SkipReason::EmptyResult)) => {
            println!("Skipped: query returned no rows and send_on_empty is off");
        }
        Ok(RunOutcome::Skipped(SkipReason::NonEmptyResult)) => {
            println!("Skipped: query returned rows and send_only_on_empty is on");
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_event(payload: &str) -> anyhow::Result<RunOutcome> {
    let raw = if payload == "-" {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(payload)?
    };
    let parsed = EventPayload::from_json(&raw)?;
    run_with_fields(parsed.into_fields()).await
}

async fn run_with_fields(fields: EventFields) -> anyhow::Result<RunOutcome> {
    let config = ConfigBuilder::from_env().merge(fields).build()?;
    let query = RedashClient::new(&config.domain, &config.query_key, config.timeout())?;
    let mailer = SmtpMailer::new(
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_login,
        &config.smtp_password,
        config.timeout(),
    )?;
    Ok(report::run(&config, &query, &mailer).await?)
}
