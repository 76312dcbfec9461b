use crate::demo::{run_demo, DemoArgs};
use crate::infra::TrustBackend;
use crate::server;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use reservation_trust::config::AppConfig;
use reservation_trust::error::AppError;
use reservation_trust::telemetry;
use reservation_trust::trust::domain::ConsumerId;

#[derive(Parser, Debug)]
#[command(
    name = "Reservation Trust Engine",
    about = "Run and operate the reservation trust and sanctions engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one maintenance sweep (dispute escalation, sanction expiry, audit redelivery)
    Sweep,
    /// Replay a consumer's scoring ledger and compare it with the stored profile
    VerifyLedger(VerifyLedgerArgs),
    /// Walk through the reliability, arbitration, and sanction scenarios in memory
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct VerifyLedgerArgs {
    /// Consumer whose ledger should be replayed
    #[arg(long)]
    pub(crate) consumer: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sweep => run_sweep(),
        Command::VerifyLedger(args) => run_verify_ledger(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn operator_backend() -> Result<TrustBackend, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    TrustBackend::bootstrap(&config)
}

fn run_sweep() -> Result<(), AppError> {
    let backend = operator_backend()?;
    let report = backend.run_sweeps(Utc::now())?;

    println!("Maintenance sweep");
    println!("  escalated disputes : {}", report.escalated_disputes);
    println!("  expired sanctions  : {}", report.expired_sanctions);
    println!("  audit redelivered  : {}", report.audit_redelivered);
    println!("  audit backlog      : {}", report.audit_backlog);
    Ok(())
}

fn run_verify_ledger(args: VerifyLedgerArgs) -> Result<(), AppError> {
    let backend = operator_backend()?;
    let consumer = ConsumerId::from(args.consumer.as_str());
    let verification = backend.verify_ledger(&consumer)?;

    println!("Ledger verification for {}", verification.consumer_id);
    println!("  events         : {}", verification.event_count);
    println!("  stored score   : {}", verification.stored_score);
    println!("  replayed score : {}", verification.replayed_score);
    println!(
        "  status         : {}",
        if verification.consistent {
            "consistent"
        } else {
            "MISMATCH"
        }
    );
    Ok(())
}
