use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::{Args, ValueEnum};
use reservation_trust::error::AppError;
use reservation_trust::trust::domain::{
    Actor, ConsumerId, EstablishmentId, ReservationId, ReservationSnapshot, ReservationStatus,
    SanctionType, ScoringEventKind,
};
use reservation_trust::trust::{
    AuditSink, AuditTrail, CsvAuditSink, DisputeResponse, MemoryAuditSink, MemoryStore,
    NoShowDeclaration, SanctionRequest, ScoringEventRequest, TrustPolicy, TrustService,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Run a single scenario instead of all four.
    #[arg(long, value_enum)]
    pub(crate) scenario: Option<DemoScenario>,
    /// Append the demo's audit entries to this CSV file.
    #[arg(long)]
    pub(crate) audit_csv: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoScenario {
    /// Three consecutive no-shows suspend a consumer.
    Suspension,
    /// A contested no-show is resolved in the consumer's favour.
    Reversal,
    /// Three false declarations deactivate an establishment.
    Deactivation,
    /// An admin lifts a deactivation early.
    EarlyLift,
}

impl DemoScenario {
    const ALL: [DemoScenario; 4] = [
        DemoScenario::Suspension,
        DemoScenario::Reversal,
        DemoScenario::Deactivation,
        DemoScenario::EarlyLift,
    ];
}

struct DemoContext {
    service: TrustService<MemoryStore>,
    now: DateTime<Utc>,
    admin: Actor,
    lifecycle: Actor,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let sink: Arc<dyn AuditSink> = match &args.audit_csv {
        Some(path) => Arc::new(CsvAuditSink::new(path.clone())),
        None => Arc::new(MemoryAuditSink::new()),
    };
    let audit = Arc::new(AuditTrail::new(sink, 50));
    let now = Utc
        .with_ymd_and_hms(2025, 6, 1, 20, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let context = DemoContext {
        service: TrustService::new(Arc::new(MemoryStore::new()), audit, TrustPolicy::default()),
        now,
        admin: Actor::new("admin-demo"),
        lifecycle: Actor::system("reservation-lifecycle"),
    };

    let scenarios = match args.scenario {
        Some(scenario) => vec![scenario],
        None => DemoScenario::ALL.to_vec(),
    };

    println!("Reservation trust engine demo ({})", now.to_rfc3339());
    for scenario in scenarios {
        println!();
        match scenario {
            DemoScenario::Suspension => suspension(&context)?,
            DemoScenario::Reversal => reversal(&context)?,
            DemoScenario::Deactivation => deactivation(&context)?,
            DemoScenario::EarlyLift => early_lift(&context)?,
        }
    }

    if let Some(path) = &args.audit_csv {
        println!();
        println!("Audit entries appended to {}", path.display());
    }
    Ok(())
}

fn suspension(context: &DemoContext) -> Result<(), AppError> {
    println!("== Consumer suspension after repeated no-shows");
    let consumer = ConsumerId::from("demo-consumer-1");
    for reservation in ["demo-r-101", "demo-r-102", "demo-r-103"] {
        let view = context.service.apply_event(
            &context.lifecycle,
            &ScoringEventRequest {
                consumer_id: consumer.clone(),
                reservation_id: ReservationId::from(reservation),
                kind: ScoringEventKind::NoShow,
            },
            context.now,
        )?;
        println!(
            "  no-show on {reservation}: score {} ({}, {} stars)",
            view.profile.score,
            view.level.label(),
            view.stars
        );
    }

    let gate = context.service.can_book(&consumer, context.now)?;
    println!(
        "  can book: {} ({})",
        gate.allowed,
        gate.message.unwrap_or("no restriction")
    );
    Ok(())
}

fn reversal(context: &DemoContext) -> Result<(), AppError> {
    println!("== Contested no-show resolved for the consumer");
    let consumer = "demo-consumer-2";
    let outcome = contest(context, "demo-est-oyster", consumer, "demo-r-201")?;
    let view = context.service.profile(&ConsumerId::from(consumer))?;
    let trust = context
        .service
        .trust_score(&EstablishmentId::from("demo-est-oyster"))?;
    println!(
        "  decision {}: consumer score {}, establishment trust {}",
        outcome.decision.label(),
        view.profile.score,
        trust.trust_score
    );
    Ok(())
}

fn deactivation(context: &DemoContext) -> Result<(), AppError> {
    println!("== Establishment deactivated after false declarations");
    let establishment = EstablishmentId::from("demo-est-lantern");
    for index in 1..=3 {
        let outcome = contest(
            context,
            establishment.as_str(),
            &format!("demo-consumer-3{index}"),
            &format!("demo-r-30{index}"),
        )?;
        println!(
            "  dispute {} resolved, sanction applied: {}",
            outcome.dispute_id, outcome.sanction_applied
        );
    }

    let visibility = context.service.visibility(&establishment, context.now)?;
    println!(
        "  listed: {}, sanction: {}, until: {}",
        visibility.listed,
        visibility.current_sanction.label(),
        visibility
            .deactivated_until
            .map(|until| until.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}

fn early_lift(context: &DemoContext) -> Result<(), AppError> {
    println!("== Deactivation lifted early by an admin");
    let establishment = EstablishmentId::from("demo-est-harbor");
    let sanction = context.service.impose_sanction(
        &context.admin,
        &SanctionRequest {
            establishment_id: establishment.clone(),
            sanction_type: SanctionType::Deactivation30d,
            reason: "manual review of repeated complaints".to_string(),
            related_dispute_id: None,
        },
        context.now,
    )?;
    println!(
        "  imposed {} until {}",
        sanction.sanction_type.label(),
        sanction.deactivation_end.to_rfc3339()
    );

    let later = context.now + Duration::days(3);
    context
        .service
        .lift_sanction(&context.admin, &sanction.id, "appeal upheld", later)?;
    let visibility = context.service.visibility(&establishment, later)?;
    println!("  lifted after 3 days, listed: {}", visibility.listed);

    match context
        .service
        .lift_sanction(&context.admin, &sanction.id, "second attempt", later)
    {
        Ok(_) => println!("  second lift unexpectedly succeeded"),
        Err(err) => println!("  second lift rejected: {err}"),
    }
    Ok(())
}

fn contest(
    context: &DemoContext,
    establishment: &str,
    consumer: &str,
    reservation: &str,
) -> Result<reservation_trust::trust::ArbitrationOutcome, AppError> {
    let declared = context.service.declare_no_show(
        &context.lifecycle,
        &NoShowDeclaration {
            establishment_id: EstablishmentId::from(establishment),
            reservation: ReservationSnapshot {
                reservation_id: ReservationId::from(reservation),
                consumer_id: ConsumerId::from(consumer),
                establishment_id: EstablishmentId::from(establishment),
                starts_at: context.now - Duration::hours(2),
                status: ReservationStatus::Completed,
                checked_in_at: None,
                cancelled_at: None,
            },
            evidence: vec!["host-stand-log.txt".to_string()],
        },
        context.now,
    )?;

    context.service.respond_to_dispute(
        &Actor::new(format!("consumer:{consumer}")),
        &declared.dispute.id,
        &DisputeResponse {
            consumer_id: ConsumerId::from(consumer),
            response: "We were seated and paid the bill".to_string(),
            evidence: vec!["receipt.jpg".to_string()],
        },
        context.now,
    )?;

    Ok(context.service.arbitrate(
        &context.admin,
        &declared.dispute.id,
        "favor_client",
        Some("payment record confirms attendance".to_string()),
        context.now,
    )?)
}
