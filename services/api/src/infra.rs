use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation_trust::config::{AppConfig, AuditConfig};
use reservation_trust::error::AppError;
use reservation_trust::trust::{
    trust_router, AuditSink, AuditTrail, CsvAuditSink, LedgerVerification, MemoryAuditSink,
    MemoryStore, SqliteStore, SweepReport, TrustApi, TrustError, TrustService, TrustStore,
};
use reservation_trust::trust::domain::ConsumerId;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Trust service bound to whichever store the configuration selects.
pub(crate) enum TrustBackend {
    Memory(Arc<TrustService<MemoryStore>>),
    Sqlite(Arc<TrustService<SqliteStore>>),
}

impl TrustBackend {
    pub(crate) fn bootstrap(config: &AppConfig) -> Result<Self, AppError> {
        let audit = Arc::new(AuditTrail::new(
            audit_sink(&config.audit),
            config.audit.backlog_alert,
        ));

        let backend = match &config.storage.database_path {
            Some(path) => {
                let store = SqliteStore::open(path, config.storage.busy_timeout)?;
                info!(path = %path.display(), "trust store opened");
                Self::Sqlite(Arc::new(TrustService::new(
                    Arc::new(store),
                    audit,
                    config.policy.clone(),
                )))
            }
            None => {
                warn!("TRUST_DATABASE_PATH not set; trust state will not survive a restart");
                Self::Memory(Arc::new(TrustService::new(
                    Arc::new(MemoryStore::new()),
                    audit,
                    config.policy.clone(),
                )))
            }
        };
        Ok(backend)
    }

    pub(crate) fn router(&self, admin_token: Option<String>) -> axum::Router {
        match self {
            Self::Memory(service) => trust_router(TrustApi::new(service.clone(), admin_token)),
            Self::Sqlite(service) => trust_router(TrustApi::new(service.clone(), admin_token)),
        }
    }

    pub(crate) fn run_sweeps(&self, now: DateTime<Utc>) -> Result<SweepReport, TrustError> {
        match self {
            Self::Memory(service) => service.run_sweeps(now),
            Self::Sqlite(service) => service.run_sweeps(now),
        }
    }

    pub(crate) fn verify_ledger(
        &self,
        consumer: &ConsumerId,
    ) -> Result<LedgerVerification, TrustError> {
        match self {
            Self::Memory(service) => service.verify_ledger(consumer),
            Self::Sqlite(service) => service.verify_ledger(consumer),
        }
    }

    pub(crate) fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        match self {
            Self::Memory(service) => tokio::spawn(sweep_loop(service.clone(), interval)),
            Self::Sqlite(service) => tokio::spawn(sweep_loop(service.clone(), interval)),
        }
    }
}

fn audit_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    match &config.csv_path {
        Some(path) => {
            info!(path = %path.display(), "audit entries appended to csv");
            Arc::new(CsvAuditSink::new(path.clone()))
        }
        None => {
            warn!("TRUST_AUDIT_CSV_PATH not set; audit entries kept in memory only");
            Arc::new(MemoryAuditSink::new())
        }
    }
}

async fn sweep_loop<S>(service: Arc<TrustService<S>>, interval: Duration)
where
    S: TrustStore + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip it so startup is not a sweep.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let service = service.clone();
        match tokio::task::spawn_blocking(move || service.run_sweeps(Utc::now())).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!(error = %err, "maintenance sweep failed"),
            Err(err) => warn!(error = %err, "maintenance sweep task aborted"),
        }
    }
}
