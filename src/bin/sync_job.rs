//! One-shot sync of every recruitment list, meant for cron style scheduling.

use std::sync::Arc;

use colored::*;
use sqlx::postgres::PgPoolOptions;

use recruitment_lists::core::{
    get_subscriber, init_subscriber, AppConfig, DisabledNotifier, EmailService, NotificationSender,
};
use recruitment_lists::db::PgRecruitmentListDb;
use recruitment_lists::jobs::list_sync::run_sync_for_all_lists;
use recruitment_lists::study::HttpStudyService;
use recruitment_lists::sync::SyncService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber(
        "recruitment_list_sync_job".into(),
        "info".into(),
        std::io::stdout,
    );
    init_subscriber(subscriber)?;

    let config = AppConfig::new()?;

    let pg_pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_lazy_with(config.postgres.connect());

    let notifier: Arc<dyn NotificationSender> = match config.smtp.clone() {
        Some(smtp) => Arc::new(EmailService::new(smtp)),
        None => Arc::new(DisabledNotifier),
    };

    let service = SyncService::new(
        Arc::new(PgRecruitmentListDb::new(pg_pool)),
        Arc::new(HttpStudyService::new(&config.study_service)?),
        notifier,
        config.sync.settings(),
    );

    let report = run_sync_for_all_lists(&service).await?;

    println!("{}", "-----------------------------------------".green());
    println!(
        "synced {} lists, {} participant sync failures, {} data sync failures",
        report.lists, report.participant_sync_failures, report.data_sync_failures
    );
    println!("{}", "-----------------------------------------".green());
    Ok(())
}
