use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{dev::Server, web::Data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::core::config::JwtAuthConfig;
use crate::core::{AppConfig, DisabledNotifier, EmailService, NotificationSender};
use crate::db::PgRecruitmentListDb;
use crate::jobs::list_sync::start_list_sync_job;
use crate::routes::recruitment_list_api_routes;
use crate::study::HttpStudyService;
use crate::sync::SyncService;

pub struct RecruitmentListServer {
    port: u16,
    server: Server,
}

impl RecruitmentListServer {
    pub async fn build(configuration: AppConfig) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            configuration.recruitment_list_server_config.host,
            configuration.recruitment_list_server_config.port
        );

        let pg_pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy_with(configuration.postgres.connect());

        let study_service = HttpStudyService::new(&configuration.study_service)?;

        let notifier: Arc<dyn NotificationSender> = match configuration.smtp.clone() {
            Some(smtp) => Arc::new(EmailService::new(smtp)),
            None => {
                tracing::warn!("smtp is not configured, notifications are disabled");
                Arc::new(DisabledNotifier)
            }
        };

        let service = SyncService::new(
            Arc::new(PgRecruitmentListDb::new(pg_pool)),
            Arc::new(study_service),
            notifier,
            configuration.sync.settings(),
        );

        start_list_sync_job(service.clone(), configuration.sync.job_interval_secs);

        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, service, configuration.jwt_auth_config)?;

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    service: SyncService,
    jwt_auth_config: JwtAuthConfig,
) -> Result<Server, anyhow::Error> {
    let service = Data::new(service);
    let jwt_auth_config = Data::new(jwt_auth_config);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
            ])
            .supports_credentials();
        App::new()
            .wrap(TracingLogger::default())
            .configure(recruitment_list_api_routes)
            .app_data(service.clone())
            .app_data(jwt_auth_config.clone())
            .wrap(cors)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
