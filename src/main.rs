use std::fmt::{Debug, Display};

use recruitment_lists::core::{get_subscriber, init_subscriber, AppConfig};
use recruitment_lists::recruitment_list_server::RecruitmentListServer;
use tokio::task::JoinError;

use colored::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let file_appender =
        tracing_appender::rolling::daily("/var/tmp/log/recruitment_lists", "app");

    let subscriber = get_subscriber("recruitment_lists".into(), "info".into(), file_appender);
    init_subscriber(subscriber)?;

    let config = AppConfig::new()?;

    let server = RecruitmentListServer::build(config.clone()).await?;
    let port = server.port();

    let server_task = tokio::spawn(server.run_until_stopped());

    println!("{}", "-----------------------------------------".green());
    println!(
        "🚀 Server started on Addr: {}:{}",
        config.recruitment_list_server_config.host, port
    );
    println!("{}", "-----------------------------------------".green());

    tokio::select! {
        o = server_task => {report_exit("API", o);}
    }
    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{} has exited", task_name)
        }
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} failed",
                task_name
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{}' task failed to complete",
                task_name
            )
        }
    }
}
