use std::sync::Arc;

use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use searchdock::{build_auth, configure_app, AppState, Opt};
use searchdock_indexer::{Scheduler, DEFAULT_TICK};
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::try_build()?;
    setup_logs(&opt)?;
    searchdock_types::error::include_inner_error(opt.is_development());

    let state = Data::new(AppState::new(&opt)?);
    let auth = build_auth(&opt);

    let scheduler = opt
        .indexer_enable_scheduler
        .then(|| Scheduler::start(Arc::clone(&state.runtime), DEFAULT_TICK));

    info!(
        addr = %opt.http_addr,
        data_directory = %opt.data_directory.display(),
        env = %opt.env,
        "searchdock is listening"
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(auth.clone())
            .configure(configure_app)
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
    })
    .disable_signals()
    .bind(&opt.http_addr)?;

    let server = server.run();
    let handle = server.handle();
    tokio::pin!(server);

    tokio::select! {
        outcome = &mut server => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            handle.stop(true).await;
            (&mut server).await?;
        }
    }

    // let running indexers wind down before the process exits
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    Ok(())
}

fn setup_logs(opt: &Opt) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&opt.log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
