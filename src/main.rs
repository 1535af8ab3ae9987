use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use visit_planner::config;
use visit_planner::middleware::auth::Authentication;
use visit_planner::relay::FlowRelay;
use visit_planner::routes::{self, ApiDoc};
use visit_planner::{AppConfig, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(config::log_json_enabled());
    let app_config = Arc::new(AppConfig::from_env()?);

    let relay = FlowRelay::new(&app_config).context("failed to build chat relay client")?;
    let app_state = Arc::new(
        AppState::new(app_config.clone(), Arc::new(relay))
            .await
            .context("failed to open stores")?,
    );

    info!("Listening on {}", app_config.bind_address);
    let bind_address = app_config.bind_address.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Authentication {
                app_config: app_config.clone(),
            })
            .wrap(Logger::default())
            .app_data(web::Data::new(app_state.clone()))
            .service(Scalar::with_url("/scalar", ApiDoc::openapi()))
            .configure(routes::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .run()
    .await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
