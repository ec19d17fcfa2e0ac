use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use nutrilens::api::middleware::ApiKeyAuth;
use nutrilens::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use nutrilens::config::AppConfig;
use nutrilens::conversation::Orchestrator;
use nutrilens::llm::ProviderFactory;
use nutrilens::session::SessionStore;
use nutrilens::tools::{IngredientKb, OpenFoodFactsClient};
use std::sync::Arc;
use tracing::{error, info};

async fn index() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "NutriLens food decision-support API",
        "status": "running",
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        run_cli(cli.command, cli.config).await;
        return Ok(());
    }

    info!("Starting NutriLens server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let provider = match ProviderFactory::create_default(&config) {
        Some(p) => p,
        None => {
            error!("Failed to initialize reasoning provider from config");
            std::process::exit(1);
        }
    };

    let store = Arc::new(SessionStore::new());
    let kb = Arc::new(IngredientKb::load());
    let off = Arc::new(OpenFoodFactsClient::new(&config.openfoodfacts));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        provider,
        kb.clone(),
        off.clone(),
        config.chat.clone(),
    ));

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(kb.clone()))
            .app_data(web::Data::new(off.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .route("/", web::get().to(index))
            .wrap(ApiKeyAuth)
            .configure(nutrilens::api::routes::configure)
            .configure(nutrilens::api::websocket::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
