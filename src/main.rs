use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cattle_id::classifier::OnnxClassifier;
use cattle_id::config::Config;
use cattle_id::handlers;
use cattle_id::localizer::GeminiLocalizer;
use cattle_id::pipeline::Pipeline;
use cattle_id::registry::Registry;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,cattle_id=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::parse();
    init_tracing(config.log_json);

    config.validate().context("invalid configuration")?;

    let registry = Registry::load(&config.registry).context("loading registration table")?;
    let classifier = OnnxClassifier::load(
        &config.classifier_model,
        &config.class_labels,
        config.input_size,
        config.input_layout,
    )
    .context("loading identity classifier")?;
    let localizer = GeminiLocalizer::new(config.gemini()).context("building vision model client")?;

    if let Some(dir) = &config.crop_dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating crop dump directory {}", dir.display()))?;
    }

    let pipeline = web::Data::new(Pipeline::new(
        Arc::new(localizer),
        Arc::new(classifier),
        Arc::new(registry),
        config.pipeline_settings(),
    ));

    let address = config.server_address();
    tracing::info!("Server running at http://{}", address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(pipeline.clone())
            .configure(handlers::configure)
    })
    .bind(&address)
    .with_context(|| format!("binding {}", address))?
    .run()
    .await?;

    Ok(())
}
