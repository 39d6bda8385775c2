/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    Router,
    routing::post,
};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tokio::sync::RwLock;

use hesaty::{config, inter};

static DEFAULT_CONFIG_PATH: &str = "hesaty.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("hesaty")
        .build();
    TermLogger::init(
        hesaty::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .or_else(|| std::env::var("HESATY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());

    let glob = match config::load_configuration(&config_path).await {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Unable to load configuration from {:?}: {}", &config_path, &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let app = Router::new()
        .route("/api/admin", post(inter::admin::api))
        .route("/api/teacher", post(inter::teacher::api))
        .route("/api/student", post(inter::student::api))
        .route("/api/parent", post(inter::parent::api))
        .layer(middleware::from_fn(inter::request_identity))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
