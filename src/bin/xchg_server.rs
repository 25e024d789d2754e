use std::env;
use std::sync::Mutex;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

use xchg::config::ServerConfig;
use xchg::http::server::*;
use xchg::http::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        anyhow::bail!("usage: xchg_server [address] [port] [config.json]");
    }

    let address: String = args[1].clone();
    let port: u16 = args[2]
        .parse()
        .with_context(|| format!("invalid port {:?}", args[2]))?;
    let config = ServerConfig::from_file(&args[3])?;

    let datasets = config.load_datasets()?;
    let app_state = AppState::create(datasets, config.exchange);
    let xchg_state = web::Data::new(Mutex::new(app_state));

    HttpServer::new(move || {
        App::new()
            .app_data(xchg_state.clone())
            .service(init)
            .service(info)
            .service(state)
            .service(advance)
            .service(buy)
            .service(sell)
            .service(rebalance)
    })
    .bind((address, port))?
    .run()
    .await?;
    Ok(())
}
