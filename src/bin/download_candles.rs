use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use log::info;

use xchg::input::candles::write_candles;
use xchg::source::binance::{fetch_daily_klines, parse_day};

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        anyhow::bail!("usage: download_candles [data_dir] [YYYY-MM-DD] [interval] [SYMBOL]...");
    }

    let data_dir = PathBuf::from(&args[1]);
    let day = parse_day(&args[2])?;
    let interval = &args[3];

    fs::create_dir_all(&data_dir)?;
    for symbol in &args[4..] {
        let candles = fetch_daily_klines(symbol, interval, day)?;
        let path = data_dir.join(format!("{}.csv", symbol));
        write_candles(&path, &candles)?;
        info!("Wrote {:?} candles to {:?}", candles.len(), path);
    }
    Ok(())
}
