use std::io::{Cursor, Read, Seek};

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use time::macros::format_description;
use time::Date;

use crate::input::candles::Candle;

const BASE_URL: &str = "https://data.binance.vision/data/spot/daily/klines";

/// Timestamps above this are in microseconds rather than milliseconds. Binance moved spot
/// archives to microseconds at the start of 2025.
const MICROSECOND_THRESHOLD: i64 = 100_000_000_000_000;

/// Parses a `YYYY-MM-DD` day.
pub fn parse_day(day: &str) -> Result<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(day, &format).with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", day))
}

/// Location of the daily kline archive for a symbol at an interval such as `1m` or `1h`.
pub fn kline_url(symbol: &str, interval: &str, day: Date) -> String {
    format!(
        "{base}/{symbol}/{interval}/{symbol}-{interval}-{day}.zip",
        base = BASE_URL,
        symbol = symbol,
        interval = interval,
        day = day
    )
}

/// Downloads one day of klines for a symbol.
pub fn fetch_daily_klines(symbol: &str, interval: &str, day: Date) -> Result<Vec<Candle>> {
    let url = kline_url(symbol, interval, day);
    info!("SOURCE: Fetching {:?}", url);
    let resp = reqwest::blocking::get(&url)?.error_for_status()?;
    let contents = resp.bytes()?;
    let candles = parse_kline_archive(Cursor::new(contents.to_vec()))?;
    info!("SOURCE: Read {:?} candles for {:?}", candles.len(), symbol);
    Ok(candles)
}

/// Reads klines from every file in a zip archive.
pub fn parse_kline_archive<R: Read + Seek>(archive: R) -> Result<Vec<Candle>> {
    let mut zip = zip::ZipArchive::new(archive)?;
    let mut candles = Vec::new();
    for i in 0..zip.len() {
        let zip_file = zip.by_index(i)?;
        debug!("SOURCE: Reading {:?} from archive", zip_file.name());
        candles.extend(parse_klines(zip_file)?);
    }
    candles.sort_by_key(|candle| candle.date);
    Ok(candles)
}

/// Reads klines in Binance's CSV layout:
///
/// ```text
/// open time, open, high, low, close, volume, close time, quote volume, trades, ...
/// ```
///
/// Candles are dated by open time in seconds. Some archives carry a header row, any row whose
/// open time is not a number is skipped.
pub fn parse_klines<R: Read>(reader: R) -> Result<Vec<Candle>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut candles = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let open_time = match row.get(0).map(|field| field.trim().parse::<i64>()) {
            Some(Ok(open_time)) => open_time,
            _ => continue,
        };
        if row.len() < 5 {
            return Err(anyhow!("kline row at {} has {} fields", open_time, row.len()));
        }
        let field = |idx: usize| -> Result<f64> {
            row[idx]
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid number {:?} in kline at {}", &row[idx], open_time))
        };
        let date = if open_time > MICROSECOND_THRESHOLD {
            open_time / 1_000_000
        } else {
            open_time / 1000
        };
        candles.push(Candle::new(date, field(2)?, field(3)?, field(1)?, field(4)?));
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use super::{kline_url, parse_day, parse_kline_archive, parse_klines};

    const KLINES: &str = "\
1659484800000,22983.05,22991.01,22970.00,22975.39,52.1,1659484859999,1197000.0,1200,20.0,459000.0,0
1659484860000,22975.39,22988.00,22966.11,22980.00,40.7,1659484919999,935000.0,950,18.0,413000.0,0
";

    #[test]
    fn test_that_klines_are_read_as_candles() {
        let candles = parse_klines(KLINES.as_bytes()).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, 1659484800);
        assert_eq!(candles[0].open, 22983.05);
        assert_eq!(candles[0].high, 22991.01);
        assert_eq!(candles[0].low, 22970.00);
        assert_eq!(candles[1].close, 22980.00);
    }

    #[test]
    fn test_that_headers_are_skipped_and_microseconds_handled() {
        let input = "open_time,open,high,low,close,volume\n\
1735689600000000,1.0,2.0,0.5,1.5,10.0\n";
        let candles = parse_klines(input.as_bytes()).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].date, 1735689600);
    }

    #[test]
    fn test_that_bad_numbers_fail() {
        let input = "1659484800000,abc,1.0,1.0,1.0\n";
        assert!(parse_klines(input.as_bytes()).is_err());
    }

    #[test]
    fn test_that_archive_is_unpacked() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("BTCUSDT-1m-2022-08-03.csv", options).unwrap();
        writer.write_all(KLINES.as_bytes()).unwrap();
        let archive = writer.finish().unwrap();

        let candles = parse_kline_archive(Cursor::new(archive.into_inner())).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].date < candles[1].date);
    }

    #[test]
    fn test_that_url_names_the_day() {
        let day = parse_day("2022-08-03").unwrap();
        assert_eq!(
            kline_url("BTCUSDT", "1m", day),
            "https://data.binance.vision/data/spot/daily/klines/BTCUSDT/1m/BTCUSDT-1m-2022-08-03.zip"
        );
        assert!(parse_day("03/08/2022").is_err());
    }
}
