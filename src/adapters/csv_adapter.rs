//! CSV candle source.
//!
//! One file per symbol, `<dir>/<symbol>.csv`, with header
//! `timestamp,open,high,low,close,volume`. Timestamps are Unix seconds or
//! RFC 3339. Rows out of timestamp order are kept, reordered, and reported
//! as warnings.

use crate::domain::candle::{Candle, CandleSeries};
use crate::domain::error::EngineError;
use crate::ports::data_port::{CandleLoad, CandleSource, LoadWarning};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvCandleAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl CandleSource for CsvCandleAdapter {
    fn load(&self, symbol: &str) -> Result<CandleLoad, EngineError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| EngineError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut candles: Vec<Candle> = Vec::new();
        let mut warnings = Vec::new();
        let mut reordered = 0usize;
        let mut latest: Option<DateTime<Utc>> = None;

        for (i, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let record = i + 1;
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warnings.push(LoadWarning {
                        record,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let Some(timestamp) = parse_timestamp(&row.timestamp) else {
                warnings.push(LoadWarning {
                    record,
                    reason: format!("invalid timestamp '{}'", row.timestamp),
                });
                continue;
            };
            let candle = Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            };
            if let Some(defect) = candle.defect() {
                warnings.push(LoadWarning {
                    record,
                    reason: defect.to_string(),
                });
                continue;
            }
            if latest.is_some_and(|seen| timestamp < seen) {
                reordered += 1;
                warnings.push(LoadWarning {
                    record,
                    reason: format!("{} is earlier than a previous row", row.timestamp),
                });
            } else {
                latest = Some(timestamp);
            }
            candles.push(candle);
        }

        let skipped = warnings.len() - reordered;
        if skipped > 0 {
            warn!(symbol, skipped, "skipped malformed CSV rows");
        }
        if reordered > 0 {
            warn!(symbol, reordered, "reordered out-of-order CSV rows");
        }
        if candles.is_empty() {
            return Err(EngineError::NoData {
                symbol: symbol.to_string(),
            });
        }
        debug!(symbol, candles = candles.len(), path = %path.display(), "loaded candles");

        Ok(CandleLoad {
            series: CandleSeries::from_unsorted(candles),
            warnings,
        })
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| EngineError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
