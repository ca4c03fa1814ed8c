//! Candle source port trait.

use chrono::{DateTime, Utc};

use crate::domain::candle::CandleSeries;
use crate::domain::error::EngineError;

/// A record that could not be turned into a candle.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadWarning {
    /// 1-based record number in the source.
    pub record: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CandleLoad {
    pub series: CandleSeries,
    pub warnings: Vec<LoadWarning>,
}

pub trait CandleSource {
    /// All candles for `symbol` in timestamp order.
    fn load(&self, symbol: &str) -> Result<CandleLoad, EngineError>;

    fn list_symbols(&self) -> Result<Vec<String>, EngineError>;

    /// Candles with `start <= timestamp <= end`.
    fn load_range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleLoad, EngineError> {
        let CandleLoad { series, warnings } = self.load(symbol)?;
        let kept = series
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .copied()
            .collect();
        Ok(CandleLoad {
            series: CandleSeries::new(kept)?,
            warnings,
        })
    }
}
