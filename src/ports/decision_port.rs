//! External decision oracle port.
//!
//! An oracle sees the recent candle context and the open position (if any) and
//! answers with one of four actions. The runner treats a failure as `Hold`.

use std::str::FromStr;

use crate::domain::candle::Candle;
use crate::domain::error::OracleError;
use crate::domain::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Long,
    Short,
    Close,
    Hold,
}

impl FromStr for Decision {
    type Err = OracleError;

    /// Exact tokens only, trimmed and case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Decision::Long),
            "SHORT" => Ok(Decision::Short),
            "CLOSE" => Ok(Decision::Close),
            "HOLD" => Ok(Decision::Hold),
            _ => Err(OracleError::UnknownAction {
                action: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleDecision {
    pub decision: Decision,
    pub rationale: String,
}

impl OracleDecision {
    pub fn hold() -> Self {
        Self {
            decision: Decision::Hold,
            rationale: String::new(),
        }
    }

    /// Builds a decision from a free-text action and rationale.
    pub fn parse(action: &str, rationale: impl Into<String>) -> Result<Self, OracleError> {
        Ok(Self {
            decision: action.parse()?,
            rationale: rationale.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleQuery {
    pub symbol: String,
    /// Most recent candles, oldest first, ending at the current bar.
    pub candles: Vec<Candle>,
    pub position: Option<Position>,
}

pub trait DecisionOracle {
    fn decide(&self, query: &OracleQuery) -> Result<OracleDecision, OracleError>;
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for Box<T> {
    fn decide(&self, query: &OracleQuery) -> Result<OracleDecision, OracleError> {
        (**self).decide(query)
    }
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for std::sync::Arc<T> {
    fn decide(&self, query: &OracleQuery) -> Result<OracleDecision, OracleError> {
        (**self).decide(query)
    }
}
