use std::str::FromStr;

use groupfund_core::{FundError, FundResult};
use regex::Regex;
use rust_decimal::Decimal;

/// Textual markers a group-fund transfer memo must carry,
/// e.g. `QUY_NHOM_TUAN_5_100000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoFormat {
    pub tag: String,
    pub period_marker: String,
}

impl Default for MemoFormat {
    fn default() -> Self {
        Self {
            tag: "QUY_NHOM".to_string(),
            period_marker: "TUAN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMemo {
    pub week: i32,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct MemoParser {
    tag: String,
    marker: String,
    period: Regex,
    amount: Regex,
}

impl MemoParser {
    pub fn new(format: &MemoFormat) -> FundResult<Self> {
        let tag = format.tag.trim().to_uppercase();
        let marker = format.period_marker.trim().to_uppercase();
        if tag.is_empty() || marker.is_empty() {
            return Err(FundError::validation("memo tag and period marker are required"));
        }

        let period = Regex::new(&format!(r"(?i){}[_\s]*(\d+)", regex::escape(&marker)))
            .map_err(|err| FundError::validation(format!("invalid memo period marker: {err}")))?;
        let amount = Regex::new(r"(\d+)\s*$")
            .map_err(|err| FundError::validation(format!("invalid memo amount pattern: {err}")))?;

        Ok(Self {
            tag,
            marker,
            period,
            amount,
        })
    }

    /// `None` for anything that is not a group-fund transfer.
    pub fn parse(&self, memo: &str) -> Option<ParsedMemo> {
        let upper = memo.to_uppercase();
        if !upper.contains(&self.tag) || !upper.contains(&self.marker) {
            return None;
        }

        let period = self.period.captures(memo)?.get(1)?;
        let amount = self.amount.captures(memo)?.get(1)?;
        // The trailing digits must be their own token, not the period number.
        if amount.start() < period.end() {
            return None;
        }

        Some(ParsedMemo {
            week: period.as_str().parse().ok()?,
            amount: Decimal::from_str(amount.as_str()).ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> MemoParser {
        MemoParser::new(&MemoFormat::default()).unwrap()
    }

    #[test]
    fn parses_period_and_amount() {
        assert_eq!(
            parser().parse("QUY_NHOM_TUAN_5_100000"),
            Some(ParsedMemo {
                week: 5,
                amount: Decimal::new(100_000, 0),
            })
        );
    }

    #[test]
    fn tolerates_prefixes_spacing_and_case() {
        assert_eq!(
            parser().parse("Chuyen tien quy_nhom tuan 12 50000 "),
            Some(ParsedMemo {
                week: 12,
                amount: Decimal::new(50_000, 0),
            })
        );
    }

    #[test]
    fn ignores_unrelated_memos() {
        assert_eq!(parser().parse("random text"), None);
        assert_eq!(parser().parse("TUAN_5_100000"), None);
        assert_eq!(parser().parse("QUY_NHOM_100000"), None);
    }

    #[test]
    fn period_alone_is_not_an_amount() {
        assert_eq!(parser().parse("QUY_NHOM_TUAN_5"), None);
    }

    #[test]
    fn rejects_empty_markers() {
        let err = MemoParser::new(&MemoFormat {
            tag: " ".into(),
            period_marker: "TUAN".into(),
        })
        .unwrap_err();
        assert!(matches!(err, FundError::Validation { .. }));
    }
}
