//! Fare display helpers.

use serde::{Deserialize, Serialize};

/// Where the currency symbol goes relative to the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolPosition {
    Before,
    After,
}

/// Formats `amount` with its currency symbol, e.g. `₺93.84` or `93.84€`.
///
/// Whole amounts are printed without decimals.
pub fn format_amount(amount: f64, symbol: &str, position: SymbolPosition) -> String {
    let number = if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    };
    match position {
        SymbolPosition::Before => format!("{symbol}{number}"),
        SymbolPosition::After => format!("{number}{symbol}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(93.84, "₺", SymbolPosition::Before), "₺93.84");
        assert_eq!(format_amount(12.0, "€", SymbolPosition::After), "12€");
        assert_eq!(format_amount(12.5, "$", SymbolPosition::Before), "$12.50");
    }
}
