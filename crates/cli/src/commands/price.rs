//! Price formatting.
//!
//! ```bash
//! forno price 45,9     # R$ 45,90
//! forno price 1234567  # R$ 1.234.567,00
//! ```

use std::str::FromStr;

use forno_core::format_currency;
use rust_decimal::Decimal;

use super::CommandError;

/// Print `amount` formatted in reais.
///
/// # Errors
///
/// Returns [`CommandError::InvalidAmount`] if the input is not a number.
#[allow(clippy::print_stdout)]
pub fn run(amount: &str) -> Result<(), CommandError> {
    println!("{}", format(amount)?);
    Ok(())
}

fn format(amount: &str) -> Result<String, CommandError> {
    let normalized = amount.trim().replace(',', ".");
    let value = Decimal::from_str(&normalized)
        .map_err(|_| CommandError::InvalidAmount(amount.to_string()))?;
    Ok(format_currency(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_accepts_both_separators() {
        assert_eq!(format("1000").unwrap(), "R$ 1.000,00");
        assert_eq!(format("45,9").unwrap(), "R$ 45,90");
        assert_eq!(format(" 45.90 ").unwrap(), "R$ 45,90");
        assert_eq!(format("-10.5").unwrap(), "-R$ 10,50");
    }

    #[test]
    fn test_format_rejects_text() {
        assert!(matches!(
            format("dez reais"),
            Err(CommandError::InvalidAmount(_))
        ));
    }
}
