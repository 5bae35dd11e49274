// Validation utilities module
// Custom validators shared by request DTOs and rule invariants

use validator::ValidationError;

/// Validates a lowercase three-letter ISO 4217 currency code ("usd", "eur")
pub fn validate_currency_code(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.bytes().all(|b| b.is_ascii_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_currency_code"))
    }
}

/// Validates an absolute http or https URL
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    let has_web_scheme = url.starts_with("https://") || url.starts_with("http://");
    if has_web_scheme && validator::validate_url(url) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_url"))
    }
}
