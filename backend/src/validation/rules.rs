//! Common validation rules shared across request payloads.

use validator::ValidationError;

/// Validates an employee number: opaque identifier, 1–20 characters, no
/// embedded whitespace.
pub fn validate_employee_num(employee_num: &str) -> Result<(), ValidationError> {
    if employee_num.is_empty() || employee_num.chars().count() > 20 {
        return Err(ValidationError::new("employee_num_invalid_length"));
    }
    if employee_num.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("employee_num_contains_whitespace"));
    }
    Ok(())
}

/// Validates a fiscal year parameter.
pub fn validate_fiscal_year(year: i32) -> Result<(), ValidationError> {
    if !(2000..=2100).contains(&year) {
        return Err(ValidationError::new("year_out_of_range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_num_bounds() {
        assert!(validate_employee_num("E001").is_ok());
        assert!(validate_employee_num("").is_err());
        assert!(validate_employee_num(&"9".repeat(21)).is_err());
        assert!(validate_employee_num("E 01").is_err());
    }

    #[test]
    fn fiscal_year_bounds() {
        assert!(validate_fiscal_year(2025).is_ok());
        assert!(validate_fiscal_year(1999).is_err());
        assert!(validate_fiscal_year(2101).is_err());
    }

    #[test]
    fn employee_num_rejects_fullwidth_space_padding() {
        assert!(validate_employee_num("E\u{3000}01").is_err());
        assert!(validate_employee_num("派遣-102").is_ok());
    }
}
