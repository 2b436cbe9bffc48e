//! Validation helpers for DTOs.

use validator::ValidationError;

/// Adjustments are only recorded once the buyer ticked the confirmation box.
pub fn validate_confirmed(confirmed: &bool) -> Result<(), ValidationError> {
    if !*confirmed {
        let mut err = ValidationError::new("adjustment_unconfirmed");
        err.message = Some("Adjustment must be confirmed before it is recorded".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfirmed_adjustment_is_invalid() {
        assert!(validate_confirmed(&true).is_ok());
        let err = validate_confirmed(&false).unwrap_err();
        assert_eq!(err.code, "adjustment_unconfirmed");
    }
}
