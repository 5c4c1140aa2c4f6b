//! Validation helpers for DTOs.

use validator::ValidationError;

/// Alphabet join codes are generated from: no visually confusable characters
/// (0/O, 1/I are excluded).
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Validates that a join code is 6 characters from the unambiguous alphabet.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("QXK7PD") // Ok
/// validate_join_code("QXK7P")  // Err - too short
/// validate_join_code("QXK0PD") // Err - ambiguous character
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != 6 {
        let mut err = ValidationError::new("join_code_length");
        err.message =
            Some(format!("join code must be exactly 6 characters (got {})", code.len()).into());
        return Err(err);
    }

    if !code
        .bytes()
        .all(|b| JOIN_CODE_ALPHABET.contains(&b.to_ascii_uppercase()))
    {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("join code contains characters outside the allowed alphabet".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_codes() {
        assert!(validate_join_code("QXK7PD").is_ok());
        assert!(validate_join_code("qxk7pd").is_ok());
        assert!(validate_join_code("ABCDEF").is_ok());
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert!(validate_join_code("").is_err());
        assert!(validate_join_code("QXK7P").is_err());
        assert!(validate_join_code("QXK7PDA").is_err());
    }

    #[test]
    fn rejects_ambiguous_characters() {
        assert!(validate_join_code("QXK0PD").is_err()); // zero
        assert!(validate_join_code("QXKOPD").is_err()); // letter O
        assert!(validate_join_code("QXK1PD").is_err()); // one
        assert!(validate_join_code("QXKIPD").is_err()); // letter I
    }
}
