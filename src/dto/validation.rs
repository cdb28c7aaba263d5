//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a seat color is a 6 or 8 digit lowercase hexadecimal code
/// (RGB or RGBA, without a leading `#`).
///
/// # Examples
///
/// ```ignore
/// validate_color_code("e6194b")   // Ok
/// validate_color_code("e6194bff") // Ok - with alpha
/// validate_color_code("#e6194b")  // Err - leading hash
/// validate_color_code("E6194B")   // Err - uppercase
/// ```
pub fn validate_color_code(color: &str) -> Result<(), ValidationError> {
    if color.len() != 6 && color.len() != 8 {
        let mut err = ValidationError::new("color_length");
        err.message = Some(
            format!(
                "Color must be exactly 6 or 8 hexadecimal characters (got {})",
                color.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !color
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new("color_format");
        err.message = Some("Color must contain only lowercase hexadecimal characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_color_code_valid() {
        assert!(validate_color_code("e6194b").is_ok());
        assert!(validate_color_code("ffffff").is_ok());
        assert!(validate_color_code("e6194bff").is_ok());
        assert!(validate_color_code("00000000").is_ok());
    }

    #[test]
    fn test_validate_color_code_invalid_length() {
        assert!(validate_color_code("e6194").is_err()); // too short
        assert!(validate_color_code("e6194bf").is_err()); // between 6 and 8
        assert!(validate_color_code("e6194bff0").is_err()); // too long
        assert!(validate_color_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_color_code_invalid_format() {
        assert!(validate_color_code("E6194B").is_err()); // uppercase
        assert!(validate_color_code("#e6194").is_err()); // leading hash
        assert!(validate_color_code("e6194g").is_err()); // invalid hex
        assert!(validate_color_code("e619 b").is_err()); // space
    }
}
