// Validation utilities module
// Provides custom validation functions for domain-specific rules

use validator::ValidationError;

use crate::error::{EngineError, EngineResult};

/// Validates that a cylinder size is written as a positive kilogram figure
/// Accepted: "3kg", "12.5kg", "50KG"
pub fn validate_cylinder_size(size: &str) -> Result<(), ValidationError> {
    let normalized = size.trim().to_lowercase();
    let digits = match normalized.strip_suffix("kg") {
        Some(digits) => digits,
        None => return Err(ValidationError::new("invalid_cylinder_size")),
    };
    match digits.parse::<f64>() {
        Ok(kg) if kg > 0.0 && kg.is_finite() => Ok(()),
        _ => Err(ValidationError::new("invalid_cylinder_size")),
    }
}

/// Validates a latitude/longitude pair
pub fn validate_coordinates(latitude: f64, longitude: f64) -> EngineResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(EngineError::invalid_field(
            "latitude",
            format!("latitude must be between -90 and 90, got {}", latitude),
        ));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(EngineError::invalid_field(
            "longitude",
            format!("longitude must be between -180 and 180, got {}", longitude),
        ));
    }
    Ok(())
}
