use crate::error::FieldError;
use crate::models::driver::GeoPoint;

pub fn check_point(errors: &mut Vec<FieldError>, field: &str, point: &GeoPoint) {
    if !point.lat.is_finite() || point.lat < -90.0 || point.lat > 90.0 {
        errors.push(FieldError {
            field: format!("{field}.lat"),
            message: "latitude must be a number between -90 and 90".to_string(),
        });
    }
    if !point.lng.is_finite() || point.lng < -180.0 || point.lng > 180.0 {
        errors.push(FieldError {
            field: format!("{field}.lng"),
            message: "longitude must be a number between -180 and 180".to_string(),
        });
    }
}

pub fn check_address(errors: &mut Vec<FieldError>, field: &str, address: &str) {
    if address.trim().is_empty() {
        errors.push(FieldError {
            field: field.to_string(),
            message: "address is required".to_string(),
        });
    }
}
