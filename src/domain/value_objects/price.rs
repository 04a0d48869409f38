use crate::domain::errors::ValidationError;

/// A validated, non-negative, finite price.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value < 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "price must be non-negative, got {}",
                value
            )));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 100.0);
    }

    #[test]
    fn test_price_new_negative() {
        assert!(Price::new(-10.0).is_err());
    }

    #[test]
    fn test_price_new_zero() {
        let price = Price::new(0.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 0.0);
    }

    #[test]
    fn test_price_new_nan() {
        assert!(Price::new(f64::NAN).is_err());
    }

    #[test]
    fn test_price_new_infinite() {
        assert!(Price::new(f64::INFINITY).is_err());
    }
}
