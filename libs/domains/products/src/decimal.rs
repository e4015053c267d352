//! Exact conversion between [`Decimal`] and BSON `Decimal128`.
//!
//! `Decimal128` uses the IEEE 754-2008 binary integer decimal layout:
//! sign in bit 127, a 14 bit biased exponent in bits 126..113 and a 113 bit
//! coefficient below it. `rust_decimal` holds a 96 bit mantissa with a
//! scale of at most 28, so every `Decimal` encodes losslessly while only
//! the finite subset of `Decimal128` decodes back.

use mongodb::bson::Decimal128;
use rust_decimal::Decimal;
use thiserror::Error;

const EXPONENT_BIAS: i32 = 6176;
const EXPONENT_MASK: u128 = 0x3FFF;
const COEFFICIENT_BITS: u32 = 113;
const COEFFICIENT_MASK: u128 = (1 << COEFFICIENT_BITS) - 1;
const MAX_MANTISSA: u128 = (1 << 96) - 1;
const MAX_SCALE: u32 = 28;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DecimalError {
    #[error("Decimal128 value is NaN, infinite or non-canonical")]
    NotFinite,

    #[error("Decimal128 value {coefficient}E{exponent} does not fit a 96-bit decimal")]
    OutOfRange { coefficient: u128, exponent: i32 },
}

pub fn to_decimal128(value: Decimal) -> Decimal128 {
    let sign = u128::from(value.is_sign_negative() && !value.is_zero());
    let coefficient = value.mantissa().unsigned_abs();
    let biased_exponent = (EXPONENT_BIAS - value.scale() as i32) as u128;

    let bits = (sign << 127) | (biased_exponent << COEFFICIENT_BITS) | coefficient;
    Decimal128::from_bytes(bits.to_le_bytes())
}

pub fn from_decimal128(value: Decimal128) -> Result<Decimal, DecimalError> {
    let bits = u128::from_le_bytes(value.bytes());

    // Combination bits `11` mark NaN, infinity or a coefficient above 10^34.
    if (bits >> 125) & 0b11 == 0b11 {
        return Err(DecimalError::NotFinite);
    }

    let negative = bits >> 127 == 1;
    let exponent = ((bits >> COEFFICIENT_BITS) & EXPONENT_MASK) as i32 - EXPONENT_BIAS;
    let mut coefficient = bits & COEFFICIENT_MASK;
    let out_of_range = DecimalError::OutOfRange {
        coefficient,
        exponent,
    };

    if coefficient == 0 {
        let scale = u32::try_from(-exponent).unwrap_or(0).min(MAX_SCALE);
        return Ok(Decimal::new(0, scale));
    }

    let mut scale: u32 = 0;
    if exponent > 0 {
        for _ in 0..exponent {
            coefficient = coefficient
                .checked_mul(10)
                .filter(|c| *c <= MAX_MANTISSA)
                .ok_or(out_of_range)?;
        }
    } else {
        scale = exponent.unsigned_abs();
        while scale > MAX_SCALE && coefficient % 10 == 0 {
            coefficient /= 10;
            scale -= 1;
        }
    }

    if scale > MAX_SCALE || coefficient > MAX_MANTISSA {
        return Err(out_of_range);
    }

    let mantissa = coefficient as i128;
    let signed = if negative { -mantissa } else { mantissa };
    Decimal::try_from_i128_with_scale(signed, scale).map_err(|_| out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn raw(bits: u128) -> Decimal128 {
        Decimal128::from_bytes(bits.to_le_bytes())
    }

    #[test]
    fn test_price_survives_conversion_exactly() {
        for price in ["19.99", "0.01", "1234567.890", "-42.5", "79228162514264337593543950335"] {
            let back = from_decimal128(to_decimal128(dec(price))).unwrap();
            assert_eq!(back, dec(price));
            assert_eq!(back.to_string(), price);
        }
    }

    #[test]
    fn test_encoding_layout() {
        let bits = u128::from_le_bytes(to_decimal128(dec("19.99")).bytes());
        assert_eq!(bits >> 127, 0);
        assert_eq!((bits >> COEFFICIENT_BITS) & EXPONENT_MASK, 6174);
        assert_eq!(bits & COEFFICIENT_MASK, 1999);

        let negative = u128::from_le_bytes(to_decimal128(dec("-0.5")).bytes());
        assert_eq!(negative >> 127, 1);
        assert_eq!(negative & COEFFICIENT_MASK, 5);
    }

    #[test]
    fn test_zero_keeps_scale() {
        let back = from_decimal128(to_decimal128(dec("0.00"))).unwrap();
        assert!(back.is_zero());
        assert_eq!(back.scale(), 2);
    }

    #[test]
    fn test_positive_exponent_is_expanded() {
        // 5E+3
        let bits = ((EXPONENT_BIAS + 3) as u128) << COEFFICIENT_BITS | 5;
        assert_eq!(from_decimal128(raw(bits)).unwrap(), dec("5000"));
    }

    #[test]
    fn test_excess_scale_with_trailing_zeros_is_reduced() {
        // 1500 x 10^-30 == 0.000...15 with scale 28
        let bits = ((EXPONENT_BIAS - 30) as u128) << COEFFICIENT_BITS | 1500;
        let value = from_decimal128(raw(bits)).unwrap();
        assert_eq!(value.scale(), 28);
        assert_eq!(value.mantissa(), 15);
    }

    #[test]
    fn test_excess_precision_is_rejected() {
        // 1 x 10^-30 has no 28-scale representation
        let bits = ((EXPONENT_BIAS - 30) as u128) << COEFFICIENT_BITS | 1;
        assert!(matches!(
            from_decimal128(raw(bits)),
            Err(DecimalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_huge_value_is_rejected() {
        // 1E+40
        let bits = ((EXPONENT_BIAS + 40) as u128) << COEFFICIENT_BITS | 1;
        assert!(from_decimal128(raw(bits)).is_err());
    }

    #[test]
    fn test_nan_and_infinity_are_rejected() {
        let infinity = 0b11110u128 << 122;
        let nan = 0b11111u128 << 122;
        assert_eq!(from_decimal128(raw(infinity)), Err(DecimalError::NotFinite));
        assert_eq!(from_decimal128(raw(nan)), Err(DecimalError::NotFinite));
    }
}
