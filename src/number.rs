//! Numeric payloads and their conversion into the requested native type.

use std::fmt;

/// How a decoded number is fitted into a narrower or differently-typed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericMode {
    /// Plain `as` casts: silent truncation, wrapping and float rounding.
    #[default]
    Permissive,
    /// Reject any conversion that changes the value.
    Strict,
}

/// A numeric value as read off the wire, before narrowing.
///
/// Bool tags arrive here as `Unsigned(0)` / `Unsigned(1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Unsigned(u64),
    Signed(i64),
    F32(f32),
    F64(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Unsigned(v) => write!(f, "{v}"),
            Number::Signed(v) => write!(f, "{v}"),
            Number::F32(v) => write!(f, "{v}"),
            Number::F64(v) => write!(f, "{v}"),
        }
    }
}

/// A native type a [`Number`] can be converted into.
///
/// Returns `None` only in [`NumericMode::Strict`] when the value does not fit.
pub trait FromNumber: Sized {
    const NAME: &'static str;

    fn from_number(number: Number, mode: NumericMode) -> Option<Self>;
}

// Whole, in range, and not NaN.
fn float_fits(v: f64, min: f64, max: f64) -> bool {
    v.fract() == 0.0 && v >= min && v < max + 1.0
}

macro_rules! int_from_number {
    ($($ty:ty),*) => {
        $(
            impl FromNumber for $ty {
                const NAME: &'static str = stringify!($ty);

                fn from_number(number: Number, mode: NumericMode) -> Option<Self> {
                    match (number, mode) {
                        (Number::Unsigned(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::Signed(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::F32(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::F64(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::Unsigned(v), NumericMode::Strict) => <$ty>::try_from(v).ok(),
                        (Number::Signed(v), NumericMode::Strict) => <$ty>::try_from(v).ok(),
                        (Number::F32(v), NumericMode::Strict) => {
                            float_fits(f64::from(v), <$ty>::MIN as f64, <$ty>::MAX as f64)
                                .then(|| v as $ty)
                        }
                        (Number::F64(v), NumericMode::Strict) => {
                            float_fits(v, <$ty>::MIN as f64, <$ty>::MAX as f64).then(|| v as $ty)
                        }
                    }
                }
            }
        )*
    };
}

int_from_number!(u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! float_from_number {
    ($($ty:ty),*) => {
        $(
            impl FromNumber for $ty {
                const NAME: &'static str = stringify!($ty);

                fn from_number(number: Number, mode: NumericMode) -> Option<Self> {
                    match (number, mode) {
                        (Number::Unsigned(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::Signed(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::F32(v), NumericMode::Permissive) => Some(v as $ty),
                        (Number::F64(v), NumericMode::Permissive) => Some(v as $ty),
                        // i128 holds every u64/i64 and the saturated cast of any float
                        (Number::Unsigned(v), NumericMode::Strict) => {
                            let f = v as $ty;
                            (f as i128 == i128::from(v)).then_some(f)
                        }
                        (Number::Signed(v), NumericMode::Strict) => {
                            let f = v as $ty;
                            (f as i128 == i128::from(v)).then_some(f)
                        }
                        (Number::F32(v), NumericMode::Strict) => Some(v as $ty),
                        (Number::F64(v), NumericMode::Strict) => {
                            let f = v as $ty;
                            (f as f64 == v || v.is_nan()).then_some(f)
                        }
                    }
                }
            }
        )*
    };
}

float_from_number!(f32, f64);

impl FromNumber for bool {
    const NAME: &'static str = "bool";

    fn from_number(number: Number, mode: NumericMode) -> Option<Self> {
        match (number, mode) {
            (Number::Unsigned(v), NumericMode::Permissive) => Some(v != 0),
            (Number::Signed(v), NumericMode::Permissive) => Some(v != 0),
            (Number::F32(v), NumericMode::Permissive) => Some(v != 0.0),
            (Number::F64(v), NumericMode::Permissive) => Some(v != 0.0),
            (Number::Unsigned(0), NumericMode::Strict) => Some(false),
            (Number::Unsigned(1), NumericMode::Strict) => Some(true),
            (Number::Signed(0), NumericMode::Strict) => Some(false),
            (Number::Signed(1), NumericMode::Strict) => Some(true),
            (_, NumericMode::Strict) => None,
        }
    }
}
