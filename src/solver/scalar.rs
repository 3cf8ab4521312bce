//! Numeric types the solver can factor.
//!
//! The elimination and substitution algorithms are written once, generic
//! over [`Scalar`]. The only things that differ between real and complex
//! systems are how the size of a value is measured (for the pivot threshold
//! tests) and how a pivot is inverted.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_complex::Complex64;

/// A value type that can be stored in and factored by the sparse solver.
pub trait Scalar:
    Copy
    + Default
    + PartialEq
    + Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// Size measure used by pivot selection.
    fn magnitude(self) -> f64;

    /// Multiplicative inverse.
    fn inverse(self) -> Self;

    /// Embed a real value.
    fn from_real(value: f64) -> Self;

    /// The additive identity.
    fn zero() -> Self {
        Self::default()
    }

    /// Check if the value is exactly zero.
    fn is_zero(self) -> bool {
        self == Self::zero()
    }
}

impl Scalar for f64 {
    fn magnitude(self) -> f64 {
        self.abs()
    }

    fn inverse(self) -> Self {
        1.0 / self
    }

    fn from_real(value: f64) -> Self {
        value
    }
}

impl Scalar for Complex64 {
    /// `|re| + |im|`
    fn magnitude(self) -> f64 {
        self.re.abs() + self.im.abs()
    }

    /// Reciprocal computed through the ratio of the smaller to the larger
    /// component. `|z|²` is never formed.
    fn inverse(self) -> Self {
        if self.re.abs() >= self.im.abs() {
            let r = self.im / self.re;
            let re = 1.0 / (self.re + r * self.im);
            Complex64::new(re, -r * re)
        } else {
            let r = self.re / self.im;
            let im = -1.0 / (self.im + r * self.re);
            Complex64::new(-r * im, im)
        }
    }

    fn from_real(value: f64) -> Self {
        Complex64::new(value, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_unit(z: Complex64) {
        let product = z.inverse() * z;
        assert_relative_eq!(product.re, 1.0, epsilon = 1e-12);
        assert!(product.im.abs() < 1e-12, "imaginary part {}", product.im);
    }

    #[test]
    fn test_real_inverse() {
        assert_eq!(4.0f64.inverse(), 0.25);
        assert_eq!((-2.0f64).magnitude(), 2.0);
    }

    #[test]
    fn test_complex_magnitude() {
        assert_eq!(Complex64::new(3.0, -4.0).magnitude(), 7.0);
    }

    #[test]
    fn test_complex_inverse_real_dominant() {
        assert_unit(Complex64::new(3.0, 1.0));
        assert_unit(Complex64::new(-5.0, 2.0));
        assert_unit(Complex64::new(2.0, 0.0));
    }

    #[test]
    fn test_complex_inverse_imaginary_dominant() {
        assert_unit(Complex64::new(1.0, 3.0));
        assert_unit(Complex64::new(-0.5, -7.0));
        assert_unit(Complex64::new(0.0, 2.0));
    }

    #[test]
    fn test_complex_inverse_near_overflow() {
        // The squared modulus of these values is not representable
        let z = Complex64::new(1e300, 1e300);
        let naive = Complex64::new(z.re / (z.re * z.re + z.im * z.im), 0.0);
        assert_eq!(naive.re, 0.0);

        let inv = z.inverse();
        assert_relative_eq!(inv.re, 0.5e-300, max_relative = 1e-12);
        assert_relative_eq!(inv.im, -0.5e-300, max_relative = 1e-12);
        assert_unit(z);
        assert_unit(Complex64::new(1e-3, 1e305));
        assert_unit(Complex64::new(-1e306, 1e2));
    }
}
