//! Core data types shared by every physics domain.
//!
//! This module defines:
//! - Geometric primitives (2-D points)
//! - The [`FieldScalar`] abstraction over real and phasor unknowns
//! - [`FieldVector`], a 2-component field quantity (B, E, D, J, ...)
//! - Physical constants and length units

use nalgebra::Vector2;
use num_complex::Complex64;
use num_traits::{NumAssign, One, Zero};
use std::f64::consts::PI;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A point in the 2-D problem plane (x, y) or (r, z).
pub type Point2 = Vector2<f64>;

/// Phasor scalar used by time-harmonic problems.
pub type Complex = Complex64;

/// Permeability of free space (H/m).
pub const MU_0: f64 = 4.0e-7 * PI;

/// Permittivity of free space (F/m).
pub const EPSILON_0: f64 = 8.854_187_812_8e-12;

/// Stefan-Boltzmann constant (W/(m²·K⁴)).
pub const STEFAN_BOLTZMANN: f64 = 5.670_374_419e-8;

/// Scalar type of the nodal unknowns.
///
/// Implemented for `f64` (static problems) and [`Complex`] (phasor problems).
/// The solver uses the unconjugated bilinear product, so complex systems are
/// treated as complex-symmetric.
pub trait FieldScalar:
    nalgebra::Scalar + NumAssign + Copy + Send + Sync + Zero + One + Neg<Output = Self> + Debug
{
    /// Create from a real value.
    fn from_real(r: f64) -> Self;

    /// Narrow a phasor coefficient into this scalar type.
    ///
    /// For `f64` the imaginary part is dropped.
    fn from_complex(c: Complex) -> Self;

    /// Widen into a phasor.
    fn to_complex(self) -> Complex;

    /// Complex conjugate.
    fn conj(self) -> Self;

    /// Real part.
    fn re(self) -> f64;

    /// Imaginary part.
    fn im(self) -> f64;

    /// Squared magnitude |z|².
    fn norm_sqr(self) -> f64;

    /// Magnitude |z|.
    fn norm(self) -> f64 {
        self.norm_sqr().sqrt()
    }

    /// True for scalar types that carry an imaginary part.
    fn is_complex() -> bool;
}

impl FieldScalar for f64 {
    fn from_real(r: f64) -> Self {
        r
    }

    fn from_complex(c: Complex) -> Self {
        c.re
    }

    fn to_complex(self) -> Complex {
        Complex::new(self, 0.0)
    }

    fn conj(self) -> Self {
        self
    }

    fn re(self) -> f64 {
        self
    }

    fn im(self) -> f64 {
        0.0
    }

    fn norm_sqr(self) -> f64 {
        self * self
    }

    fn is_complex() -> bool {
        false
    }
}

impl FieldScalar for Complex {
    fn from_real(r: f64) -> Self {
        Complex::new(r, 0.0)
    }

    fn from_complex(c: Complex) -> Self {
        c
    }

    fn to_complex(self) -> Complex {
        self
    }

    fn conj(self) -> Self {
        Complex::conj(&self)
    }

    fn re(self) -> f64 {
        self.re
    }

    fn im(self) -> f64 {
        self.im
    }

    fn norm_sqr(self) -> f64 {
        Complex::norm_sqr(&self)
    }

    fn is_complex() -> bool {
        true
    }
}

/// Two-component field quantity with real or phasor components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldVector<T> {
    pub x: T,
    pub y: T,
}

impl<T: FieldScalar> FieldVector<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self {
            x: T::zero(),
            y: T::zero(),
        }
    }

    /// Multiply both components by a real weight.
    pub fn scale(self, w: f64) -> Self {
        let w = T::from_real(w);
        Self {
            x: self.x * w,
            y: self.y * w,
        }
    }

    /// Multiply both components by a scalar.
    pub fn mul(self, s: T) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
        }
    }

    /// Magnitude sqrt(|x|² + |y|²); the peak amplitude for phasors.
    pub fn magnitude(&self) -> f64 {
        (self.x.norm_sqr() + self.y.norm_sqr()).sqrt()
    }

    /// Componentwise conjugate.
    pub fn conj(self) -> Self {
        Self {
            x: self.x.conj(),
            y: self.y.conj(),
        }
    }

    /// Unconjugated product a·b.
    pub fn dot(&self, other: &Self) -> T {
        self.x * other.x + self.y * other.y
    }

    pub fn to_complex(self) -> FieldVector<Complex> {
        FieldVector {
            x: self.x.to_complex(),
            y: self.y.to_complex(),
        }
    }
}

impl<T: FieldScalar> Add for FieldVector<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl<T: FieldScalar> AddAssign for FieldVector<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl<T: FieldScalar> Sub for FieldVector<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Units the problem geometry is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Inches,
    Millimeters,
    Centimeters,
    Meters,
    Mils,
    Micrometers,
}

impl LengthUnit {
    /// Conversion factor from this unit to meters.
    pub fn to_meters(self) -> f64 {
        match self {
            LengthUnit::Inches => 0.0254,
            LengthUnit::Millimeters => 0.001,
            LengthUnit::Centimeters => 0.01,
            LengthUnit::Meters => 1.0,
            LengthUnit::Mils => 2.54e-5,
            LengthUnit::Micrometers => 1.0e-6,
        }
    }

    /// Parse the name used in problem files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "inches" | "inch" => Some(LengthUnit::Inches),
            "millimeters" | "millimeter" | "mm" => Some(LengthUnit::Millimeters),
            "centimeters" | "centimeter" | "cm" => Some(LengthUnit::Centimeters),
            "meters" | "meter" | "m" => Some(LengthUnit::Meters),
            "mils" | "mil" => Some(LengthUnit::Mils),
            "microns" | "micrometers" | "um" => Some(LengthUnit::Micrometers),
            _ => None,
        }
    }
}

/// Planar (unit depth) or axisymmetric (r-z plane) geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProblemType {
    #[default]
    Planar,
    Axisymmetric,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_length_units() {
        assert_relative_eq!(LengthUnit::Inches.to_meters(), 0.0254);
        assert_eq!(LengthUnit::from_name("Millimeters"), Some(LengthUnit::Millimeters));
        assert_eq!(LengthUnit::from_name("microns"), Some(LengthUnit::Micrometers));
        assert_eq!(LengthUnit::from_name("furlongs"), None);
    }

    #[test]
    fn test_field_vector_magnitude() {
        let v = FieldVector::new(Complex::new(3.0, 0.0), Complex::new(0.0, 4.0));
        assert_relative_eq!(v.magnitude(), 5.0, epsilon = 1e-12);

        let r = FieldVector::new(1.0_f64, -2.0);
        assert_relative_eq!(r.scale(2.0).y, -4.0);
        assert_relative_eq!(r.dot(&r), 5.0);
    }

    #[test]
    fn test_real_scalar_drops_imaginary_part() {
        let c = Complex::new(1.5, 2.0);
        assert_relative_eq!(<f64 as FieldScalar>::from_complex(c), 1.5);
        assert_relative_eq!(<Complex as FieldScalar>::from_complex(c).im, 2.0);
    }
}
