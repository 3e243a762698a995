/// Precoding of transmission layers onto antenna ports
/// Based on 3GPP TS 38.211 Section 7.3.1.5
///
/// A single wideband precoding matrix applies to the whole allocation.

use ndarray::Array2;
use num_complex::Complex32;
use std::ops::MulAssign;

/// Precoding weights indexed by (port, layer)
#[derive(Debug, Clone, PartialEq)]
pub struct PrecodingMatrix {
    weights: Array2<Complex32>,
}

impl PrecodingMatrix {
    /// Build from a ports x layers weight matrix
    pub fn new(weights: Array2<Complex32>) -> Self {
        Self { weights }
    }

    /// Layer i transmitted on port i
    pub fn identity(nof_layers: usize) -> Self {
        Self::identity_on_ports(nof_layers, nof_layers)
    }

    /// Every layer on one port each, remaining ports left silent
    pub fn identity_on_ports(nof_layers: usize, nof_ports: usize) -> Self {
        Self {
            weights: Array2::from_shape_fn((nof_ports, nof_layers), |(port, layer)| {
                if port == layer {
                    Complex32::new(1.0, 0.0)
                } else {
                    Complex32::new(0.0, 0.0)
                }
            }),
        }
    }

    pub fn nof_ports(&self) -> usize {
        self.weights.nrows()
    }

    pub fn nof_layers(&self) -> usize {
        self.weights.ncols()
    }

    pub fn coefficient(&self, port: usize, layer: usize) -> Complex32 {
        self.weights[(port, layer)]
    }

    /// Copy with every weight multiplied by `factor`
    pub fn scale(&self, factor: f32) -> Self {
        let mut scaled = self.clone();
        scaled *= factor;
        scaled
    }

    /// Precoded value on `port` for one RE given one symbol per layer
    #[inline]
    pub fn apply(&self, port: usize, layer_symbols: &[Complex32]) -> Complex32 {
        self.weights
            .row(port)
            .iter()
            .zip(layer_symbols)
            .map(|(w, x)| w * x)
            .sum()
    }
}

impl MulAssign<f32> for PrecodingMatrix {
    fn mul_assign(&mut self, factor: f32) {
        self.weights.mapv_inplace(|w| w * factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let matrix = PrecodingMatrix::identity(2);
        assert_eq!((matrix.nof_ports(), matrix.nof_layers()), (2, 2));

        let symbols = [Complex32::new(1.0, 2.0), Complex32::new(-3.0, 0.5)];
        assert_eq!(matrix.apply(0, &symbols), symbols[0]);
        assert_eq!(matrix.apply(1, &symbols), symbols[1]);
    }

    #[test]
    fn test_scale_and_combine() {
        let weights = Array2::from_shape_vec(
            (2, 1),
            vec![Complex32::new(1.0, 0.0), Complex32::new(0.0, 1.0)],
        )
        .unwrap();
        let matrix = PrecodingMatrix::new(weights).scale(0.5);

        let symbol = [Complex32::new(2.0, 0.0)];
        assert_eq!(matrix.apply(0, &symbol), Complex32::new(1.0, 0.0));
        assert_eq!(matrix.apply(1, &symbol), Complex32::new(0.0, 1.0));
        assert_eq!(matrix.coefficient(1, 0), Complex32::new(0.0, 0.5));
    }

    #[test]
    fn test_identity_on_ports() {
        let matrix = PrecodingMatrix::identity_on_ports(1, 2);
        assert_eq!((matrix.nof_ports(), matrix.nof_layers()), (2, 1));
        assert_eq!(matrix.apply(1, &[Complex32::new(1.0, 1.0)]), Complex32::new(0.0, 0.0));
    }
}
