//! Matrix conversion utilities for the fidfit-rs library.
//!
//! Public data lives in ndarray types; decompositions (SVD, Schur, Cholesky,
//! symmetric eigen-decomposition) are done with nalgebra. This module moves
//! real and complex matrices between the two.

use nalgebra::{DMatrix, DVector, Scalar};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

// === ndarray <-> nalgebra conversions ===

/// Convert an ndarray matrix to a nalgebra DMatrix.
///
/// # Arguments
///
/// * `arr` - The ndarray matrix (owned or view) to convert
///
/// # Returns
///
/// * A nalgebra DMatrix with the same data
pub fn ndarray_to_nalgebra<T: Scalar>(arr: ArrayView2<'_, T>) -> DMatrix<T> {
    // ndarray is row-major by default, nalgebra is column-major
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]].clone())
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
///
/// # Arguments
///
/// * `mat` - The nalgebra DMatrix to convert
///
/// # Returns
///
/// * An ndarray Array2 with the same data
pub fn nalgebra_to_ndarray<T: Scalar>(mat: &DMatrix<T>) -> Array2<T> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)].clone())
}

/// Convert an ndarray vector to a nalgebra DVector.
pub fn ndarray_vec_to_nalgebra<T: Scalar>(arr: ArrayView1<'_, T>) -> DVector<T> {
    DVector::from_iterator(arr.len(), arr.iter().cloned())
}

/// Convert a nalgebra DVector to an ndarray Array1.
pub fn nalgebra_vec_to_ndarray<T: Scalar>(vec: &DVector<T>) -> Array1<T> {
    vec.iter().cloned().collect()
}
