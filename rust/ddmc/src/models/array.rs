use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::DataProcessingError;

/// Simple dense 2D array.
///
/// `values` is a flattened array of values
/// `ncols` is the number of values in each row
/// `nrows` is the number of rows
///
/// Note on memory layout:
///
/// Values that belong to the same row are adjacent
/// in memory. Rows are peptides for every matrix in this crate
/// (abundances, responsibilities, sequence scores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array2D<T: Clone + Copy> {
    values: Vec<T>,
    ncols: usize,
    nrows: usize,
}

impl<T: Clone + Copy> Array2D<T> {
    pub fn new<S: AsRef<[T]>, C: AsRef<[S]>>(values: C) -> Result<Array2D<T>, DataProcessingError> {
        let nrows = values.as_ref().len();
        if nrows == 0 {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("Array2D::new rows".to_string()),
            });
        }
        let ncols = values.as_ref()[0].as_ref().len();
        if ncols == 0 {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("Array2D::new columns".to_string()),
            });
        }

        let mut flat = Vec::with_capacity(nrows * ncols);
        for row in values.as_ref().iter() {
            if row.as_ref().len() != ncols {
                return Err(DataProcessingError::ExpectedSlicesSameLength {
                    expected: ncols,
                    other: row.as_ref().len(),
                    context: "Array2D::new".to_string(),
                });
            }
            flat.extend_from_slice(row.as_ref());
        }

        Ok(Array2D {
            values: flat,
            ncols,
            nrows,
        })
    }

    pub fn from_flat_vector(
        values: Vec<T>,
        nrows: usize,
        ncols: usize,
    ) -> Result<Array2D<T>, DataProcessingError> {
        if values.len() != nrows * ncols {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: nrows * ncols,
                other: values.len(),
                context: "Array2D::from_flat_vector".to_string(),
            });
        }
        Ok(Array2D {
            values,
            ncols,
            nrows,
        })
    }

    pub fn filled(value: T, nrows: usize, ncols: usize) -> Array2D<T> {
        Array2D {
            values: vec![value; nrows * ncols],
            ncols,
            nrows,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.values[row * self.ncols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.values[row * self.ncols + col] = value;
    }

    pub fn get_row(&self, index: usize) -> Option<&[T]> {
        let start = index * self.ncols;
        let end = start + self.ncols;
        if end > self.values.len() {
            return None;
        }
        Some(&self.values[start..end])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.values.chunks(self.ncols)
    }

    pub fn iter_mut_rows(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.values.chunks_mut(self.ncols)
    }

    /// Apply a function to each row of the array
    ///
    /// Example:
    /// ```
    /// use ddmc::models::Array2D;
    /// let array = Array2D::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
    /// let result: Vec<u32> = array.row_apply(|x| x.iter().sum()).collect();
    /// assert_eq!(result, vec![6, 15]);
    /// ```
    pub fn row_apply<'a: 'b, 'b, W, F: FnMut(&[T]) -> W + 'b>(
        &'a self,
        f: F,
    ) -> impl Iterator<Item = W> + 'b {
        self.values.chunks(self.ncols).map(f)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn to_nested(&self) -> Vec<Vec<T>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

impl Array2D<f64> {
    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|x| x.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_ragged_rows() {
        let out = Array2D::new(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            out,
            Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: 2,
                other: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_row_access() {
        let mut arr = Array2D::new(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(arr.nrows(), 3);
        assert_eq!(arr.ncols(), 2);
        assert_eq!(arr.get_row(1).unwrap(), &[3.0, 4.0]);
        assert!(arr.get_row(3).is_none());
        arr.set(2, 1, 10.0);
        assert_eq!(arr.get(2, 1), 10.0);
    }

    #[test]
    fn test_flat_vector_size_check() {
        assert!(Array2D::from_flat_vector(vec![0.0; 5], 2, 3).is_err());
        assert!(Array2D::from_flat_vector(vec![0.0; 6], 2, 3).is_ok());
    }
}
