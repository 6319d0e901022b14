//! The parameter payload: an ordered list of dense `f32` tensors.
//!
//! On the wire a payload is a `u32` tensor count, then for every tensor its `u32` rank
//! followed by its `u32` dimensions, and finally every value in native byte order.
//! All header fields are 4 bytes wide so the values stay 4 byte aligned.

use std::io;

type Field = u32;
const FIELD_SIZE: usize = size_of::<Field>();

/// Owned model parameters, stored flat in row-major order, tensor after tensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    shapes: Vec<Vec<usize>>,
    values: Vec<f32>,
}

/// Borrowed model parameters, as decoded from a received frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsView<'a> {
    shapes: Vec<Vec<usize>>,
    values: &'a [f32],
}

/// The amount of values in a tensor of `shape`, `None` if it doesn't fit in a `usize`.
fn numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// The amount of values all of `shapes` hold together.
fn total_len(shapes: &[Vec<usize>]) -> io::Result<usize> {
    shapes
        .iter()
        .try_fold(0usize, |acc, shape| acc.checked_add(numel(shape)?))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "parameter shapes describe more values than addressable",
            )
        })
}

fn check_sizes(shapes: &[Vec<usize>], values: usize) -> io::Result<()> {
    let expected = total_len(shapes)?;

    if expected != values {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("parameter shapes describe {expected} values but {values} were given"),
        ));
    }

    Ok(())
}

impl Parameters {
    /// Creates a new `Parameters`.
    ///
    /// # Arguments
    /// * `shapes` - The shape of every tensor, in order.
    /// * `values` - All the values, concatenated in tensor order.
    ///
    /// # Returns
    /// The parameters or an `InvalidData` error if the shapes don't cover exactly `values`.
    pub fn new(shapes: Vec<Vec<usize>>, values: Vec<f32>) -> io::Result<Self> {
        check_sizes(&shapes, values.len())?;
        Ok(Self { shapes, values })
    }

    /// Builds parameters out of `(shape, values)` pairs.
    pub fn from_tensors<I>(tensors: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = (Vec<usize>, Vec<f32>)>,
    {
        let mut shapes = Vec::new();
        let mut values = Vec::new();

        for (shape, data) in tensors {
            check_sizes(std::slice::from_ref(&shape), data.len())?;
            shapes.push(shape);
            values.extend(data);
        }

        Ok(Self { shapes, values })
    }

    /// A zeroed set of parameters with the given shapes.
    ///
    /// # Returns
    /// The parameters or an `InvalidData` error if the shapes hold more values than
    /// a `usize` can count.
    pub fn zeros(shapes: Vec<Vec<usize>>) -> io::Result<Self> {
        let len = total_len(&shapes)?;
        Ok(Self {
            shapes,
            values: vec![0.0; len],
        })
    }

    /// The total amount of scalar values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Returns the `i`-th tensor as its shape and flat values.
    pub fn tensor(&self, i: usize) -> Option<(&[usize], &[f32])> {
        let shape = self.shapes.get(i)?;
        let start = total_len(&self.shapes[..i]).ok()?;
        let end = start.checked_add(numel(shape)?)?;
        Some((shape, self.values.get(start..end)?))
    }

    /// Borrows these parameters for sending.
    pub fn view(&self) -> ParamsView<'_> {
        ParamsView {
            shapes: self.shapes.clone(),
            values: &self.values,
        }
    }
}

impl<'a> ParamsView<'a> {
    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    pub fn values(&self) -> &'a [f32] {
        self.values
    }

    /// Copies the borrowed values into an owned `Parameters`.
    pub fn to_owned(&self) -> Parameters {
        Parameters {
            shapes: self.shapes.clone(),
            values: self.values.to_vec(),
        }
    }

    /// Writes the shape header into `buf` and returns the values to send without copying.
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) -> io::Result<&'a [u8]> {
        let field = |n: usize| {
            Field::try_from(n).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{n} doesn't fit in a parameter header field"),
                )
            })
        };

        buf.extend_from_slice(&field(self.shapes.len())?.to_be_bytes());

        for shape in &self.shapes {
            buf.extend_from_slice(&field(shape.len())?.to_be_bytes());

            for &dim in shape {
                buf.extend_from_slice(&field(dim)?.to_be_bytes());
            }
        }

        Ok(bytemuck::cast_slice(self.values))
    }

    /// Parses a payload previously written by `encode`.
    ///
    /// # Returns
    /// The view or an `InvalidData` error if the payload is truncated, misaligned
    /// or its shapes don't match the amount of values.
    pub(crate) fn decode(buf: &'a [u8]) -> io::Result<Self> {
        let mut cursor = 0;
        let mut next = || -> io::Result<usize> {
            let bytes = buf.get(cursor..cursor + FIELD_SIZE).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "truncated parameter header")
            })?;

            cursor += FIELD_SIZE;

            // SAFETY: `bytes` was just sliced to `FIELD_SIZE` bytes.
            Ok(Field::from_be_bytes(bytes.try_into().unwrap()) as usize)
        };

        let count = next()?;
        let mut shapes = Vec::with_capacity(count.min(64));

        for _ in 0..count {
            let rank = next()?;
            let shape = (0..rank).map(|_| next()).collect::<io::Result<Vec<_>>>()?;
            shapes.push(shape);
        }

        let rest = &buf[cursor..];
        let values: &[f32] = bytemuck::try_cast_slice(rest).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid parameter values: {e:?}"),
            )
        })?;

        check_sizes(&shapes, values.len())?;
        Ok(Self { shapes, values })
    }
}

impl From<ParamsView<'_>> for Parameters {
    fn from(view: ParamsView<'_>) -> Self {
        Parameters {
            shapes: view.shapes,
            values: view.values.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shapes_not_covering_values() {
        let err = Parameters::new(vec![vec![2, 3], vec![2]], vec![0.0; 7]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn tensor_slices_follow_the_shapes() {
        let params = Parameters::from_tensors([
            (vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]),
            (vec![2], vec![5.0, 6.0]),
        ])
        .unwrap();

        assert_eq!(params.len(), 6);
        assert_eq!(params.tensor(0), Some((&[2, 2][..], &[1.0, 2.0, 3.0, 4.0][..])));
        assert_eq!(params.tensor(1), Some((&[2][..], &[5.0, 6.0][..])));
        assert_eq!(params.tensor(2), None);
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let buf = [0u8, 0, 0, 2, 0, 0];
        assert!(ParamsView::decode(&buf).is_err());
    }

    fn header(fields: &[u32]) -> Vec<u32> {
        fields.iter().map(|f| u32::from_ne_bytes(f.to_be_bytes())).collect()
    }

    #[test]
    fn decode_rejects_shapes_overflowing_usize() {
        let buf = header(&[1, 4, 65536, 65536, 65536, 65536]);

        let err = ParamsView::decode(bytemuck::cast_slice(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_rejects_values_not_a_multiple_of_four_bytes() {
        let buf = header(&[1, 1, 2, 0, 0]);
        let bytes: &[u8] = bytemuck::cast_slice(&buf);

        // One tensor of 2 values followed by 6 value bytes.
        let err = ParamsView::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn zeros_rejects_overflowing_shapes() {
        let err = Parameters::zeros(vec![vec![usize::MAX, 2]]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
