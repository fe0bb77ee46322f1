//! Byte-cursor reader over a `&[u8]` slice, tracking its own location for informative errors.

use crate::{Error, ErrorDetails, Result};

/// Simple reader state for extracting data from a `&[u8]` slice.
///
/// Unlike the [`std::io::Read`] implementation for `&[u8]`, this keeps track of the location
/// within the packet for more informative errors via [`Result`].
#[derive(Debug)]
pub struct SliceReader<'a> {
    slice: &'a [u8],
    location: usize,
}

impl<'a> SliceReader<'a> {
    /// Initializes a reader from any byte slice.
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice, location: 0 }
    }

    /// Creates a fixed `length` sub-reader at the current position, then advances this reader to
    /// the sub-reader's end position.
    ///
    /// The sub-reader semantic makes reading nested data of known lengths easier with correct
    /// bounds checking of the nested data.
    pub fn new_sub_reader(&mut self, length: usize) -> Result<Self> {
        let location = self.location;
        Ok(Self {
            slice: self.read(length)?,
            location,
        })
    }

    /// Creates an [`Error`] using the contained location.
    pub fn make_error(&self, details: ErrorDetails) -> Error {
        Error::new(self.location, details)
    }

    /// Number of bytes remaining in the slice reader.
    pub fn remaining_len(&self) -> usize {
        self.slice.len()
    }

    /// Advance reader without extracting any data from the slice.
    pub fn skip(&mut self, length: usize) -> Result<()> {
        if length > self.slice.len() {
            Err(self.make_error(ErrorDetails::PacketOverrun(length)))
        } else {
            self.location += length;
            self.slice = &self.slice[length..];
            Ok(())
        }
    }

    /// Extract a fixed `length` sub-slice from this reader and advance.
    pub fn read(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(self.make_error(ErrorDetails::PacketOverrun(length)))
        } else {
            self.location += length;
            let (left, right) = self.slice.split_at(length);
            self.slice = right;
            Ok(left)
        }
    }

    /// Extract a sub-slice of all data remaining to be read.
    pub fn read_to_end(&mut self) -> Result<&'a [u8]> {
        self.read(self.slice.len())
    }

    /// Same as [`SliceReader::read`] but also converts the slice to an array reference of length
    /// `N`.
    #[allow(unsafe_code)]
    pub fn read_array_ref<const N: usize>(&mut self) -> Result<&'a [u8; N]> {
        unsafe {
            // Bounds checking performed by read()
            Ok(&*(self.read(N)?.as_ptr() as *const [u8; N]))
        }
    }

    /// Read one byte interpreted as [`u8`].
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array_ref::<1>()?[0])
    }

    /// Read two bytes interpreted as big-endian [`u16`].
    pub fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(*self.read_array_ref::<2>()?))
    }

    /// Extract a fixed `length` sub-slice from this reader without advancing.
    pub fn peek(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(self.make_error(ErrorDetails::PacketOverrun(length)))
        } else {
            Ok(&self.slice[0..length])
        }
    }

    /// Same as [`SliceReader::peek`] but also converts the slice to an array reference of length
    /// `N`.
    #[allow(unsafe_code)]
    pub fn peek_array_ref<const N: usize>(&mut self) -> Result<&'a [u8; N]> {
        unsafe {
            // Bounds checking performed by peek()
            Ok(&*(self.peek(N)?.as_ptr() as *const [u8; N]))
        }
    }
}

/// Convenience macro to read a modular bitfield from a [`SliceReader`].
///
/// Wraps [`SliceReader::read_array_ref`] to read the exact number of bytes required by the
/// bitfield type. Must be expanded in a function that returns [`Result`].
#[macro_export]
macro_rules! read_bitfield {
    ($reader:expr, $type:ty) => {
        <$type>::from_bytes(*$reader.read_array_ref::<{ std::mem::size_of::<$type>() }>()?)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_advances() {
        let data = [1u8, 2, 3, 4, 5];
        let mut r = SliceReader::new(&data);
        assert_eq!(r.read(2).unwrap(), &[1, 2]);
        assert_eq!(r.remaining_len(), 3);
        assert_eq!(r.read_to_end().unwrap(), &[3, 4, 5]);
    }

    #[test]
    fn overrun_is_an_error() {
        let data = [1u8];
        let mut r = SliceReader::new(&data);
        assert!(r.read(2).is_err());
    }

    #[test]
    fn sub_reader_is_bounds_checked() {
        let data = [1u8, 2, 3, 4];
        let mut r = SliceReader::new(&data);
        let mut sub = r.new_sub_reader(2).unwrap();
        assert_eq!(sub.read_to_end().unwrap(), &[1, 2]);
        assert_eq!(r.read_to_end().unwrap(), &[3, 4]);
    }
}
