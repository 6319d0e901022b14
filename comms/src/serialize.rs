use std::io;

/// Types that can be written as the body of a frame.
pub trait Serialize<'a> {
    /// Writes the owned part of the body into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to extend, it may already hold the frame's length prefix.
    ///
    /// # Returns
    /// An optional borrowed tail that must be sent right after `buf` without copying it,
    /// or an io error if the body couldn't be encoded.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
