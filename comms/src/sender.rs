use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize};

/// Writes messages as length prefixed frames.
///
/// The serialized head of every message is staged in a reused buffer together with
/// the frame length, a borrowed tail (the parameter values) is written right after it
/// without copying.
pub struct MsgSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    staging: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> MsgSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            staging: Vec::new(),
        }
    }

    /// Sends `msg` as a single frame and flushes the writer.
    ///
    /// # Errors
    /// If `msg` can't be serialized, its frame is larger than a receiver
    /// accepts, or writing fails. Nothing is written on the first two.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.staging.clear();
        self.staging.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let tail = msg.serialize(&mut self.staging)?;
        let tail = tail.unwrap_or_default();

        let len = frame_len(self.staging.len() - LEN_TYPE_SIZE, tail.len())?;
        self.staging[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());

        self.tx.write_all(&self.staging).await?;
        if !tail.is_empty() {
            self.tx.write_all(tail).await?;
        }

        self.tx.flush().await
    }
}

/// The body length of a frame made of a `head` and a `tail` byte count.
fn frame_len(head: usize, tail: usize) -> io::Result<LenType> {
    match head.checked_add(tail) {
        Some(len) if len <= MAX_FRAME_LEN => Ok(len as LenType),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame exceeds the limit of {MAX_FRAME_LEN} bytes"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_adds_head_and_tail() {
        assert_eq!(frame_len(4, 12).unwrap(), 16);
        assert_eq!(frame_len(MAX_FRAME_LEN, 0).unwrap(), MAX_FRAME_LEN as LenType);
    }

    #[test]
    fn oversized_frames_are_refused() {
        let err = frame_len(MAX_FRAME_LEN, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(frame_len(usize::MAX, 1).is_err());
    }
}
