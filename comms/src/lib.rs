//! Length prefixed message framing between the federated server and its clients.
//!
//! Every frame is a `u64` big endian body length followed by the body, see `msg::Msg`
//! for the body layout.

mod align;
mod deserialize;
pub mod msg;
pub mod params;
mod receiver;
pub mod scalar;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::{Align1, Align4};
pub use deserialize::Deserialize;
pub use params::{Parameters, ParamsView};
pub use receiver::MsgReceiver;
pub use scalar::{Config, Metrics, Scalar};
pub use sender::MsgSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The largest frame body a receiver accepts.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Creates both `MsgReceiver` and `MsgSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a message receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (MsgReceiver<R>, MsgSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (MsgReceiver::new(rx), MsgSender::new(tx))
}
