//! Queue module: batch codec and the per-Kind retry queue.

mod codec;
mod retry;

pub use codec::{decode_batch, encode_batch};
pub use retry::{RetryQueue, queue_key};
