//! Container codec: clear JSON header + AEAD-encrypted archive payload.
//!
//! ```text
//! [JSON header, UTF-8, "\n\n"-terminated, <= 4096 bytes]
//! [encrypted archive: buffered (ZILANT) or streamed (ZSTR)]
//! ```

mod codec;
mod header;
#[cfg(unix)]
mod pipe;

pub use codec::ContainerCodec;
pub use header::{is_valid_container, read_header, ContainerHeader, Transport};
