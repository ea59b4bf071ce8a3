//! Protocol constants

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Maximum number of elements in a multi-bulk request
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Maximum size of a single bulk string (512 MiB, same as Redis)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Maximum size of an inline request line
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Prefix prepended to every error reply
pub const ERROR_PREFIX: &str = "ERR ";

/// Kind marker of a fanned-out message frame
pub const MESSAGE_KIND: &[u8] = b"message";

/// Kind marker of a subscribe acknowledgement
pub const SUBSCRIBE_KIND: &[u8] = b"subscribe";
