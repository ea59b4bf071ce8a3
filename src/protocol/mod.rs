//! RESP (REdis Serialization Protocol) codec
//!
//! Requests arrive either as multi-bulk arrays or as inline commands:
//!
//! ```text
//! *3\r\n$7\r\nPUBLISH\r\n$4\r\nnews\r\n$5\r\nhello\r\n     (multi-bulk)
//! PUBLISH news hello\r\n                                  (inline)
//! ```
//!
//! Replies use the five RESP types: simple string (`+`), error (`-`),
//! integer (`:`), bulk string (`$`) and array (`*`).
//!
//! Reference: <https://redis.io/docs/reference/protocol-spec/>

pub mod command;
pub mod constants;
pub mod reader;
pub mod value;
pub mod writer;

pub use command::{Command, CommandKind};
pub use reader::{parse_command, CommandReader};
pub use value::RespValue;
pub use writer::RespWriter;
