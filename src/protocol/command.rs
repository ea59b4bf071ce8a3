//! Parsed client commands

use bytes::Bytes;

/// Commands understood by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Subscribe,
    Publish,
    Ping,
    Info,
    Quit,
    /// Anything else, carrying the upper-cased name
    Unknown(String),
}

impl CommandKind {
    /// Match a command name case-insensitively
    pub fn from_name(name: &[u8]) -> Self {
        let upper = String::from_utf8_lossy(name).to_ascii_uppercase();
        match upper.as_str() {
            "SUBSCRIBE" => CommandKind::Subscribe,
            "PUBLISH" => CommandKind::Publish,
            "PING" => CommandKind::Ping,
            "INFO" => CommandKind::Info,
            "QUIT" => CommandKind::Quit,
            _ => CommandKind::Unknown(upper),
        }
    }
}

/// A single request: the command name followed by its arguments
///
/// Arguments are slices of the frame they were read from, so holding on to
/// one (e.g. a channel name) does not copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Build a command from string parts (handy for clients and tests)
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            args: parts
                .into_iter()
                .map(|p| Bytes::copy_from_slice(p.as_ref()))
                .collect(),
        }
    }

    /// Positional argument, or an empty slice when absent
    ///
    /// Index 0 is the command name.
    pub fn arg(&self, index: usize) -> &[u8] {
        self.args.get(index).map(|b| b.as_ref()).unwrap_or_default()
    }

    /// Positional argument as shared bytes, empty when absent
    pub fn arg_bytes(&self, index: usize) -> Bytes {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// The command name as sent by the client
    pub fn name(&self) -> &[u8] {
        self.arg(0)
    }

    /// Command classification from the first element
    pub fn kind(&self) -> CommandKind {
        CommandKind::from_name(self.name())
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}
