//! Buffer set shared between a runtime shell and the state machines it drives.

/// Buffers a driving loop hands to a state machine's `step()` call.
pub struct BufferSet {
    /// Read buffer for the most recently read message's payload.
    pub read_buffer: Vec<u8>,
    /// Type byte of the last message read (0 for startup/SSL-request messages).
    pub type_byte: u8,
    /// Scratch buffer the state machine fills with outgoing bytes on `Action::Write*`.
    pub write_buffer: Vec<u8>,
    /// Holds a RowDescription payload across the rows of a result set, since
    /// `DataRow` decoding needs the column types but the server doesn't repeat them.
    pub column_buffer: Vec<u8>,
    /// Reject any incoming message whose declared length exceeds this, before
    /// allocating a buffer for it. Set from `Opts::max_message_size`.
    pub max_message_size: u32,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            type_byte: 0,
            write_buffer: Vec::with_capacity(8192),
            column_buffer: Vec::new(),
            max_message_size: 1 << 30,
        }
    }

    /// Create a buffer set enforcing a caller-chosen maximum message length.
    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            max_message_size,
            ..Self::new()
        }
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
