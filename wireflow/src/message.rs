//! Application message payloads.
//!
//! A message body is either seekable (in-memory bytes with a cursor) or an
//! opaque one-shot reader. Once a non-seekable body has been read it cannot
//! be replayed, which is the hard boundary the retry overlay polices: a
//! consumed stream that cannot be rewound must never be resent.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

/// The body stream of a [`Message`].
pub enum Body {
    /// In-memory bytes with an explicit cursor position.
    Seekable {
        /// The full payload.
        bytes: Vec<u8>,
        /// Current read position within `bytes`.
        position: u64,
    },
    /// An opaque one-shot reader that cannot be rewound.
    Streamed(Box<dyn Read + Send>),
}

impl Body {
    /// Returns true if the body can be repositioned.
    #[must_use]
    pub fn can_seek(&self) -> bool {
        matches!(self, Self::Seekable { .. })
    }

    /// Returns the current stream position, or `None` if non-seekable.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        match self {
            Self::Seekable { position, .. } => Some(*position),
            Self::Streamed(_) => None,
        }
    }

    /// Attempts to reposition the body to `pos`.
    ///
    /// Returns false for non-seekable bodies and for positions past the end
    /// of the payload.
    pub fn try_reset(&mut self, pos: u64) -> bool {
        match self {
            Self::Seekable { bytes, position } => {
                if pos <= bytes.len() as u64 {
                    *position = pos;
                    true
                } else {
                    false
                }
            }
            Self::Streamed(_) => false,
        }
    }

    /// Reads the remainder of the body into a buffer, advancing the cursor.
    pub fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        match self {
            Self::Seekable { bytes, position } => {
                let start = usize::try_from(*position).unwrap_or(bytes.len());
                let out = bytes.get(start..).unwrap_or_default().to_vec();
                *position = bytes.len() as u64;
                Ok(out)
            }
            Self::Streamed(reader) => {
                let mut out = Vec::new();
                reader.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seekable { bytes, position } => f
                .debug_struct("Seekable")
                .field("len", &bytes.len())
                .field("position", position)
                .finish(),
            Self::Streamed(_) => f.debug_struct("Streamed").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
struct BodyState {
    body: Body,
    read: bool,
}

/// An application payload flowing through the pipeline.
///
/// Sends take `&Message` so a value can be shared across retry attempts;
/// the body sits behind a mutex because the retry overlay repositions it
/// between attempts while the transport reads it.
#[derive(Debug)]
pub struct Message {
    state: Mutex<BodyState>,
    lock_token: Option<String>,
    properties: HashMap<String, String>,
}

impl Message {
    /// Creates a message with a seekable in-memory body.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_body(Body::Seekable {
            bytes: bytes.into(),
            position: 0,
        })
    }

    /// Creates a message with a non-seekable body.
    #[must_use]
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self::with_body(Body::Streamed(reader))
    }

    fn with_body(body: Body) -> Self {
        Self {
            state: Mutex::new(BodyState { body, read: false }),
            lock_token: None,
            properties: HashMap::new(),
        }
    }

    /// Sets the lock token used by acknowledgement operations.
    #[must_use]
    pub fn with_lock_token(mut self, token: impl Into<String>) -> Self {
        self.lock_token = Some(token.into());
        self
    }

    /// Adds an application property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the lock token, if any.
    #[must_use]
    pub fn lock_token(&self) -> Option<&str> {
        self.lock_token.as_deref()
    }

    /// Returns an application property by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns true if the body has been read by a prior attempt.
    #[must_use]
    pub fn is_body_read(&self) -> bool {
        self.state.lock().read
    }

    /// Returns the body's current position, or `None` if non-seekable.
    #[must_use]
    pub fn observed_position(&self) -> Option<u64> {
        self.state.lock().body.position()
    }

    /// Attempts to reposition the body to `pos`; see [`Body::try_reset`].
    pub fn try_reset_body(&self, pos: u64) -> bool {
        self.state.lock().body.try_reset(pos)
    }

    /// Reads the remainder of the body, marking it as read.
    pub fn read_body(&self) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.read = true;
        state.body.read_remaining()
    }
}
