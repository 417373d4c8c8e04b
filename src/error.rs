//! Engine error kinds and the session-terminating [`Error`] type.

use displaydoc::Display;

/// Engine result type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised while driving the RFCOMM control channel.
///
/// Most kinds terminate the session (see the policy table next to each variant); a terminated
/// session is not resumed, the event loop ([crate::engine]) exits and the caller is expected to
/// run its cleanup hook (releasing the shared transport).
#[derive(Debug, Display)]
pub enum Error {
    /// malformed AT frame: {0}
    ///
    /// The AT grammar parser rejected the bytes at the reader cursor. The session continues;
    /// the offending bytes are dropped and the cursor is cleared.
    BadMessage(String),
    /// peer replied ERROR to `{0}`
    ///
    /// An SLC command we sent was rejected by the peer. Terminates the session.
    NotSupported(String),
    /// connection reset
    ///
    /// Zero-length read, or `POLLERR`/`POLLHUP` on the RFCOMM descriptor. Terminates the
    /// session.
    ConnReset,
    /// SLC handshake timed out in state {0:?}
    ///
    /// The SLC driver exceeded its retry budget. Terminates the session.
    TimedOut(crate::slc::HfpState),
    /// I/O error: {0}
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Error kind, for callers that want to match without the associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::BadMessage`].
    BadMessage,
    /// See [`Error::NotSupported`].
    NotSupported,
    /// See [`Error::ConnReset`].
    ConnReset,
    /// See [`Error::TimedOut`].
    TimedOut,
    /// See [`Error::Io`].
    Io,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadMessage(_) => ErrorKind::BadMessage,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::ConnReset => ErrorKind::ConnReset,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error terminates the session per the engine's error handling policy.
    ///
    /// `BadMessage` and best-effort I/O errors are handled inline by the caller and never
    /// constructed as a reason to exit the loop; everything else that reaches the top of the
    /// event loop does end the session.
    pub fn terminates_session(&self) -> bool {
        !matches!(self, Self::BadMessage(_))
    }
}
