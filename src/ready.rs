use std::{fmt, ops};

/// A set of readiness events.
///
/// `Ready` doubles as the interest mask a handler registers with the reactor
/// and as the decoded readiness delivered back to it. Values can be combined
/// with the bitwise operators.
///
/// # Examples
///
/// ```
/// use ael::Ready;
///
/// let ready = Ready::read() | Ready::write();
///
/// assert!(ready.is_read());
/// assert!(ready.is_write());
/// ```
#[derive(Copy, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct Ready(u8);

const READ: u8 = 0b0001;
const WRITE: u8 = 0b0010;
const STREAM: u8 = 0b0100;
const CLOSE: u8 = 0b1000;
const READY_ALL: u8 = READ | WRITE | STREAM | CLOSE;

impl Ready {
    /// Returns the empty `Ready` set.
    #[inline]
    pub fn empty() -> Ready {
        Ready(0)
    }

    /// Readiness (or interest) in the read direction.
    #[inline]
    pub fn read() -> Ready {
        Ready(READ)
    }

    /// Readiness (or interest) in the write direction.
    #[inline]
    pub fn write() -> Ready {
        Ready(WRITE)
    }

    /// Peer-closed detection for stream sockets.
    #[inline]
    pub fn stream() -> Ready {
        Ready(STREAM)
    }

    /// Loop-internal request for a full close of the event.
    #[inline]
    pub fn close() -> Ready {
        Ready(CLOSE)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Ready::empty()
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.contains(Ready::read())
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.contains(Ready::write())
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        self.contains(Ready::stream())
    }

    #[inline]
    pub fn is_close(&self) -> bool {
        self.contains(Ready::close())
    }

    /// Adds all readiness represented by `other` into `self`.
    #[inline]
    pub fn insert(&mut self, other: Ready) {
        self.0 |= other.0;
    }

    /// Removes all options represented by `other` from `self`.
    #[inline]
    pub fn remove(&mut self, other: Ready) {
        self.0 &= !other.0;
    }

    /// Returns true if `self` is a superset of `other`.
    #[inline]
    pub fn contains(&self, other: Ready) -> bool {
        (*self & other) == other
    }
}

impl ops::BitOr for Ready {
    type Output = Ready;

    #[inline]
    fn bitor(self, other: Ready) -> Ready {
        Ready(self.0 | other.0)
    }
}

impl ops::BitXor for Ready {
    type Output = Ready;

    #[inline]
    fn bitxor(self, other: Ready) -> Ready {
        Ready(self.0 ^ other.0)
    }
}

impl ops::BitAnd for Ready {
    type Output = Ready;

    #[inline]
    fn bitand(self, other: Ready) -> Ready {
        Ready(self.0 & other.0)
    }
}

impl ops::Sub for Ready {
    type Output = Ready;

    #[inline]
    fn sub(self, other: Ready) -> Ready {
        Ready(self.0 & !other.0)
    }
}

impl ops::Not for Ready {
    type Output = Ready;

    #[inline]
    fn not(self) -> Ready {
        Ready(!self.0 & READY_ALL)
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut one = false;
        let flags = [
            (Ready::read(), "Read"),
            (Ready::write(), "Write"),
            (Ready::stream(), "Stream"),
            (Ready::close(), "Close"),
        ];

        write!(fmt, "Ready {{")?;

        for &(flag, msg) in &flags {
            if self.contains(flag) {
                if one {
                    write!(fmt, " | ")?
                }
                write!(fmt, "{}", msg)?;

                one = true
            }
        }

        write!(fmt, "}}")?;

        Ok(())
    }
}
