use bytes::Bytes;

/// Deepest array nesting accepted in a reply
pub const MAX_DEPTH: usize = 64;

/// Upper bound on elements reserved up front for an array reply
const MAX_PREALLOC: usize = 1024;

/// Errors raised while decoding a reply frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown reply type byte: 0x{0:02x}")]
    UnknownType(u8),

    #[error("Invalid length or integer in reply: {0}")]
    InvalidInteger(String),

    #[error("Bulk string is not terminated by CRLF")]
    MissingTerminator,

    #[error("Reply line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Reply arrays nested deeper than {0} levels")]
    TooDeep(usize),
}

/// One decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    /// `None` is the nil bulk string (`$-1`)
    Bulk(Option<Bytes>),
    /// `None` is the nil array (`*-1`)
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Decode one reply from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame, so the
    /// caller can read more bytes and try again. On success the second tuple
    /// element is the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
        Self::parse_nested(buf, 0)
    }

    fn parse_nested(buf: &[u8], depth: usize) -> Result<Option<(Reply, usize)>, ProtocolError> {
        let Some(line_end) = find_crlf(buf, 1) else {
            return Ok(None);
        };
        let line = &buf[1..line_end];
        let after_line = line_end + 2;

        match buf[0] {
            b'+' => Ok(Some((Reply::Status(utf8(line)?), after_line))),
            b'-' => Ok(Some((Reply::Error(utf8(line)?), after_line))),
            b':' => Ok(Some((Reply::Integer(integer(line)?), after_line))),
            b'$' => {
                let len = integer(line)?;
                if len < 0 {
                    return Ok(Some((Reply::Bulk(None), after_line)));
                }
                let len = len as usize;
                let end = after_line.saturating_add(len);
                if buf.len() < end.saturating_add(2) {
                    return Ok(None);
                }
                if &buf[end..end + 2] != b"\r\n" {
                    return Err(ProtocolError::MissingTerminator);
                }
                let data = Bytes::copy_from_slice(&buf[after_line..end]);
                Ok(Some((Reply::Bulk(Some(data)), end + 2)))
            }
            b'*' => {
                let count = integer(line)?;
                if count < 0 {
                    return Ok(Some((Reply::Array(None), after_line)));
                }
                if depth >= MAX_DEPTH {
                    return Err(ProtocolError::TooDeep(MAX_DEPTH));
                }
                // The length is server supplied; grow past the reservation as items arrive
                let mut items = Vec::with_capacity((count as usize).min(MAX_PREALLOC));
                let mut offset = after_line;
                for _ in 0..count {
                    match Reply::parse_nested(&buf[offset..], depth + 1)? {
                        Some((item, used)) => {
                            items.push(item);
                            offset += used;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((Reply::Array(Some(items)), offset)))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Text of a status or bulk reply
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bulk(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(e) => write!(f, "(error) {}", e),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(None) | Reply::Array(None) => write!(f, "(nil)"),
            Reply::Bulk(Some(b)) => write!(f, "\"{}\"", String::from_utf8_lossy(b)),
            Reply::Array(Some(items)) => {
                if items.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + 2 {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| p + from)
}

fn utf8(line: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

fn integer(line: &[u8]) -> Result<i64, ProtocolError> {
    let text = utf8(line)?;
    text.parse()
        .map_err(|_| ProtocolError::InvalidInteger(text))
}
