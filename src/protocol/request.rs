use bytes::{BufMut, Bytes, BytesMut};

/// A single command with its arguments, encoded as an array of bulk strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    parts: Vec<Bytes>,
}

impl Request {
    /// Start a request for the given command name
    pub fn cmd(name: &str) -> Self {
        Self {
            parts: vec![Bytes::copy_from_slice(name.as_bytes())],
        }
    }

    /// Append one argument
    pub fn arg(mut self, value: impl Into<Bytes>) -> Self {
        self.parts.push(value.into());
        self
    }

    /// Append every item of an iterator as a separate argument
    pub fn args<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        self.parts.extend(values.into_iter().map(Into::into));
        self
    }

    /// Command name as sent on the wire
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.parts[0]).into_owned()
    }

    /// Number of arguments, not counting the command name
    pub fn arg_count(&self) -> usize {
        self.parts.len() - 1
    }

    /// Encode into `*N\r\n` followed by `$len\r\n<bytes>\r\n` per part
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(b'*');
        buf.put_slice(self.parts.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        for part in &self.parts {
            buf.put_u8(b'$');
            buf.put_slice(part.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            buf.put_slice(part);
            buf.put_slice(b"\r\n");
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}
