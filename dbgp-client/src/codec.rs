// DBGP wire codec
//
// Outbound: command\n(flag\nvalue\n)*(arg\n)*\0
// Inbound:  10-digit ASCII length followed by that many bytes of XML

use crate::protocol::{DbgpError, DbgpResult, COMMAND_TERMINATOR, LENGTH_FIELD_WIDTH};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

pub const TRANSACTION_ID_FLAG: &str = "-i";

/// A single command sent to the debugger engine.
///
/// The transaction id is always the first option. Requests are immutable once
/// built; the builder methods consume and return the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    command: String,
    transaction_id: u32,
    options: Vec<(String, String)>,
    arguments: Vec<String>,
    is_async: bool,
}

impl Request {
    pub fn new(command: impl Into<String>, transaction_id: u32) -> Self {
        Self {
            command: command.into(),
            transaction_id,
            options: vec![(TRANSACTION_ID_FLAG.to_string(), transaction_id.to_string())],
            arguments: Vec::new(),
            is_async: false,
        }
    }

    /// A request whose outcome is observed through notify packets, not a response
    pub fn new_async(command: impl Into<String>, transaction_id: u32) -> Self {
        Self {
            is_async: true,
            ..Self::new(command, transaction_id)
        }
    }

    pub fn with_option(mut self, flag: impl Into<String>, value: impl ToString) -> Self {
        self.options.push((flag.into(), value.to_string()));
        self
    }

    pub fn with_optional(self, flag: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.with_option(flag, v),
            None => self,
        }
    }

    pub fn with_argument(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    pub fn option(&self, flag: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(f, _)| f == flag)
            .map(|(_, v)| v.as_str())
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(64);

        put_line(&mut buf, &self.command);
        for (flag, value) in &self.options {
            put_line(&mut buf, flag);
            put_line(&mut buf, value);
        }
        for arg in &self.arguments {
            put_line(&mut buf, arg);
        }
        buf.put_u8(COMMAND_TERMINATOR);

        buf.to_vec()
    }

    /// Decode one outbound frame, with or without its trailing terminator
    pub fn decode(bytes: &[u8]) -> DbgpResult<Self> {
        let bytes = bytes.strip_suffix(&[COMMAND_TERMINATOR]).unwrap_or(bytes);
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DbgpError::Protocol(format!("Invalid UTF-8 in command: {}", e)))?;

        let mut lines = text.strip_suffix('\n').unwrap_or(text).split('\n');
        let command = lines
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DbgpError::protocol("Empty command frame"))?;

        let mut options = Vec::new();
        let mut arguments = Vec::new();
        while let Some(line) = lines.next() {
            if line.starts_with('-') {
                let value = lines.next().ok_or_else(|| {
                    DbgpError::Protocol(format!("Option '{}' has no value", line))
                })?;
                options.push((line.to_string(), value.to_string()));
            } else {
                arguments.push(line.to_string());
            }
        }

        let transaction_id = options
            .iter()
            .find(|(f, _)| f == TRANSACTION_ID_FLAG)
            .and_then(|(_, v)| v.parse::<u32>().ok())
            .ok_or_else(|| DbgpError::Protocol(format!("Command '{}' has no transaction id", command)))?;

        Ok(Self {
            command: command.to_string(),
            transaction_id,
            options,
            arguments,
            is_async: false,
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for (flag, value) in &self.options {
            write!(f, " {} {}", flag, value)?;
        }
        if !self.arguments.is_empty() {
            write!(f, " -- {}", self.arguments.join(" "))?;
        }
        Ok(())
    }
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
}

/// Read exactly `len` bytes and decode them as UTF-8.
///
/// Returns `None` when the stream ends first. With a read timeout set, the
/// first timeout is retried; a second one returns whatever has been read so
/// far instead of failing.
pub async fn read_fixed<R>(
    reader: &mut R,
    len: usize,
    read_timeout: Option<Duration>,
) -> DbgpResult<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    let mut timed_out = false;

    while filled < len {
        let read = reader.read(&mut buf[filled..]);
        let n = match read_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) if !timed_out => {
                    debug!("Read timed out after {} of {} bytes, retrying", filled, len);
                    timed_out = true;
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Read timed out twice after {} of {} bytes, returning partial data",
                        filled, len
                    );
                    return Ok(Some(String::from_utf8_lossy(&buf[..filled]).into_owned()));
                }
            },
            None => read.await?,
        };

        if n == 0 {
            return Ok(None);
        }
        filled += n;
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Parse the fixed-width length field; `None` for anything non-numeric
pub fn parse_length(field: &str) -> Option<usize> {
    let trimmed = field.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<usize>().ok()
}

/// Read one inbound packet payload.
///
/// `Ok(None)` means no more data: either the stream ended or the length field
/// did not parse.
pub async fn read_packet<R>(
    reader: &mut R,
    max_packet_size: usize,
    read_timeout: Option<Duration>,
) -> DbgpResult<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let header = match read_fixed(reader, LENGTH_FIELD_WIDTH, None).await? {
        Some(header) => header,
        None => return Ok(None),
    };

    let length = match parse_length(&header) {
        Some(length) => length,
        None => {
            warn!("Unparseable length field {:?}, treating as end of stream", header);
            return Ok(None);
        }
    };

    if length > max_packet_size {
        return Err(DbgpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, max_packet_size
        )));
    }

    read_fixed(reader, length, read_timeout).await
}

/// Frame an XML payload the way an engine puts it on the wire
pub fn encode_packet(xml: &str) -> Vec<u8> {
    let payload = xml.as_bytes();
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_WIDTH + payload.len());
    buf.put_slice(format!("{:0width$}", payload.len(), width = LENGTH_FIELD_WIDTH).as_bytes());
    buf.put_slice(payload);
    buf.to_vec()
}

/// Read one outbound command frame (engine side, or a proxy in between)
pub async fn read_request<R>(reader: &mut R) -> DbgpResult<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    let n = reader.read_until(COMMAND_TERMINATOR, &mut frame).await?;
    if n == 0 || frame.last() != Some(&COMMAND_TERMINATOR) {
        return Ok(None);
    }
    Request::decode(&frame).map(Some)
}
