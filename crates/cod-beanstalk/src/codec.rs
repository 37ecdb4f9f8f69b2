use std::io::{BufRead, Read};

use bytes::{Buf, BufMut, BytesMut};
use cod_channel::{CodecError, ProtocolError, Serializer};
use tracing::trace;

use crate::command::{Arg, Command};
use crate::error::Result;
use crate::table;

/// Longest header line beanstalkd accepts, without the CRLF.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 224;

/// beanstalkd's default job size limit.
pub const DEFAULT_MAX_BODY_SIZE: usize = 65_535;

const CRLF: &[u8; 2] = b"\r\n";

/// Limits applied while decoding.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum header line length in bytes, CRLF excluded. Default: 224.
    pub max_line_length: usize,
    /// Maximum body size in bytes. Default: 65535.
    pub max_body_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// <keyword> <arg> ... <arg>\r\n
/// <body>\r\n                      (body-bearing keywords only)
/// ```
/// The body length is inserted as the argument at the keyword's table
/// position. Nothing is written to `dst` on error.
pub fn encode_command(cmd: &Command, dst: &mut BytesMut) -> std::result::Result<(), ProtocolError> {
    check_token(&cmd.keyword)?;
    for arg in &cmd.args {
        if let Arg::Text(text) = arg {
            check_token(text)?;
        }
    }

    let length_at = match (table::body_position(&cmd.keyword), &cmd.body) {
        (Some(position), Some(_)) => {
            if cmd.args.len() < position - 1 {
                return Err(ProtocolError::MissingBodyLength {
                    keyword: cmd.keyword.clone(),
                    index: position,
                    found: cmd.args.len(),
                });
            }
            Some(position - 1)
        }
        (Some(_), None) => {
            return Err(ProtocolError::MissingBody {
                keyword: cmd.keyword.clone(),
            })
        }
        (None, Some(_)) => {
            return Err(ProtocolError::UnexpectedBody {
                keyword: cmd.keyword.clone(),
            })
        }
        (None, None) => None,
    };

    let body = cmd.body.as_deref().unwrap_or_default();
    let mut header = cmd.keyword.clone();
    for (i, arg) in cmd.args.iter().enumerate() {
        if length_at == Some(i) {
            header.push(' ');
            header.push_str(&body.len().to_string());
        }
        header.push(' ');
        header.push_str(&arg.to_string());
    }
    if length_at == Some(cmd.args.len()) {
        header.push(' ');
        header.push_str(&body.len().to_string());
    }

    dst.reserve(header.len() + body.len() + 2 * CRLF.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(CRLF);
    if length_at.is_some() {
        dst.put_slice(body);
        dst.put_slice(CRLF);
    }
    Ok(())
}

/// Decode one command from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete command yet;
/// nothing is consumed in that case. On success, consumes the command's
/// bytes (header, body and both terminators).
pub fn decode_command(
    src: &mut BytesMut,
    config: &CodecConfig,
) -> std::result::Result<Option<Command>, ProtocolError> {
    let Some(header) = parse_header(src, config)? else {
        return Ok(None);
    };

    let Some(body_len) = header.body_len else {
        src.advance(header.line_len);
        return Ok(Some(header.command));
    };

    let total = header.line_len + body_len + CRLF.len();
    if src.len() < total {
        return Ok(None);
    }
    if &src[total - CRLF.len()..total] != CRLF {
        return Err(ProtocolError::MissingTerminator);
    }

    src.advance(header.line_len);
    let body = src.split_to(body_len).freeze();
    src.advance(CRLF.len());

    let mut command = header.command;
    command.body = Some(body);
    Ok(Some(command))
}

/// Pull one command from a reader.
///
/// Returns `Ok(None)` if the reader is at end of stream before the first
/// byte. A stream that ends inside a command is a protocol error.
pub fn read_command<R: BufRead>(reader: &mut R, config: &CodecConfig) -> Result<Option<Command>> {
    let limit = config.max_line_length + CRLF.len();
    let mut line = Vec::new();
    reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut line)?;

    if line.is_empty() {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(if line.len() >= limit {
            ProtocolError::LineTooLong {
                max: config.max_line_length,
            }
        } else {
            ProtocolError::Truncated {
                buffered: line.len(),
            }
        }
        .into());
    }

    let header = parse_header(&line, config)?.ok_or(ProtocolError::MissingTerminator)?;
    let Some(body_len) = header.body_len else {
        return Ok(Some(header.command));
    };

    let mut body = Vec::with_capacity(body_len + CRLF.len());
    reader
        .by_ref()
        .take((body_len + CRLF.len()) as u64)
        .read_to_end(&mut body)?;
    if body.len() < body_len + CRLF.len() {
        return Err(ProtocolError::ShortBody {
            expected: body_len,
            available: body.len().min(body_len),
        }
        .into());
    }
    if &body[body_len..] != CRLF {
        return Err(ProtocolError::MissingTerminator.into());
    }
    body.truncate(body_len);

    let mut command = header.command;
    command.body = Some(body.into());
    Ok(Some(command))
}

struct Header {
    /// Command without its body.
    command: Command,
    /// Header length including CRLF.
    line_len: usize,
    body_len: Option<usize>,
}

fn parse_header(
    src: &[u8],
    config: &CodecConfig,
) -> std::result::Result<Option<Header>, ProtocolError> {
    let window = &src[..src.len().min(config.max_line_length + CRLF.len())];
    let Some(lf) = window.iter().position(|&b| b == b'\n') else {
        if window.len() >= config.max_line_length + CRLF.len() {
            return Err(ProtocolError::LineTooLong {
                max: config.max_line_length,
            });
        }
        return Ok(None);
    };
    if lf == 0 || src[lf - 1] != b'\r' {
        return Err(ProtocolError::MissingTerminator);
    }

    let line = std::str::from_utf8(&src[..lf - 1])
        .map_err(|_| ProtocolError::InvalidToken(String::from_utf8_lossy(&src[..lf - 1]).into()))?;
    let mut tokens = line.split_ascii_whitespace();
    let keyword = tokens.next().ok_or(ProtocolError::EmptyLine)?;
    let mut args: Vec<Arg> = tokens.map(Arg::parse).collect();

    let body_len = match table::body_position(keyword) {
        Some(position) => {
            if args.len() < position {
                return Err(ProtocolError::MissingBodyLength {
                    keyword: keyword.to_string(),
                    index: position,
                    found: args.len(),
                });
            }
            let len = match args.remove(position - 1) {
                Arg::Number(n) => usize::try_from(n)
                    .map_err(|_| ProtocolError::InvalidBodyLength(n.to_string()))?,
                Arg::Text(text) => return Err(ProtocolError::InvalidBodyLength(text)),
            };
            if len > config.max_body_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: len,
                    max: config.max_body_size,
                });
            }
            Some(len)
        }
        None => None,
    };

    Ok(Some(Header {
        command: Command {
            keyword: keyword.to_string(),
            args,
            body: None,
        },
        line_len: lf + 1,
        body_len,
    }))
}

fn check_token(token: &str) -> std::result::Result<(), ProtocolError> {
    if token.is_empty() || token.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(ProtocolError::InvalidToken(token.to_string()));
    }
    Ok(())
}

/// [`Serializer`] speaking the beanstalkd protocol, for channels whose
/// items are [`Command`]s.
#[derive(Debug, Clone, Default)]
pub struct BeanstalkCodec {
    config: CodecConfig,
}

impl BeanstalkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Like [`decode_command`], but at end of stream: leftovers that start a
    /// body are reported as a short body, anything else as truncation.
    fn decode_at_eof(
        &self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Command>, ProtocolError> {
        if let Some(command) = decode_command(src, &self.config)? {
            return Ok(Some(command));
        }
        if src.is_empty() {
            return Ok(None);
        }
        match parse_header(src, &self.config) {
            Ok(Some(Header {
                line_len,
                body_len: Some(expected),
                ..
            })) => Err(ProtocolError::ShortBody {
                expected,
                available: (src.len() - line_len).min(expected),
            }),
            _ => Err(ProtocolError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

impl Serializer for BeanstalkCodec {
    type Item = Command;

    fn encode(&self, item: &Command, dst: &mut BytesMut) -> std::result::Result<(), CodecError> {
        encode_command(item, dst)?;
        trace!(keyword = %item.keyword, "encoded command");
        Ok(())
    }

    fn decode(&self, src: &mut BytesMut) -> std::result::Result<Option<Command>, CodecError> {
        Ok(decode_command(src, &self.config)?)
    }

    fn decode_eof(&self, src: &mut BytesMut) -> std::result::Result<Option<Command>, CodecError> {
        Ok(self.decode_at_eof(src)?)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for BeanstalkCodec {
    type Item = Command;
    type Error = crate::error::BeanstalkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>> {
        Ok(decode_command(src, &self.config)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Command>> {
        Ok(self.decode_at_eof(src)?)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Command> for BeanstalkCodec {
    type Error = crate::error::BeanstalkError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        Ok(encode_command(&item, dst)?)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<&Command> for BeanstalkCodec {
    type Error = crate::error::BeanstalkError;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<()> {
        Ok(encode_command(item, dst)?)
    }
}
