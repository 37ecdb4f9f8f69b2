use std::fmt;

use bytes::Bytes;

/// One header argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Number(u64),
    Text(String),
}

impl Arg {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Number(_) => None,
            Arg::Text(s) => Some(s),
        }
    }

    /// Classify a header token: purely decimal tokens that fit a `u64` are
    /// numbers, everything else is text.
    pub fn parse(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse() {
                return Arg::Number(n);
            }
        }
        Arg::Text(token.to_string())
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(n) => write!(f, "{n}"),
            Arg::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::Number(n)
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Arg::Number(n.into())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

/// A beanstalkd command or reply.
///
/// The keyword is kept verbatim (commands are lower case, replies upper
/// case). For keywords that carry a body, the body goes in [`Command::body`]
/// and its byte length is never part of `args`: the codec writes and strips
/// it at the position the capability table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub keyword: String,
    pub args: Vec<Arg>,
    pub body: Option<Bytes>,
}

impl Command {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            args: Vec::new(),
            body: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// `put <pri> <delay> <ttr>` with `data` as the job body.
    pub fn put(pri: u32, delay: u32, ttr: u32, data: impl Into<Bytes>) -> Self {
        Self::new("put")
            .arg(pri)
            .arg(delay)
            .arg(ttr)
            .with_body(data)
    }

    pub fn is(&self, keyword: &str) -> bool {
        self.keyword == keyword
    }

    /// The argument at `index` (0-based) if it is a number.
    pub fn number(&self, index: usize) -> Option<u64> {
        self.args.get(index).and_then(Arg::as_number)
    }

    /// The argument at `index` (0-based) if it is text.
    pub fn text(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Arg::as_text)
    }
}

/// Header tokens without the body, as a reader would write them down.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keyword)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(body) = &self.body {
            write!(f, " <{} bytes>", body.len())?;
        }
        Ok(())
    }
}
