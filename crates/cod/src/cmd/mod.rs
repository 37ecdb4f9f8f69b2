use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod beanstalk;
pub mod decode;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the wire form of a beanstalkd command.
    Encode(EncodeArgs),
    /// Decode beanstalkd wire data (stdin or file) into commands.
    Decode(DecodeArgs),
    /// Send one command to a beanstalkd server and print the reply.
    Beanstalk(BeanstalkArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Beanstalk(args) => beanstalk::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// A command tuple given on the command line.
#[derive(Args, Debug)]
pub struct CommandArgs {
    /// Command keyword (e.g. put, use, reserve).
    pub keyword: String,
    /// Arguments; decimal tokens are sent as numbers. Leave out the body length.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Body text.
    #[arg(long, conflicts_with = "file")]
    pub body: Option<String>,
    /// Read the body from a file.
    #[arg(long, conflicts_with = "body")]
    pub file: Option<PathBuf>,
}

impl CommandArgs {
    pub fn to_command(&self) -> CliResult<cod_beanstalk::Command> {
        let mut command = cod_beanstalk::Command::new(self.keyword.clone());
        command.args = self
            .args
            .iter()
            .map(|token| cod_beanstalk::Arg::parse(token))
            .collect();

        if let Some(body) = &self.body {
            command.body = Some(body.clone().into());
        } else if let Some(path) = &self.file {
            let body = fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            command.body = Some(body.into());
        }
        Ok(command)
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub command: CommandArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Read wire data from a file instead of stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Maximum header line length.
    #[arg(long, default_value_t = cod_beanstalk::DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,
    /// Maximum body size.
    #[arg(long, default_value_t = cod_beanstalk::DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,
}

#[derive(Args, Debug)]
pub struct BeanstalkArgs {
    /// Server address (host:port).
    #[arg(env = "COD_BEANSTALK_ADDR")]
    pub addr: String,
    #[command(flatten)]
    pub command: CommandArgs,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn command_args_build_tuple() {
        let args = CommandArgs {
            keyword: "release".into(),
            args: vec!["7".into(), "1024".into(), "tube-a".into()],
            body: None,
            file: None,
        };
        let cmd = args.to_command().unwrap();
        assert_eq!(cmd.number(0), Some(7));
        assert_eq!(cmd.number(1), Some(1024));
        assert_eq!(cmd.text(2), Some("tube-a"));
        assert!(cmd.body.is_none());
    }
}
