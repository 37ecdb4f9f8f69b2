use std::fs;
use std::io::Read;

use bytes::BytesMut;
use cod_beanstalk::{BeanstalkCodec, CodecConfig, Command};
use cod_channel::Serializer;

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::{print_commands, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };

    let codec = BeanstalkCodec::with_config(CodecConfig {
        max_line_length: args.max_line_length,
        max_body_size: args.max_body_size,
    });
    let commands = decode_all(&codec, &input)?;
    tracing::debug!(count = commands.len(), "decoded commands");

    print_commands(&commands, format);
    Ok(SUCCESS)
}

/// Decode every command in `input`; the input is complete, so leftovers
/// are an error.
fn decode_all(codec: &BeanstalkCodec, input: &[u8]) -> CliResult<Vec<Command>> {
    let mut buf = BytesMut::from(input);
    let mut commands = Vec::new();
    while let Some(command) = codec
        .decode_eof(&mut buf)
        .map_err(|err| codec_error("decode failed", err))?
    {
        commands.push(command);
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn decodes_a_conversation() {
        let commands = decode_all(
            &BeanstalkCodec::new(),
            b"put 10 0 60 5\r\nhello\r\nINSERTED 5\r\n",
        )
        .unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], Command::put(10, 0, 60, "hello"));
        assert_eq!(commands[1].number(0), Some(5));
    }

    #[test]
    fn empty_input_is_no_commands() {
        assert!(decode_all(&BeanstalkCodec::new(), b"").unwrap().is_empty());
    }

    #[test]
    fn short_body_is_data_error() {
        let err = decode_all(&BeanstalkCodec::new(), b"RESERVED 1 10\r\nabc").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("body shorter than declared"));
    }
}
