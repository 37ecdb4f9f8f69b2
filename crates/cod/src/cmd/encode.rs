use bytes::BytesMut;
use cod_beanstalk::encode_command;

use crate::cmd::EncodeArgs;
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let command = args.command.to_command()?;
    let mut wire = BytesMut::new();
    encode_command(&command, &mut wire).map_err(|err| protocol_error("encode failed", err))?;
    tracing::debug!(keyword = %command.keyword, bytes = wire.len(), "encoded command");

    print_wire(&wire, format);
    Ok(SUCCESS)
}
