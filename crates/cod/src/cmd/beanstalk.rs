use cod_beanstalk::{table, Client};
use cod_channel::{ChannelConfig, Context};

use crate::cmd::{parse_duration, BeanstalkArgs};
use crate::exit::{beanstalk_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_commands, OutputFormat};

pub fn run(args: BeanstalkArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let command = args.command.to_command()?;

    let ctx = Context::with_config(ChannelConfig {
        read_timeout: Some(timeout),
    });
    let mut client = Client::connect(&ctx, args.addr.as_str())
        .map_err(|err| beanstalk_error("connect failed", err))?;

    if command.is("quit") {
        client
            .quit()
            .map_err(|err| beanstalk_error("quit failed", err))?;
        return Ok(SUCCESS);
    }

    let reply = client
        .interact(&command)
        .map_err(|err| beanstalk_error("request failed", err))?;
    print_commands(std::slice::from_ref(&reply), format);

    client
        .quit()
        .map_err(|err| beanstalk_error("quit failed", err))?;

    if table::is_error_reply(&reply.keyword) {
        tracing::warn!(reply = %reply.keyword, "server rejected command");
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}
