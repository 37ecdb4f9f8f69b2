use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("cod {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: cod");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("COD_BUILD_TARGET"));
    println!("profile: {}", env!("COD_BUILD_PROFILE"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "transports: pipe={}, tcp=true, memory=true",
        cfg!(unix)
    );
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!(
        "beanstalk: max_line_length={}, max_body_size={}",
        cod_beanstalk::DEFAULT_MAX_LINE_LENGTH,
        cod_beanstalk::DEFAULT_MAX_BODY_SIZE
    );

    Ok(SUCCESS)
}
