use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{OutputFormat, Report};

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("labnode {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    Report::new()
        .field("name", "labnode")
        .field("version", env!("CARGO_PKG_VERSION"))
        .field("target", option_env!("LABNODE_BUILD_TARGET").unwrap_or("unknown"))
        .field("profile", option_env!("LABNODE_BUILD_PROFILE").unwrap_or("unknown"))
        .field("target_os", std::env::consts::OS)
        .field("target_arch", std::env::consts::ARCH)
        .field("serial", cfg!(feature = "serial"))
        .print(format);

    Ok(SUCCESS)
}
