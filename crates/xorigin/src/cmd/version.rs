use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    build_target: &'static str,
    profile: &'static str,
    os: &'static str,
    arch: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
    bus: bool,
}

impl BuildInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            build_target: option_env!("XORIGIN_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("XORIGIN_BUILD_PROFILE").unwrap_or("unknown"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            bus: cfg!(feature = "bus"),
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = BuildInfo::current();
    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    let fields = [
        ("name", info.name.to_string()),
        ("version", info.version.to_string()),
        ("build_target", info.build_target.to_string()),
        ("profile", info.profile.to_string()),
        ("os", info.os.to_string()),
        ("arch", info.arch.to_string()),
        ("rustc", info.rustc.to_string()),
        ("git_hash", info.git_hash.to_string()),
        ("features", format!("bus={}, cli=true", info.bus)),
    ];
    print_record(&info, &fields, format);
    Ok(SUCCESS)
}
