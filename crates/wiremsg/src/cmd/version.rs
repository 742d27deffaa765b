use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wiremsg {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wiremsg");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("endian: {}", if cfg!(target_endian = "little") { "little" } else { "big" });
    println!("handshake_size: {}", wiremsg_peer::HANDSHAKE_SIZE);
    println!("header_size: {}", wiremsg_frame::HEADER_SIZE);

    Ok(SUCCESS)
}
