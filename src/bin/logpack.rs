use logpack::{Config, LogArchive, Mode};

use std::env;
use std::ffi::OsString;
use std::process;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<OsString> = env::args_os().collect();
    if args.len() < 2 {
        let program = args
            .first()
            .map(|arg| arg.to_string_lossy())
            .unwrap_or_else(|| "logpack".into());
        println!(
            "Usage: {program} {} | {}",
            Mode::PACKAGE_FLAG,
            Mode::EXTRACT_FLAG
        );
        println!("  {}  copy *.log into logs/ and write logs.tar.gz", Mode::PACKAGE_FLAG);
        println!("  {}  extract logs.tar.gz into the current directory", Mode::EXTRACT_FLAG);
        process::exit(1);
    }

    let mode = Mode::from_os_arg(&args[1]);
    LogArchive::new(Config::default()).run(&mode)?;
    println!("Done.");
    Ok(())
}
