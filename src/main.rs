use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use heapdb::common::DbConfig;
use heapdb::shell::Sgbd;

/// Interactive shell over a heapdb database.
///
/// Commands are read from standard input, one per line:
/// CREATE TABLE, DROP TABLE(S), DESCRIBE TABLE(S), EXIT.
#[derive(Parser, Debug)]
#[command(name = "heapdb", version)]
struct Cli {
    /// Path to the key=value configuration file
    config: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = DbConfig::load(&cli.config).and_then(|config| {
        let mut sgbd = Sgbd::new(&config)?;
        let stdin = io::stdin();
        sgbd.run(stdin.lock(), io::stdout())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("heapdb: {}", e);
            ExitCode::FAILURE
        }
    }
}
