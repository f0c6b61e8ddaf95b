//! Chat client binary: `chat-client <host> <port>`
//!
//! Exit codes: 0 on clean shutdown, 1 on a fatal runtime error, 2 on a
//! usage error.

use std::env;
use std::process::ExitCode;

use parley::client::session;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: chat-client <host> <port>");
        return ExitCode::from(2);
    }

    let host = &args[1];
    let port: u16 = match args[2].parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("usage: chat-client <host> <port>");
            eprintln!("error: invalid port: {:?}", args[2]);
            return ExitCode::from(2);
        }
    };

    match session::run(host, port).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(1)
        }
    }
}
