//! Server secret generator for tollgate.
//!
//! Prints a fresh random secret as hex, suitable for `TOLLGATE_SERVER_SECRET`
//! or the `server_secret` config key.
//!
//! Usage:
//!   tollgate-keygen [--export]

use tollgate::config::SERVER_SECRET_ENV;
use tollgate::ServerSecret;

fn main() {
    let export = std::env::args().skip(1).any(|arg| arg == "--export");
    let secret = ServerSecret::generate();

    if export {
        println!("export {SERVER_SECRET_ENV}={}", secret.to_hex());
    } else {
        println!("{}", secret.to_hex());
        eprintln!(
            "Keep this value private. Content sealed under one secret cannot be opened with another."
        );
    }
}
