//! Fetch the running configuration from a device over SSH.
//!
//! # Usage
//!
//! With password authentication:
//! ```bash
//! cargo run --example ssh_get_config -- --host router1 --user admin --password secret
//! ```
//!
//! With key authentication:
//! ```bash
//! cargo run --example ssh_get_config -- --host router1 --user admin --key ~/.ssh/id_ed25519
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ferrisconf::{Datastore, Session, SshConfig, SshTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = SshConfig::new(&args.host, &args.user)
        .port(args.port)
        .timeout(Duration::from_secs(args.timeout));

    if let Some(password) = &args.password {
        config = config.password(password);
    } else if let Some(key_path) = &args.key {
        config = config.private_key(key_path, None);
    } else {
        eprintln!("Error: must provide either --password or --key");
        std::process::exit(1);
    }

    println!("Connecting to {}:{}...", args.host, args.port);
    let transport = SshTransport::dial(config).await?;

    let session = Session::open(transport).await?;
    println!("Session {} established", session.session_id());
    println!("Server capabilities:");
    for cap in session.server_capabilities() {
        println!("  {cap}");
    }

    let running = session.get_config(Datastore::Running).await?;
    println!("\n{}", String::from_utf8_lossy(&running));

    session.close().await?;
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 830u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = None;
        let mut key = None;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(830);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                }
            }
            i += 1;
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            timeout,
        }
    }
}
