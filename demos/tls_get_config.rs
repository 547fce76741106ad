//! Fetch the running configuration from a device over TLS (RFC 7589).
//!
//! # Usage
//!
//! ```bash
//! cargo run --example tls_get_config -- --host router1 \
//!     --ca ca.pem --cert client.pem --cert-key client.key
//! ```

use std::env;
use std::path::PathBuf;

use ferrisconf::{Datastore, Session, TlsConfig, TlsTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = TlsConfig::new(&args.host, &args.ca).port(args.port);
    if let (Some(cert), Some(key)) = (&args.cert, &args.cert_key) {
        config = config.client_cert(cert, key);
    }

    println!("Connecting to {}:{}...", args.host, args.port);
    let transport = TlsTransport::dial(config).await?;

    let session = Session::open(transport).await?;
    println!("Session {} established", session.session_id());

    let running = session.get_config(Datastore::Running).await?;
    println!("\n{}", String::from_utf8_lossy(&running));

    session.close().await?;
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    ca: PathBuf,
    cert: Option<PathBuf>,
    cert_key: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 6513u16;
        let mut ca = PathBuf::from("ca.pem");
        let mut cert = None;
        let mut cert_key = None;

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
                        port = args[i].parse().unwrap_or(6513);
                    }
                }
                "--ca" => {
                    i += 1;
                    if i < args.len() {
                        ca = PathBuf::from(&args[i]);
                    }
                }
                "--cert" => {
                    i += 1;
                    if i < args.len() {
                        cert = Some(PathBuf::from(&args[i]));
                    }
                }
                "--cert-key" => {
                    i += 1;
                    if i < args.len() {
                        cert_key = Some(PathBuf::from(&args[i]));
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
            ca,
            cert,
            cert_key,
        }
    }
}
