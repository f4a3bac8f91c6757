//! Scenecomp - authoring service

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use scenecomp::core::{config::Config, logging};
use scenecomp::service::Service;
use scenecomp_protocol::{handle_line, ProtocolServer};

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::discover(parse_config_arg(&args).as_deref());

    match args.get(1).map(String::as_str) {
        Some("serve") | None => serve_stdio(config),
        Some(flag) if flag.starts_with('-') => serve_stdio(config),
        Some("tcp-serve") => {
            let port = parse_port_arg(&args).unwrap_or(config.tcp_port);
            serve_tcp(config, port);
        }
        Some(other) => {
            eprintln!("Unknown command '{}'", other);
            eprintln!("Usage: scenecomp [serve | tcp-serve [--port N]] [--config FILE]");
            std::process::exit(2);
        }
    }
}

/// One request per stdin line, one response per stdout line.
fn serve_stdio(config: Config) {
    log::info!("Scenecomp serving on stdio");
    let mut service = Service::with_file_store(config);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("stdin read error: {}", e);
                break;
            }
        };
        let Some(response) = handle_line(&mut service, &line) else {
            continue;
        };
        if let Err(e) = stdout_lock.write_all(response.to_line().as_bytes()) {
            log::error!("stdout write error: {}", e);
            break;
        }
        if let Err(e) = stdout_lock.flush() {
            log::error!("stdout flush error: {}", e);
            break;
        }
    }

    log::info!("Scenecomp shutting down");
}

fn serve_tcp(config: Config, port: u16) {
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(async {
        let handler = Arc::new(tokio::sync::Mutex::new(Service::with_file_store(config)));
        ProtocolServer::start(handler, port).wait().await;
    });
}

/// Parse --config argument from command line
fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if args[i] == "--config" || args[i] == "-c" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}

/// Parse --port argument from command line
fn parse_port_arg(args: &[String]) -> Option<u16> {
    for i in 0..args.len() {
        if args[i] == "--port" || args[i] == "-p" {
            if let Some(port) = args.get(i + 1) {
                return port.parse().ok();
            }
        }
    }
    None
}
