//! Line-oriented request server

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::protocol::{Request, Response};

/// Implemented by the service to answer requests.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_request(&mut self, request: &Request) -> Response;
}

/// Answer one request line. Returns `None` for blank lines.
pub fn handle_line(handler: &mut dyn RequestHandler, line: &str) -> Option<Response> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let response = match Request::parse(trimmed) {
        Ok(request) => {
            log::debug!("Request: {}", request.method);
            handler
                .handle_request(&request)
                .with_id(request.id.clone())
        }
        Err(e) => Response::error(e.code(), e.to_string()),
    };
    Some(response)
}

/// Server handle - keep this alive to keep the server running
pub struct ProtocolServer {
    handle: tokio::task::JoinHandle<()>,
}

impl ProtocolServer {
    /// Start serving on `127.0.0.1:port`. Returns immediately; requests from
    /// every connection are handled one at a time through the shared lock.
    pub fn start(handler: Arc<Mutex<dyn RequestHandler>>, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            let listener = match TcpListener::bind(&addr).await {
                Ok(l) => {
                    log::info!("Listening on {}", addr);
                    l
                }
                Err(e) => {
                    log::error!("Failed to bind {}: {}", addr, e);
                    return;
                }
            };

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        log::info!("Client connected from {}", peer);
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, handler).await;
                            log::info!("Client disconnected: {}", peer);
                        });
                    }
                    Err(e) => {
                        log::error!("Accept error: {}", e);
                    }
                }
            }
        });

        Self { handle }
    }

    /// Wait for the server task, which only ends if binding failed.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            log::error!("Server task failed: {}", e);
        }
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, handler: Arc<Mutex<dyn RequestHandler>>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let response = {
                    let mut h = handler.lock().await;
                    handle_line(&mut *h, &line)
                };
                let Some(response) = response else {
                    continue;
                };

                if let Err(e) = writer.write_all(response.to_line().as_bytes()).await {
                    log::error!("Write error: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    log::error!("Flush error: {}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Read error: {}", e);
                break;
            }
        }
    }
}
