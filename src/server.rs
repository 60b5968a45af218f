//! Listener and per-connection request handling.
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::BucketEngine;
use crate::error::{LoftError, Result};
use crate::frame::{read_frame, write_frame};
use crate::identifier::BucketId;
use crate::protocol::{
    GenerateRequest, GenerateResponse, GetRequest, GetResponse, Message, PutRequest, PutResponse,
    error_code,
};
use crate::tls;
use crate::transport::Connection;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stops a running [`LoftServer`] from another thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Ask the accept loop to stop. Open connections run to completion.
    pub fn shutdown(&self) {
        info!("Shutting down server...");
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bucket server
pub struct LoftServer<E: BucketEngine> {
    listener: TcpListener,
    tls: Option<Arc<rustls::ServerConfig>>,
    read_timeout: Option<Duration>,
    engine: E,
    shutdown: ShutdownHandle,
}

impl<E: BucketEngine> LoftServer<E> {
    /// Bind the configured address and load TLS material if enabled.
    pub fn bind(config: &ServerConfig, engine: E) -> Result<Self> {
        let tls = match &config.tls {
            Some(tls) => Some(tls::load_server_config(&tls.cert_path, &tls.key_path)?),
            None => None,
        };
        let listener = TcpListener::bind(&config.listen_addr)?;
        // polled so the shutdown flag is noticed
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            tls,
            read_timeout: config.read_timeout(),
            engine,
            shutdown: ShutdownHandle(Arc::new(AtomicBool::new(false))),
        })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping [`LoftServer::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shut down, one thread per connection.
    ///
    /// Any accept failure ends the loop with an error. A connection that
    /// cannot be set up is logged and dropped.
    pub fn run(&self) -> Result<()> {
        info!(
            "Listening on {} ({})",
            self.local_addr()?,
            if self.tls.is_some() { "tls" } else { "plain" }
        );

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.spawn_connection(stream, peer) {
                        error!("Dropping connection from {peer}: {e}");
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Server stopped accepting new connections");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(self.read_timeout)?;
        let engine = self.engine.clone();
        let tls = self.tls.clone();
        thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                info!("Accepted connection from {peer}");
                let conn = match tls {
                    Some(config) => tls::accept(&config, stream),
                    None => Connection::plain(stream).map_err(LoftError::from),
                };
                let result = conn.and_then(|mut conn| {
                    handle_connection(&mut conn, &engine)?;
                    Ok(conn.close()?)
                });
                match result {
                    Ok(()) => info!("Connection from {peer} closed"),
                    Err(e) => error!("Connection from {peer} terminated: {e}"),
                }
            })?;
        Ok(())
    }
}

/// Serve requests on one connection until the peer hangs up.
///
/// Bucket failures are answered with an error code and the loop continues;
/// protocol and transport failures end the connection with an `Err`.
pub fn handle_connection<E: BucketEngine>(conn: &mut Connection, engine: &E) -> Result<()> {
    while let Some(message) = read_frame(&mut conn.reader)? {
        debug!("Received request: {message:?}");
        match message {
            Message::GenerateRequest(request) => generate(conn, engine, request)?,
            Message::PutRequest(request) => put(conn, engine, request)?,
            Message::GetRequest(request) => get(conn, engine, request)?,
            other => return Err(LoftError::UnexpectedMessage(other.message_type())),
        }
        conn.writer.flush()?;
    }
    Ok(())
}

fn generate<E: BucketEngine>(
    conn: &mut Connection,
    engine: &E,
    request: GenerateRequest,
) -> Result<()> {
    let response = match engine.generate(request.num_bytes_in_bucket) {
        Ok(id) => GenerateResponse::new(error_code::SUCCESS, id),
        Err(e) => {
            warn!("Error generating bucket: {e}");
            GenerateResponse::new(e.error_code(), BucketId::default())
        }
    };
    debug!("Sent response: {response:?}");
    write_frame(&mut conn.writer, &response.into())
}

fn put<E: BucketEngine>(conn: &mut Connection, engine: &E, request: PutRequest) -> Result<()> {
    let reader = &mut conn.reader;
    let writer = &mut conn.writer;
    let code = engine.put(&request.identifier, request.num_bytes, reader, |code| {
        let response = PutResponse::new(code);
        debug!("Sent response: {response:?}");
        write_frame(writer, &response.into())
    })?;
    if code == error_code::SUCCESS {
        info!(
            "Stored {} bytes in bucket {}",
            request.num_bytes, request.identifier
        );
    }
    Ok(())
}

fn get<E: BucketEngine>(conn: &mut Connection, engine: &E, request: GetRequest) -> Result<()> {
    let (size, content) = match engine.get(&request.identifier) {
        Ok(found) => found,
        Err(e) => {
            warn!("Error reading bucket {}: {e}", request.identifier);
            return write_frame(&mut conn.writer, &GetResponse::new(e.error_code(), -1).into());
        }
    };
    write_frame(
        &mut conn.writer,
        &GetResponse::new(error_code::SUCCESS, size).into(),
    )?;
    let expected = size as u64;
    let copied = io::copy(&mut content.take(expected), &mut conn.writer)?;
    if copied != expected {
        // the peer is waiting for bytes that no longer exist
        return Err(LoftError::IOError(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!(
                "bucket {} shrank to {copied} of {expected} bytes while sending",
                request.identifier
            ),
        )));
    }
    debug!("Sent {copied} bytes from bucket {}", request.identifier);
    Ok(())
}
