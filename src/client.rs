//! Client side of the bucket protocol.
//!
//! ```no_run
//! use loft::client::LoftClient;
//! use loft::config::ClientConfig;
//!
//! let mut client = LoftClient::connect(&ClientConfig::default()).unwrap();
//! let id = client.create(1024).unwrap();
//! client.upload(&id, "notes.txt").unwrap();
//! client.download(&id, "notes.copy.txt").unwrap();
//! ```
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::Path;

use log::debug;

use crate::config::ClientConfig;
use crate::error::{LoftError, Result};
use crate::frame::{read_frame, write_frame};
use crate::identifier::BucketId;
use crate::protocol::{GenerateRequest, GetRequest, Message, PutRequest, error_code};
use crate::tls;
use crate::transport::Connection;

/// A connection to a bucket server.
pub struct LoftClient {
    conn: Connection,
}

impl LoftClient {
    /// Dial the configured server, over TLS when configured.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.server_addr)?;
        let conn = match &config.tls {
            Some(tls_config) => {
                let client_config = tls::load_client_config(&tls_config.ca_path)?;
                tls::connect(&client_config, &config.server_name(), stream)?
            }
            None => Connection::plain(stream)?,
        };
        debug!("connected to {}", config.server_addr);
        Ok(Self { conn })
    }

    /// Use an already established connection.
    pub fn with_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Reserve a bucket of `capacity` bytes.
    pub fn create(&mut self, capacity: i64) -> Result<BucketId> {
        self.send(GenerateRequest::new(capacity).into())?;
        match self.receive()? {
            Message::GenerateResponse(response) if response.error_code == error_code::SUCCESS => {
                Ok(response.identifier)
            }
            Message::GenerateResponse(response) => Err(LoftError::Rejected {
                operation: "generate",
                code: response.error_code,
            }),
            other => Err(LoftError::UnexpectedMessage(other.message_type())),
        }
    }

    /// Upload `size` bytes from `source` into `id`.
    ///
    /// Nothing is read from `source` unless the server accepts the upload.
    /// If `source` fails or ends before `size` bytes, the connection is shut
    /// down: the server is still waiting for payload, so no further request
    /// could be understood. Later calls on this client return errors.
    pub fn put<R: Read>(&mut self, id: &BucketId, size: u64, source: &mut R) -> Result<u64> {
        let declared = i64::try_from(size)
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "payload too large"))?;
        self.send(PutRequest::new(*id, declared).into())?;
        match self.receive()? {
            Message::PutResponse(response) if response.error_code == error_code::SUCCESS => {}
            Message::PutResponse(response) => {
                return Err(LoftError::Rejected {
                    operation: "put",
                    code: response.error_code,
                });
            }
            other => return Err(LoftError::UnexpectedMessage(other.message_type())),
        }
        let copied = io::copy(&mut source.take(size), &mut self.conn.writer)
            .and_then(|sent| self.conn.writer.flush().map(|()| sent));
        let err = match copied {
            Ok(sent) if sent == size => {
                debug!("sent {sent} bytes to bucket {id}");
                return Ok(sent);
            }
            Ok(sent) => io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("source ended after {sent} of {size} bytes"),
            ),
            Err(e) => e,
        };
        if let Err(e) = self.conn.shutdown() {
            debug!("shutting down after a failed upload: {e}");
        }
        Err(LoftError::IOError(err))
    }

    /// Download the content of `id` into `sink`, returning its size.
    pub fn get<W: Write>(&mut self, id: &BucketId, sink: &mut W) -> Result<u64> {
        let size = self.request_content(id)?;
        self.receive_content(size, sink)
    }

    /// Upload a local file into `id`.
    pub fn upload(&mut self, id: &BucketId, path: impl AsRef<Path>) -> Result<u64> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        self.put(id, size, &mut file)
    }

    /// Download `id` into a local file, replacing it.
    ///
    /// The file is only created once the server has accepted the request.
    pub fn download(&mut self, id: &BucketId, path: impl AsRef<Path>) -> Result<u64> {
        let size = self.request_content(id)?;
        let mut file = File::create(path)?;
        self.receive_content(size, &mut file)
    }

    /// Ask for the content of `id` and return the announced size.
    fn request_content(&mut self, id: &BucketId) -> Result<u64> {
        self.send(GetRequest::new(*id).into())?;
        match self.receive()? {
            Message::GetResponse(response) if response.error_code == error_code::SUCCESS => {
                Ok(u64::try_from(response.size).map_err(|_| {
                    io::Error::new(
                        ErrorKind::InvalidData,
                        format!("negative size {} in response", response.size),
                    )
                })?)
            }
            Message::GetResponse(response) => Err(LoftError::Rejected {
                operation: "get",
                code: response.error_code,
            }),
            other => Err(LoftError::UnexpectedMessage(other.message_type())),
        }
    }

    /// Copy the `size` payload bytes that follow a successful response.
    fn receive_content<W: Write>(&mut self, size: u64, sink: &mut W) -> Result<u64> {
        let received = io::copy(&mut (&mut self.conn.reader).take(size), sink)?;
        if received != size {
            return Err(LoftError::IOError(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("server sent {received} of {size} bytes"),
            )));
        }
        sink.flush()?;
        Ok(received)
    }

    /// Send one framed message.
    pub fn send(&mut self, message: Message) -> Result<()> {
        write_frame(&mut self.conn.writer, &message)
    }

    /// Receive one framed message; a closed connection is an error.
    pub fn receive(&mut self) -> Result<Message> {
        read_frame(&mut self.conn.reader)?.ok_or_else(|| {
            LoftError::IOError(io::Error::new(
                ErrorKind::UnexpectedEof,
                "server closed the connection",
            ))
        })
    }

    /// Flush and shut the connection down.
    pub fn close(self) -> Result<()> {
        Ok(self.conn.close()?)
    }
}

