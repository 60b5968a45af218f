//! Buffered connection halves over plain TCP or TLS streams.
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};

/// Inbound half of a connection.
pub type ReadHalf = Box<dyn Read + Send>;
/// Outbound half of a connection.
pub type WriteHalf = Box<dyn Write + Send>;

/// One live stream: a buffered reader and a buffered writer.
///
/// Requests are strictly sequential, so a half is never used while the
/// other is blocked.
pub struct Connection {
    /// Buffered inbound bytes.
    pub reader: BufReader<ReadHalf>,
    /// Buffered outbound bytes; flushed after every frame and payload.
    pub writer: BufWriter<WriteHalf>,
    socket: Option<TcpStream>,
}

impl Connection {
    /// Wrap two arbitrary halves.
    pub fn new(reader: ReadHalf, writer: WriteHalf) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            socket: None,
        }
    }

    /// Split a plain TCP stream by cloning its handle.
    pub fn plain(stream: TcpStream) -> io::Result<Self> {
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let mut conn = Self::new(Box::new(reader), Box::new(writer));
        conn.socket = Some(stream);
        Ok(conn)
    }

    /// Split a stream that cannot be cloned, such as a TLS session, by
    /// sharing it between both halves.
    pub fn shared<S>(stream: S, socket: TcpStream) -> Self
    where
        S: Read + Write + Send + 'static,
    {
        let shared = SharedStream(Arc::new(Mutex::new(stream)));
        let mut conn = Self::new(Box::new(shared.clone()), Box::new(shared));
        conn.socket = Some(socket);
        conn
    }

    /// Flush pending output and shut the socket down in both directions.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.shutdown()
    }

    /// Shut the socket down without flushing, leaving both halves failing
    /// or at end of stream. A no-op for connections without a socket.
    pub fn shutdown(&mut self) -> io::Result<()> {
        if let Some(socket) = self.socket.take() {
            match socket.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

/// A stream shared by the read and write halves of one connection.
struct SharedStream<S>(Arc<Mutex<S>>);

impl<S> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S> SharedStream<S> {
    fn lock(&self) -> io::Result<MutexGuard<'_, S>> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection lock poisoned"))
    }
}

impl<S: Read> Read for SharedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock()?.read(buf)
    }
}

impl<S: Write> Write for SharedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    #[test]
    fn shared_halves_see_one_stream() {
        let stream = Cursor::new(b"ping".to_vec());
        let shared = SharedStream(Arc::new(Mutex::new(stream)));
        let mut reader = shared.clone();
        let mut writer = shared.clone();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        writer.write_all(b"pong").unwrap();
        assert_eq!(shared.lock().unwrap().get_ref(), b"pingpong");
    }

    #[test]
    fn plain_connection_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut conn = Connection::plain(TcpStream::connect(addr).unwrap()).unwrap();
        conn.writer.write_all(b"hello").unwrap();
        conn.writer.flush().unwrap();
        let mut buf = [0u8; 5];
        conn.reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        conn.close().unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn shutdown_ends_both_halves() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).unwrap();
            rest
        });

        let mut conn = Connection::plain(TcpStream::connect(addr).unwrap()).unwrap();
        conn.shutdown().unwrap();
        assert!(peer.join().unwrap().is_empty());

        let mut buf = [0u8; 1];
        assert_eq!(conn.reader.read(&mut buf).unwrap(), 0);
        conn.writer.write_all(b"late").unwrap();
        assert!(conn.writer.flush().is_err());
    }
}
