// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Destinations for the bytes drained from the ring.

use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use dmaflow_config::{FileFormat, SinkKind, SinkSettings};

use crate::framing::{HEADER_LEN, write_frame};

/// Render bytes as upper-case hex pairs with a space after every fourth byte
/// and a trailing newline.
#[must_use]
pub fn hex_text(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 2 + bytes.len() / 4 + 1);
    for (i, byte) in bytes.iter().enumerate() {
        let _ = write!(text, "{byte:02X}");
        if i % 4 == 3 {
            text.push(' ');
        }
    }
    text.push('\n');
    text
}

/// Set `SO_SNDBUF` or `SO_RCVBUF` on a socket.
pub(crate) fn set_socket_buffer(
    socket: &impl AsRawFd,
    option: libc::c_int,
    num_bytes: u32,
) -> io::Result<()> {
    let value = libc::c_int::try_from(num_bytes).unwrap_or(libc::c_int::MAX);
    // SAFETY: `value` outlives the call and its size is passed alongside.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&raw const value).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Appends slot contents to a file.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    path: PathBuf,
    format: FileFormat,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path, format: FileFormat) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.format {
            FileFormat::Binary => self.file.write_all(bytes),
            FileFormat::Text => self.file.write_all(hex_text(bytes).as_bytes()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Sends each slot as one frame over a persistent TCP connection.
#[derive(Debug)]
pub struct NetworkSink {
    stream: BufWriter<TcpStream>,
    peer: String,
}

impl NetworkSink {
    /// Connect to `host:port` with Nagle disabled and the send buffer set to
    /// `send_buffer` bytes.
    ///
    /// Frames up to `max_frame_payload` bytes leave in a single write.
    pub fn connect(
        host: &str,
        port: u16,
        send_buffer: u32,
        max_frame_payload: usize,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        set_socket_buffer(&stream, libc::SO_SNDBUF, send_buffer)?;
        Ok(Self {
            stream: BufWriter::with_capacity(max_frame_payload + HEADER_LEN, stream),
            peer: format!("{host}:{port}"),
        })
    }

    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        write_frame(&mut self.stream, bytes)?;
        self.stream.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.flush()?;
        self.stream.get_ref().shutdown(Shutdown::Write)
    }
}

/// Where the consumer forwards slot contents. Chosen once at start-up.
#[derive(Debug)]
pub enum Sink {
    File(FileSink),
    Network(NetworkSink),
}

impl Sink {
    /// Open the sink described by `settings`.
    ///
    /// `max_payload` is the largest number of bytes passed to a single
    /// [`Sink::forward`] (the slot capacity).
    pub fn open(settings: &SinkSettings, max_payload: usize) -> io::Result<Self> {
        match settings.kind {
            SinkKind::File => Ok(Sink::File(FileSink::open(&settings.output, settings.format)?)),
            SinkKind::Network => Ok(Sink::Network(NetworkSink::connect(
                &settings.host,
                settings.port,
                settings.send_buffer,
                max_payload,
            )?)),
        }
    }

    pub fn forward(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::File(file) => file.write(bytes),
            Sink::Network(network) => network.send(bytes),
        }
    }

    /// Flush and, for the network sink, close the connection so that the
    /// peer sees the end of the stream.
    pub fn finish(&mut self) -> io::Result<()> {
        match self {
            Sink::File(file) => file.flush(),
            Sink::Network(network) => network.close(),
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::File(file) => write!(f, "{} file {}", file.format, file.path.display()),
            Sink::Network(network) => write!(f, "tcp://{}", network.peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_groups_of_four() {
        assert_eq!(hex_text(&[]), "\n");
        assert_eq!(hex_text(&[0x00, 0x1a, 0xff]), "001AFF\n");
        assert_eq!(
            hex_text(&[0, 1, 2, 3, 4, 5, 6, 7, 0xab]),
            "00010203 04050607 AB\n"
        );
        assert_eq!(hex_text(&[0xde, 0xad, 0xbe, 0xef]), "DEADBEEF \n");
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"xy").unwrap();

        let mut sink = Sink::File(FileSink::open(&path, FileFormat::Binary).unwrap());
        sink.forward(&[1, 2, 3]).unwrap();
        sink.forward(&[4]).unwrap();
        sink.finish().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"xy\x01\x02\x03\x04");
        assert!(sink.to_string().starts_with("binary file"));
    }

    #[test]
    fn text_sink_writes_a_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink = Sink::File(FileSink::open(&path, FileFormat::Text).unwrap());
        sink.forward(&[0xca, 0xfe, 0xf0, 0x0d, 0x01]).unwrap();
        sink.forward(&[0x02]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "CAFEF00D 01\n02\n"
        );
    }
}
