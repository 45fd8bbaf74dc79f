//! Line-oriented Unix socket clients for talking to a running server.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use composte_protocol::{Command, Reply};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const IO_TIMEOUT: Duration = Duration::from_secs(2);

fn connect(path: &Path) -> Result<UnixStream, String> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(IO_TIMEOUT))
                    .map_err(|error| error.to_string())?;
                return Ok(stream);
            }
            Err(error) if Instant::now() >= deadline => {
                return Err(format!("connect to {}: {error}", path.display()));
            }
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
}

/// Sends one raw line and parses the reply.
pub fn round_trip(path: &Path, line: &str) -> Result<Reply, String> {
    let mut stream = connect(path)?;
    stream
        .write_all(format!("{line}\n").as_bytes())
        .map_err(|error| error.to_string())?;
    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(|error| error.to_string())?;
    Reply::parse(&reply).map_err(|error| format!("unparseable reply {reply:?}: {error}"))
}

/// Serialises `command` and sends it.
pub fn send_command(path: &Path, command: &Command) -> Result<Reply, String> {
    let line = command.to_json().map_err(|error| error.to_string())?;
    round_trip(path, &line)
}

/// Broadcast channel subscriber.
pub struct Subscriber {
    reader: BufReader<UnixStream>,
}

impl Subscriber {
    /// Connects to the broadcast socket at `path`.
    pub fn connect(path: &Path) -> Result<Self, String> {
        Ok(Self {
            reader: BufReader::new(connect(path)?),
        })
    }

    /// Reads the next broadcast line.
    pub fn next_message(&mut self) -> Result<String, String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|error| error.to_string())?;
        if read == 0 {
            return Err(String::from("broadcast channel closed"));
        }
        Ok(line.trim_end().to_owned())
    }
}
