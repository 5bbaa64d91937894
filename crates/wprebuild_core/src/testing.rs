use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use zip::ZipWriter;
use zip::write::FileOptions;

use crate::error::PackageError;
use crate::fetch::PackageTransport;

/// Build a zip payload in memory. Names ending in `/` with no content are directories.
pub fn zip_bytes(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer
                    .start_file(*name, FileOptions::default())
                    .expect("start zip entry");
                writer
                    .write_all(content.as_bytes())
                    .expect("write zip entry");
            }
            None => {
                writer
                    .add_directory(*name, FileOptions::default())
                    .expect("add zip directory");
            }
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Serves packages from memory; unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    packages: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MemoryTransport {
    pub fn with_package(mut self, url: &str, payload: Vec<u8>) -> Self {
        self.packages.insert(url.to_string(), payload);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl PackageTransport for MemoryTransport {
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, PackageError> {
        self.requests.borrow_mut().push(url.to_string());
        let Some(payload) = self.packages.get(url) else {
            return Err(PackageError::NotFound {
                url: url.to_string(),
                status: 404,
            });
        };
        sink.write_all(payload)
            .map_err(|source| PackageError::io(url, source))?;
        Ok(payload.len() as u64)
    }
}

/// One canned HTTP answer: status code, reason phrase, body.
pub type CannedResponse = (u16, &'static str, Vec<u8>);

/// Answer one connection per canned response on 127.0.0.1, then stop.
/// Returns the base URL and a handle yielding the request heads received.
pub fn serve_http(responses: Vec<CannedResponse>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let address = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let mut heads = Vec::new();
        for (status, reason, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut head = String::new();
            loop {
                let mut line = String::new();
                let read = reader.read_line(&mut line).expect("read request line");
                if read == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            heads.push(head);

            write!(
                stream,
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .expect("write status");
            stream.write_all(&body).expect("write body");
            stream.flush().expect("flush response");
        }
        heads
    });
    (format!("http://{address}"), handle)
}
