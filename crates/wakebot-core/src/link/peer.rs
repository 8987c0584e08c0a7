//! Resolving a peer name to an open byte stream.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Any bidirectional byte stream the link can drive.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Pending stream open returned by [`PeerDirectory::open`].
pub type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<BoxedStream>> + Send>>;

/// Known (paired) peers and how to reach them.
pub trait PeerDirectory: Send + Sync {
    /// Names of every peer that can be connected to.
    fn paired(&self) -> Vec<String>;

    /// Start opening a stream to `name`; `None` if the peer is unknown.
    fn open(&self, name: &str) -> Option<ConnectFuture>;
}

/// Peers taken from the `[device.peers]` config table.
///
/// An address of the form `tcp:host:port` opens a TCP connection (serial
/// bridges, simulators); anything else is treated as a device path such as
/// `/dev/rfcomm0` and opened read-write without blocking.
#[derive(Debug, Clone, Default)]
pub struct ConfigDirectory {
    peers: BTreeMap<String, String>,
}

impl ConfigDirectory {
    pub fn new(peers: BTreeMap<String, String>) -> Self {
        Self { peers }
    }

    pub fn address(&self, name: &str) -> Option<&str> {
        self.peers.get(name).map(String::as_str)
    }
}

impl PeerDirectory for ConfigDirectory {
    fn paired(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    fn open(&self, name: &str) -> Option<ConnectFuture> {
        let address = self.address(name)?.trim().to_string();
        let opening: ConnectFuture = match address.strip_prefix("tcp:") {
            Some(host_port) => {
                let host_port = host_port.to_string();
                Box::pin(async move {
                    let stream = TcpStream::connect(host_port).await?;
                    stream.set_nodelay(true)?;
                    Ok(Box::new(stream) as BoxedStream)
                })
            }
            None => Box::pin(async move { open_device(&address) }),
        };
        Some(opening)
    }
}

#[cfg(unix)]
fn open_device(path: &str) -> io::Result<BoxedStream> {
    Ok(Box::new(super::device::DeviceStream::open(path)?))
}

#[cfg(not(unix))]
fn open_device(path: &str) -> io::Result<BoxedStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("device paths are not supported on this platform: {path}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn directory(entries: &[(&str, &str)]) -> ConfigDirectory {
        ConfigDirectory::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn paired_lists_configured_names() {
        let dir = directory(&[("desk", "tcp:127.0.0.1:1"), ("bed", "/dev/rfcomm0")]);
        assert_eq!(dir.paired(), vec!["bed".to_string(), "desk".to_string()]);
        assert!(dir.open("kitchen").is_none());
    }

    #[tokio::test]
    async fn tcp_peer_opens_a_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let address = format!("tcp:{addr}");
        let dir = directory(&[("desk", address.as_str())]);

        let mut stream = dir.open("desk").unwrap().await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        stream.write_all(b"GET_SONGS\n").await.unwrap();

        let mut buf = [0u8; 10];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET_SONGS\n");
    }

    #[tokio::test]
    async fn missing_device_path_fails_to_open() {
        let dir = directory(&[("ghost", "/nonexistent/wakebot-device")]);
        assert!(dir.open("ghost").unwrap().await.is_err());
    }
}
