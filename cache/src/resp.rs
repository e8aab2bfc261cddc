//! A [crate::Cache] replica speaking the redis serialization protocol (RESP2).
//!
//! Only the handful of commands needed to publish and read check results are supported:
//! `PING`, `GET`, `SET .. PX ..` (pipelined) and `KEYS`. A single connection is kept per
//! replica and re-established after any failure.

use crate::{Error, Item};
use bytes::{BufMut, Bytes, BytesMut};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream},
    net::TcpStream,
    sync::Mutex,
};
use tracing::debug;

/// Largest bulk string a server may send.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Configuration for [Client].
#[derive(Clone, Debug)]
pub struct Config {
    /// `host:port` of the replica.
    pub address: String,

    /// Upper bound on a single round trip (including connecting).
    pub timeout: Duration,
}

/// A decoded reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Value>>),
}

/// A connection to a single replica.
#[derive(Clone)]
pub struct Client {
    cfg: Config,
    connection: Arc<Mutex<Option<BufStream<TcpStream>>>>,
}

impl Client {
    /// Creates a client. The connection is established lazily.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            connection: Arc::default(),
        }
    }

    /// Sends `commands` in one write and reads one reply per command.
    pub async fn pipeline(&self, commands: &[Vec<Bytes>]) -> Result<Vec<Value>, Error> {
        match tokio::time::timeout(self.cfg.timeout, self.round_trip(commands)).await {
            Ok(result) => result,
            Err(_) => {
                // The connection may hold unread replies
                *self.connection.lock().await = None;
                Err(Error::Timeout)
            }
        }
    }

    async fn round_trip(&self, commands: &[Vec<Bytes>]) -> Result<Vec<Value>, Error> {
        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            debug!(address = self.cfg.address.as_str(), "connecting to replica");
            let stream = TcpStream::connect(&self.cfg.address).await?;
            stream.set_nodelay(true)?;
            *connection = Some(BufStream::new(stream));
        }
        let Some(stream) = connection.as_mut() else {
            return Err(Error::Closed);
        };
        let result = exchange(stream, commands).await;
        if result.is_err() {
            *connection = None;
        }
        result
    }
}

async fn exchange(
    stream: &mut BufStream<TcpStream>,
    commands: &[Vec<Bytes>],
) -> Result<Vec<Value>, Error> {
    let mut buf = BytesMut::new();
    for command in commands {
        encode(&mut buf, command);
    }
    stream.write_all(&buf).await?;
    stream.flush().await?;
    let mut replies = Vec::with_capacity(commands.len());
    for _ in commands {
        replies.push(decode(stream).await?);
    }
    Ok(replies)
}

/// Appends `args` to `buf` as a RESP array of bulk strings.
pub fn encode(buf: &mut BytesMut, args: &[Bytes]) {
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Reads a single reply. Nested arrays are not supported.
pub async fn decode<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Value, Error> {
    let (kind, line) = read_line(reader).await?;
    match kind {
        b'*' => {
            let len: i64 = parse(&line)?;
            if len < 0 {
                return Ok(Value::Array(None));
            }
            let mut values = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                let (kind, line) = read_line(reader).await?;
                if kind == b'*' {
                    return Err(Error::Protocol("nested arrays are not supported".into()));
                }
                values.push(scalar(reader, kind, line).await?);
            }
            Ok(Value::Array(Some(values)))
        }
        kind => scalar(reader, kind, line).await,
    }
}

async fn scalar<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    kind: u8,
    line: String,
) -> Result<Value, Error> {
    match kind {
        b'+' => Ok(Value::Simple(line)),
        b'-' => Ok(Value::Error(line)),
        b':' => Ok(Value::Integer(parse(&line)?)),
        b'$' => {
            let len: i64 = parse(&line)?;
            if len < 0 {
                return Ok(Value::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(Error::Protocol(format!("bulk string of {len} bytes")));
            }
            let mut data = vec![0u8; len as usize + 2];
            reader.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(Error::Protocol("bulk string not terminated".into()));
            }
            data.truncate(len as usize);
            Ok(Value::Bulk(Some(Bytes::from(data))))
        }
        other => Err(Error::Protocol(format!(
            "unexpected reply type {:?}",
            other as char
        ))),
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<(u8, String), Error> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Err(Error::Closed);
    }
    if line.len() < 3 || !line.ends_with(b"\r\n") {
        return Err(Error::Protocol("malformed reply line".into()));
    }
    let kind = line[0];
    let body = String::from_utf8_lossy(&line[1..line.len() - 2]).into_owned();
    Ok((kind, body))
}

fn parse(line: &str) -> Result<i64, Error> {
    line.parse()
        .map_err(|_| Error::Protocol(format!("invalid integer {line:?}")))
}

fn check(value: Value) -> Result<Value, Error> {
    match value {
        Value::Error(message) => Err(Error::Server(message)),
        value => Ok(value),
    }
}

impl crate::Cache for Client {
    fn name(&self) -> &str {
        &self.cfg.address
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut replies = self.pipeline(&[vec![Bytes::from_static(b"PING")]]).await?;
        match replies.pop().map(check).transpose()? {
            Some(Value::Simple(pong)) if pong == "PONG" => Ok(()),
            other => Err(Error::Protocol(format!("unexpected PING reply {other:?}"))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let command = vec![
            Bytes::from_static(b"GET"),
            Bytes::copy_from_slice(key.as_bytes()),
        ];
        let mut replies = self.pipeline(&[command]).await?;
        match replies.pop().map(check).transpose()? {
            Some(Value::Bulk(value)) => Ok(value),
            other => Err(Error::Protocol(format!("unexpected GET reply {other:?}"))),
        }
    }

    async fn set(&self, items: &[Item]) -> Result<(), Error> {
        if items.is_empty() {
            return Ok(());
        }
        let commands: Vec<Vec<Bytes>> = items
            .iter()
            .map(|item| {
                let ttl = item.ttl.as_millis().max(1);
                vec![
                    Bytes::from_static(b"SET"),
                    Bytes::copy_from_slice(item.key.as_bytes()),
                    item.value.clone(),
                    Bytes::from_static(b"PX"),
                    Bytes::from(ttl.to_string()),
                ]
            })
            .collect();
        for reply in self.pipeline(&commands).await? {
            check(reply)?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let command = vec![
            Bytes::from_static(b"KEYS"),
            Bytes::copy_from_slice(pattern.as_bytes()),
        ];
        let mut replies = self.pipeline(&[command]).await?;
        match replies.pop().map(check).transpose()? {
            Some(Value::Array(Some(values))) => Ok(values
                .into_iter()
                .filter_map(|value| match value {
                    Value::Bulk(Some(key)) => Some(String::from_utf8_lossy(&key).into_owned()),
                    _ => None,
                })
                .collect()),
            Some(Value::Array(None)) => Ok(Vec::new()),
            other => Err(Error::Protocol(format!("unexpected KEYS reply {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cache as _;
    use tokio::net::TcpListener;

    #[test]
    fn test_encode() {
        let mut buf = BytesMut::new();
        encode(
            &mut buf,
            &[Bytes::from_static(b"GET"), Bytes::from_static(b"key")],
        );
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    #[tokio::test]
    async fn test_decode() {
        let mut input: &[u8] = b"+OK\r\n-ERR wrong\r\n:42\r\n$5\r\nhello\r\n$-1\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n*-1\r\n";
        assert_eq!(
            decode(&mut input).await.unwrap(),
            Value::Simple("OK".into())
        );
        assert_eq!(
            decode(&mut input).await.unwrap(),
            Value::Error("ERR wrong".into())
        );
        assert_eq!(decode(&mut input).await.unwrap(), Value::Integer(42));
        assert_eq!(
            decode(&mut input).await.unwrap(),
            Value::Bulk(Some(Bytes::from_static(b"hello")))
        );
        assert_eq!(decode(&mut input).await.unwrap(), Value::Bulk(None));
        assert_eq!(
            decode(&mut input).await.unwrap(),
            Value::Array(Some(vec![
                Value::Bulk(Some(Bytes::from_static(b"a"))),
                Value::Bulk(Some(Bytes::from_static(b"b"))),
            ]))
        );
        assert_eq!(decode(&mut input).await.unwrap(), Value::Array(None));
        assert!(matches!(decode(&mut input).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let mut input: &[u8] = b"?what\r\n";
        assert!(matches!(decode(&mut input).await, Err(Error::Protocol(_))));
        let mut input: &[u8] = b"$5\r\nhelloXX";
        assert!(matches!(decode(&mut input).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_decode_rejects_oversized_bulk() {
        let mut input: &[u8] = b"$9223372036854775806\r\nhello\r\n";
        assert!(matches!(decode(&mut input).await, Err(Error::Protocol(_))));
        let mut input: &[u8] = b"*1\r\n$536870913\r\nhello\r\n";
        assert!(matches!(decode(&mut input).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_pipelined_set_against_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = BufStream::new(socket);
            let mut received = Vec::new();
            for _ in 0..2 {
                match decode(&mut stream).await.unwrap() {
                    Value::Array(Some(args)) => received.push(args),
                    other => panic!("unexpected command {other:?}"),
                }
            }
            stream.write_all(b"+OK\r\n+OK\r\n").await.unwrap();
            stream.flush().await.unwrap();
            received
        });

        let client = Client::new(Config {
            address,
            timeout: Duration::from_secs(5),
        });
        client
            .set(&[
                Item::new("a", "1", Duration::from_secs(60)),
                Item::new("b", "2", Duration::from_millis(1500)),
            ])
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(
            received[1],
            vec![
                Value::Bulk(Some(Bytes::from_static(b"SET"))),
                Value::Bulk(Some(Bytes::from_static(b"b"))),
                Value::Bulk(Some(Bytes::from_static(b"2"))),
                Value::Bulk(Some(Bytes::from_static(b"PX"))),
                Value::Bulk(Some(Bytes::from_static(b"1500"))),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_replica() {
        // Bind then drop to find a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = Client::new(Config {
            address,
            timeout: Duration::from_secs(5),
        });
        assert!(client.ping().await.is_err());
    }
}
