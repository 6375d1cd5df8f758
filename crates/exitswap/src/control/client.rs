//! Tor control port client
//!
//! Speaks the control-spec line protocol over TCP to:
//! - Authenticate with a control password
//! - Send `SIGNAL NEWNYM` to request a new identity
//! - Read `GETINFO` values (circuit status)
//!
//! Reference: https://spec.torproject.org/control-spec/
//!
//! Each renewal opens a fresh connection. The authenticated connection is
//! kept for the status query that follows and closed afterwards.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::Controller;
use exitswap_common::ControlError;

/// Status code for a successful command
const REPLY_OK: u16 = 250;

/// Status code for a rejected credential
const REPLY_AUTH_FAILED: u16 = 515;

/// A complete control-port reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    /// Three-digit status code of the final line
    pub code: u16,
    /// Reply lines without status prefixes; data blocks are joined with `\n`
    pub lines: Vec<String>,
}

impl ControlReply {
    pub fn is_ok(&self) -> bool {
        self.code == REPLY_OK
    }

    /// Turn non-250 replies into errors
    pub fn into_result(self) -> Result<Self, ControlError> {
        match self.code {
            REPLY_OK => Ok(self),
            REPLY_AUTH_FAILED => Err(ControlError::Authentication(self.lines.join("; "))),
            code => Err(ControlError::Protocol {
                code,
                message: self.lines.join("; "),
            }),
        }
    }

    /// Value of `key` in a GETINFO reply
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.trim_start_matches('\n'))
        })
    }
}

/// Quote a string argument (used for AUTHENTICATE passwords)
pub fn quote_string(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// One control-port connection over any byte stream
pub struct ControlConnection<S> {
    stream: BufReader<S>,
}

impl<S> ControlConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Send one command line and read its reply
    pub async fn command(&mut self, line: &str) -> Result<ControlReply, ControlError> {
        let writer = self.stream.get_mut();
        writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
        writer.flush().await?;

        self.read_reply().await
    }

    /// Read lines until the end line (`NNN `) of a reply
    pub async fn read_reply(&mut self) -> Result<ControlReply, ControlError> {
        let mut lines = Vec::new();

        loop {
            let line = self.read_line().await?;
            let (code, separator, body) = split_reply_line(&line)?;

            match separator {
                ' ' => {
                    lines.push(body.to_string());
                    return Ok(ControlReply { code, lines });
                }
                '-' => lines.push(body.to_string()),
                '+' => {
                    let mut data = body.to_string();
                    loop {
                        let data_line = self.read_line().await?;
                        if data_line == "." {
                            break;
                        }
                        // Leading dots are doubled on the wire
                        let data_line = data_line.strip_prefix('.').unwrap_or(&data_line);
                        data.push('\n');
                        data.push_str(data_line);
                    }
                    lines.push(data);
                }
                other => {
                    return Err(ControlError::Protocol {
                        code,
                        message: format!("unknown reply separator {:?}", other),
                    });
                }
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, ControlError> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(ControlError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control port closed the connection",
            )));
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str), ControlError> {
    let malformed = || ControlError::Protocol {
        code: 0,
        message: format!("malformed reply line: {:?}", line),
    };

    let code = line
        .get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let separator = line.get(3..4).and_then(|s| s.chars().next()).ok_or_else(malformed)?;
    let body = line.get(4..).ok_or_else(malformed)?;

    Ok((code, separator, body))
}

/// Tor control port client
pub struct TorControlClient {
    /// Control port address (host:port)
    addr: String,
    /// Per-exchange timeout
    timeout: Duration,
    /// Authenticated connection left open by the last renewal
    session: Mutex<Option<ControlConnection<TcpStream>>>,
}

impl TorControlClient {
    /// Create a client for `host:port`
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout,
            session: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<ControlConnection<TcpStream>, ControlError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ControlError::Timeout(format!("connecting to {}", self.addr)))??;

        Ok(ControlConnection::new(stream))
    }

    /// Run one command under the exchange timeout, requiring a 250 reply
    async fn exchange(
        &self,
        conn: &mut ControlConnection<TcpStream>,
        command: &str,
        label: &str,
    ) -> Result<ControlReply, ControlError> {
        tokio::time::timeout(self.timeout, conn.command(command))
            .await
            .map_err(|_| ControlError::Timeout(label.to_string()))??
            .into_result()
    }

    /// Best-effort QUIT before dropping a connection
    async fn close(&self, mut conn: ControlConnection<TcpStream>) {
        match tokio::time::timeout(self.timeout, conn.command("QUIT")).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "QUIT failed"),
            Err(_) => tracing::debug!("QUIT timed out"),
        }
    }
}

#[async_trait]
impl Controller for TorControlClient {
    async fn authenticate_and_renew(&self, credential: &str) -> Result<(), ControlError> {
        let mut session = self.session.lock().await;
        if let Some(stale) = session.take() {
            self.close(stale).await;
        }

        let mut conn = self.connect().await?;

        let auth = format!("AUTHENTICATE {}", quote_string(credential));
        self.exchange(&mut conn, &auth, "AUTHENTICATE").await?;
        self.exchange(&mut conn, "SIGNAL NEWNYM", "SIGNAL NEWNYM").await?;

        tracing::debug!(addr = %self.addr, "NEWNYM accepted");

        *session = Some(conn);
        Ok(())
    }

    async fn query_status(&self, key: &str) -> Result<String, ControlError> {
        let mut conn = self.session.lock().await.take().ok_or(ControlError::NoSession)?;

        let result = self
            .exchange(&mut conn, &format!("GETINFO {}", key), "GETINFO")
            .await;
        self.close(conn).await;

        let reply = result?;
        reply
            .value(key)
            .map(str::to_string)
            .ok_or_else(|| ControlError::Protocol {
                code: reply.code,
                message: format!("reply did not contain {}", key),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("secret"), r#""secret""#);
        assert_eq!(quote_string(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn test_split_reply_line() {
        assert_eq!(split_reply_line("250 OK").unwrap(), (250, ' ', "OK"));
        assert_eq!(
            split_reply_line("250-version=0.4.8").unwrap(),
            (250, '-', "version=0.4.8")
        );
        assert!(split_reply_line("OK").is_err());
        assert!(split_reply_line("25x OK").is_err());
    }

    #[tokio::test]
    async fn test_command_single_line_reply() {
        let mock = tokio_test::io::Builder::new()
            .write(b"SIGNAL NEWNYM\r\n")
            .read(b"250 OK\r\n")
            .build();
        let mut conn = ControlConnection::new(mock);

        let reply = conn.command("SIGNAL NEWNYM").await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.lines, vec!["OK".to_string()]);
    }

    #[tokio::test]
    async fn test_getinfo_data_reply() {
        let mock = tokio_test::io::Builder::new()
            .write(b"GETINFO circuit-status\r\n")
            .read(b"250+circuit-status=\r\n")
            .read(b"1 BUILT $AAAA~relay1,$BBBB~relay2 PURPOSE=GENERAL\r\n")
            .read(b"..dotted\r\n")
            .read(b".\r\n250 OK\r\n")
            .build();
        let mut conn = ControlConnection::new(mock);

        let reply = conn.command("GETINFO circuit-status").await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(
            reply.value("circuit-status"),
            Some("1 BUILT $AAAA~relay1,$BBBB~relay2 PURPOSE=GENERAL\n.dotted")
        );
    }

    #[tokio::test]
    async fn test_mid_lines_and_missing_key() {
        let mock = tokio_test::io::Builder::new()
            .write(b"GETINFO version\r\n")
            .read(b"250-version=0.4.8.12\r\n250 OK\r\n")
            .build();
        let mut conn = ControlConnection::new(mock);

        let reply = conn.command("GETINFO version").await.unwrap();
        assert_eq!(reply.value("version"), Some("0.4.8.12"));
        assert_eq!(reply.value("circuit-status"), None);
    }

    #[tokio::test]
    async fn test_auth_failure_reply() {
        let mock = tokio_test::io::Builder::new()
            .write(b"AUTHENTICATE \"wrong\"\r\n")
            .read(b"515 Authentication failed: Password did not match\r\n")
            .build();
        let mut conn = ControlConnection::new(mock);

        let reply = conn.command(r#"AUTHENTICATE "wrong""#).await.unwrap();
        assert!(matches!(
            reply.into_result(),
            Err(ControlError::Authentication(msg)) if msg.contains("Password did not match")
        ));
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mock = tokio_test::io::Builder::new()
            .write(b"SIGNAL NEWNYM\r\n")
            .read(b"250-partial\r\n")
            .build();
        let mut conn = ControlConnection::new(mock);

        let result = conn.command("SIGNAL NEWNYM").await;
        assert!(matches!(result, Err(ControlError::Io(_))));
    }

    /// Minimal control port: accepts one password, answers NEWNYM and circuit-status
    async fn spawn_fake_tor(password: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let reply = if line == format!("AUTHENTICATE {}", quote_string(password)) {
                            "250 OK\r\n".to_string()
                        } else if line.starts_with("AUTHENTICATE") {
                            "515 Authentication failed\r\n".to_string()
                        } else if line == "SIGNAL NEWNYM" {
                            "250 OK\r\n".to_string()
                        } else if line == "GETINFO circuit-status" {
                            "250+circuit-status=\r\n1 BUILT $A~a,$B~b\r\n2 EXTENDED $C~c\r\n.\r\n250 OK\r\n"
                                .to_string()
                        } else if line == "QUIT" {
                            let _ = write.write_all(b"250 closing connection\r\n").await;
                            break;
                        } else {
                            "510 Unrecognized command\r\n".to_string()
                        };
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        port
    }

    #[tokio::test]
    async fn test_client_renew_then_query() {
        let port = spawn_fake_tor("hunter2").await;
        let client = TorControlClient::new("127.0.0.1", port, Duration::from_secs(5));

        client.authenticate_and_renew("hunter2").await.unwrap();
        let status = client.query_status("circuit-status").await.unwrap();
        assert_eq!(
            status.lines().collect::<Vec<_>>(),
            vec!["1 BUILT $A~a,$B~b", "2 EXTENDED $C~c"]
        );

        // The session is consumed by the query
        assert!(matches!(
            client.query_status("circuit-status").await,
            Err(ControlError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_client_bad_password() {
        let port = spawn_fake_tor("hunter2").await;
        let client = TorControlClient::new("127.0.0.1", port, Duration::from_secs(5));

        let result = client.authenticate_and_renew("nope").await;
        assert!(matches!(result, Err(ControlError::Authentication(_))));
        assert!(matches!(
            client.query_status("circuit-status").await,
            Err(ControlError::NoSession)
        ));
    }
}
