//! The wire codec: one newline-terminated request line in, one
//! status-prefixed, length-prefixed reply out. Shared by the client-facing
//! listener and peer-to-peer relay.

use crate::command::{self, Command, CommandResult};
use crate::error::{DbError, Result};
use crate::router::NodeRef;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Reads one line from `reader`, strips the trailing `\n` (and a `\r` if
/// present), and parses it into a `Command`. Returns `Ok(None)` on a clean
/// EOF before any bytes were read (the peer simply closed the socket).
pub async fn read_command<R>(reader: &mut BufReader<R>) -> Result<Option<Command>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await.map_err(DbError::Io)?;

    if bytes_read == 0 {
        return Ok(None);
    }

    let line = line.trim_end_matches(['\n', '\r']);
    command::parse(line).map(Some)
}

/// Serializes a successful result as `+<len>\n<payload>`.
pub fn encode_success(result: &CommandResult) -> Vec<u8> {
    let payload: &[u8] = match result {
        CommandResult::Void => &[],
        CommandResult::Payload(s) => s.as_bytes(),
    };
    encode_reply(b'+', payload)
}

/// Serializes an error as `-<len>\n<message>`. Routing failures (empty
/// membership) are surfaced to the client as plain protocol errors, same
/// as a malformed command.
pub fn encode_error(error: &DbError) -> Vec<u8> {
    let message = match error {
        DbError::Protocol(msg) | DbError::Routing(msg) | DbError::Relay(msg) | DbError::Unavailable(msg) => {
            msg.clone()
        }
        other => other.to_string(),
    };
    encode_reply(b'-', message.as_bytes())
}

fn encode_reply(status: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 12);
    out.push(status);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b'\n');
    out.extend_from_slice(payload);
    out
}

/// Writes an encoded reply and flushes.
pub async fn write_reply<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(bytes).await.map_err(DbError::Io)?;
    writer.flush().await.map_err(DbError::Io)?;
    Ok(())
}

/// Reads one status-prefixed reply from a peer connection (used by relay
/// and by the stabilization loop to interpret a migrated key's reply).
pub async fn read_reply<R>(reader: &mut BufReader<R>) -> Result<std::result::Result<CommandResult, String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut status = [0u8; 1];
    reader.read_exact(&mut status).await.map_err(DbError::Io)?;

    let mut length_line = String::new();
    reader.read_line(&mut length_line).await.map_err(DbError::Io)?;
    let length: usize = length_line
        .trim_end_matches(['\n', '\r'])
        .parse()
        .map_err(|_| DbError::Protocol("malformed reply length".to_string()))?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(DbError::Io)?;
    let payload = String::from_utf8_lossy(&payload).into_owned();

    match status[0] {
        b'+' => Ok(Ok(if payload.is_empty() { CommandResult::Void } else { CommandResult::Payload(payload) })),
        b'-' => Ok(Err(payload)),
        other => Err(DbError::Protocol(format!("unknown status byte: {other}"))),
    }
}

/// Opens a fresh connection to `owner`, writes `command`'s textual form,
/// and reads back its reply. Used both for one-hop client relay and for
/// per-key stabilization migrations.
pub async fn relay_to(command: &Command, owner: &NodeRef) -> Result<CommandResult> {
    let mut stream = TcpStream::connect(owner.client_addr())
        .await
        .map_err(|e| DbError::Relay(format!("could not reach {owner}: {e}")))?;

    let line = format!("{}\n", command.text());
    stream.write_all(line.as_bytes()).await.map_err(|e| DbError::Relay(e.to_string()))?;

    let mut reader = BufReader::new(stream);
    match read_reply(&mut reader).await? {
        Ok(result) => Ok(result),
        Err(message) => Err(DbError::Relay(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_and_parses_a_store_command() {
        let mut reader = BufReader::new("store key value\n".as_bytes());
        let command = read_command(&mut reader).await.unwrap().unwrap();
        assert_eq!(command, Command::Store { key: "key".to_string(), value: "value".to_string() });
    }

    #[tokio::test]
    async fn clean_eof_before_any_bytes_yields_none() {
        let mut reader = BufReader::new("".as_bytes());
        assert!(read_command(&mut reader).await.unwrap().is_none());
    }

    #[test]
    fn encodes_void_success_as_plus_zero() {
        assert_eq!(encode_success(&CommandResult::Void), b"+0\n".to_vec());
    }

    #[test]
    fn encodes_payload_with_its_byte_length() {
        let bytes = encode_success(&CommandResult::Payload("some-value".to_string()));
        assert_eq!(bytes, b"+10\nsome-value".to_vec());
    }

    #[test]
    fn encodes_protocol_errors_without_the_error_prefix() {
        let bytes = encode_error(&DbError::Protocol("No value given".to_string()));
        assert_eq!(bytes, b"-14\nNo value given".to_vec());
    }

    #[tokio::test]
    async fn round_trips_a_success_reply() {
        let bytes = encode_success(&CommandResult::Payload("v".to_string()));
        let mut reader = BufReader::new(bytes.as_slice());
        let reply = read_reply(&mut reader).await.unwrap();
        assert_eq!(reply, Ok(CommandResult::Payload("v".to_string())));
    }

    #[tokio::test]
    async fn round_trips_an_error_reply() {
        let bytes = encode_error(&DbError::Protocol("No value given".to_string()));
        let mut reader = BufReader::new(bytes.as_slice());
        let reply = read_reply(&mut reader).await.unwrap();
        assert_eq!(reply, Err("No value given".to_string()));
    }
}
