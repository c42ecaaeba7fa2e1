//! Interactive REPL client: sends one command per line over the wire
//! protocol and prints the reply. History persists across sessions in the
//! OS temp directory, same convention as the reference client.

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "rustystore-cli", about = "Interactive client for a rustystore node")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 4224)]
    port: u16,
}

fn history_path() -> std::path::PathBuf {
    std::env::temp_dir().join(".rustystore_history")
}

fn main() {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut editor = DefaultEditor::new().expect("could not initialize line editor");
    let _ = editor.load_history(&history_path());

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match execute(&addr, &line) {
                    Ok(reply) => println!("{reply}"),
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Aborted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("Error reading line: {e}");
            }
        }
    }

    if let Err(e) = editor.save_history(&history_path()) {
        println!("Error writing history file: {e}");
    }
}

/// Dials the node fresh for each command, same one-shot-connection model
/// as the wire protocol's relay hops.
fn execute(addr: &str, request: &str) -> std::io::Result<String> {
    use std::io::Write;

    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    write!(stream, "{request}\n")?;

    let mut status = [0u8; 1];
    stream.read_exact(&mut status)?;

    let mut length_bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        if byte[0] == b'\n' {
            break;
        }
        length_bytes.push(byte[0]);
    }

    let length: usize = String::from_utf8_lossy(&length_bytes)
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed reply length"))?;

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload)?;
    let payload = String::from_utf8_lossy(&payload).into_owned();

    if status[0] == b'+' {
        Ok(payload)
    } else {
        Err(std::io::Error::new(std::io::ErrorKind::Other, payload))
    }
}
