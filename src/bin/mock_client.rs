//! Mock HTTP client binary for integration testing
//!
//! `mock-client <host> <port> <path> [--exit-code N] [--truncate] [--sleep-ms N]`
//!
//! Fetches `path` and prints the response body. `--truncate` drops the
//! closing `</html>`, `--exit-code` forces the exit status and `--sleep-ms`
//! keeps the client alive after the fetch.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

fn main() {
    let mut positional = Vec::new();
    let mut exit_code = 0;
    let mut truncate = false;
    let mut sleep = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--exit-code" => exit_code = args.next().and_then(|v| v.parse().ok()).unwrap_or(1),
            "--truncate" => truncate = true,
            "--sleep-ms" => {
                sleep = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
            }
            _ => positional.push(arg),
        }
    }

    let [host, port, path] = match <[String; 3]>::try_from(positional) {
        Ok(p) => p,
        Err(_) => {
            eprintln!("usage: mock-client <host> <port> <path> [--exit-code N] [--truncate]");
            std::process::exit(2);
        }
    };
    let port: u16 = match port.parse() {
        Ok(p) => p,
        Err(_) => {
            eprintln!("Invalid port: {}", port);
            std::process::exit(2);
        }
    };

    let body = match fetch(&host, port, &path) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("Failed to connect to: {}:{} {} ({})", host, port, path, e);
            std::process::exit(1);
        }
    };

    let body = if truncate {
        body.replace("</html>", "")
    } else {
        body
    };
    print!("{}", body);
    std::io::stdout().flush().ok();

    if let Some(sleep) = sleep {
        std::thread::sleep(sleep);
    }
    std::process::exit(exit_code);
}

fn fetch(host: &str, port: u16, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect((host, port))?;
    write!(
        stream,
        "GET {} HTTP/1.0\r\nHost: {}:{}\r\n\r\n",
        path, host, port
    )?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;

    Ok(match response.split_once("\r\n\r\n") {
        Some((_, body)) => body.to_string(),
        None => response,
    })
}
