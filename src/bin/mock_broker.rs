//! Mock broker binary for integration testing
//!
//! Binds an ephemeral port on 127.0.0.1, announces it the way the real
//! broker does and serves a fixed index page until it receives SIGTERM.
//! Switches select the misbehaviours the harness has to cope with:
//!
//! - `--split-announcement`: write the port in two separate writes
//! - `--no-newline`: leave the announcement line unterminated
//! - `--announce-port N`: announce N instead of the bound port
//! - `--silent`: never announce
//! - `--exit-before-ready N`: exit with status N before announcing
//! - `--ignore-sigterm`: only SIGKILL stops it
//! - `--die-after-ms N`: exit with status 3 after N ms on its own

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const INDEX_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>pstore</title></head>\n<body>\n<p>Hello from the pstore HTTP server!</p>\n</body>\n</html>\n";

static TERMINATED: AtomicBool = AtomicBool::new(false);

#[derive(Default)]
struct Options {
    split_announcement: bool,
    no_newline: bool,
    announce_port: Option<u32>,
    silent: bool,
    exit_before_ready: Option<i32>,
    ignore_sigterm: bool,
    die_after: Option<Duration>,
}

fn parse_args() -> Options {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--split-announcement" => options.split_announcement = true,
            "--no-newline" => options.no_newline = true,
            "--announce-port" => {
                options.announce_port = args.next().and_then(|v| v.parse().ok())
            }
            "--silent" => options.silent = true,
            "--ignore-sigterm" => options.ignore_sigterm = true,
            "--exit-before-ready" => {
                options.exit_before_ready = args.next().and_then(|v| v.parse().ok())
            }
            "--die-after-ms" => {
                options.die_after = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
            }
            // Flags the real broker takes
            "--announce-http-port" => {}
            other if other.starts_with("--http-port") => {}
            other => eprintln!("mock-broker: ignoring unknown argument '{}'", other),
        }
    }
    options
}

#[cfg(unix)]
extern "C" fn on_sigterm(_: libc::c_int) {
    TERMINATED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_sigterm_handler(ignore: bool) {
    let handler = if ignore {
        libc::SIG_IGN
    } else {
        on_sigterm as extern "C" fn(libc::c_int) as libc::sighandler_t
    };
    unsafe {
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
fn install_sigterm_handler(_ignore: bool) {}

fn main() {
    let options = parse_args();
    install_sigterm_handler(options.ignore_sigterm);

    println!("pstore broker starting");
    if let Some(code) = options.exit_before_ready {
        eprintln!("mock-broker: failed to open the store");
        std::process::exit(code);
    }

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    listener
        .set_nonblocking(true)
        .expect("set_nonblocking failed");
    let port = listener.local_addr().expect("no local address").port();

    if !options.silent {
        let announced = options.announce_port.unwrap_or(u32::from(port));
        announce(announced, &options);
    }

    let started = Instant::now();
    loop {
        if TERMINATED.load(Ordering::SeqCst) {
            println!("shutting down");
            std::process::exit(0);
        }
        if let Some(limit) = options.die_after {
            if started.elapsed() >= limit {
                eprintln!("mock-broker: fatal error, exiting");
                std::process::exit(3);
            }
        }

        match listener.accept() {
            Ok((stream, _)) => serve(stream),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10))
            }
            Err(e) => eprintln!("mock-broker: accept failed: {}", e),
        }
    }
}

fn announce(port: u32, options: &Options) {
    let mut stdout = std::io::stdout();
    let terminator = if options.no_newline { "" } else { "\n" };
    if options.split_announcement {
        // Break inside the port digits
        let digits = port.to_string();
        let (head, tail) = digits.split_at(1);
        write!(stdout, "HTTP listening on port {}", head).ok();
        stdout.flush().ok();
        std::thread::sleep(Duration::from_millis(20));
        write!(stdout, "{}{}", tail, terminator).ok();
    } else {
        write!(stdout, "HTTP listening on port {}{}", port, terminator).ok();
    }
    stdout.flush().ok();
}

fn serve(stream: TcpStream) {
    stream.set_nonblocking(false).ok();
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    // Drain headers
    let mut line = String::new();
    while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
        line.clear();
    }

    println!("{}", request_line.trim_end());

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (status, body) = match path {
        "/" | "/index.html" => ("200 OK", INDEX_PAGE),
        _ => ("404 Not Found", "not found\n"),
    };

    let mut stream = stream;
    let _ = write!(
        stream,
        "HTTP/1.0 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.flush();
}
