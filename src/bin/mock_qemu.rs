//! Mock QEMU binary for integration testing
//!
//! Understands the arguments the harness passes to QEMU. The `-kernel` file
//! is a text script: every line is printed to the serial console (stdout),
//! except for these directives:
//!
//! - `@stall` stops console output but keeps the VM running
//! - `@exit N` exits immediately with status N
//! - `@pidfile PATH` writes the process id to PATH
//!
//! The monitor socket accepts `quit`. Every client of the QMP socket receives
//! the guest log (all non-directive lines) and is then disconnected.

#[cfg(unix)]
fn main() {
    mock::run();
}

#[cfg(not(unix))]
fn main() {
    eprintln!("mock-qemu: Unix-domain sockets are required");
    std::process::exit(1);
}

#[cfg(unix)]
mod mock {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixListener;
    use std::path::{Path, PathBuf};
    use std::process::exit;
    use std::time::Duration;
    use std::{env, fs, thread};

    pub fn run() {
        let args: Vec<String> = env::args().skip(1).collect();

        let Some(kernel) = arg_value(&args, "-kernel") else {
            eprintln!("mock-qemu: -kernel is required");
            exit(1);
        };
        let script = match fs::read_to_string(kernel) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("mock-qemu: could not load kernel {}: {}", kernel, e);
                exit(1);
            }
        };
        let guest_log: Vec<String> = script
            .lines()
            .filter(|line| !line.starts_with('@'))
            .map(str::to_string)
            .collect();

        let qmp = arg_value(&args, "-qmp").and_then(socket_path);
        let monitor = arg_value(&args, "-monitor").and_then(socket_path);
        let sockets: Vec<PathBuf> = qmp.iter().chain(monitor.iter()).cloned().collect();

        // Sockets are bound before the guest starts, as QEMU does
        if let Some(path) = &qmp {
            let listener = bind(path);
            thread::spawn(move || serve_qmp(listener, guest_log));
        }
        if let Some(path) = &monitor {
            let listener = bind(path);
            let sockets = sockets.clone();
            thread::spawn(move || serve_monitor(listener, sockets));
        }

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in script.lines() {
            if line == "@stall" {
                break;
            }
            if let Some(path) = line.strip_prefix("@pidfile") {
                if let Err(e) = fs::write(path.trim(), std::process::id().to_string()) {
                    eprintln!("mock-qemu: could not write pid file: {}", e);
                }
                continue;
            }
            if let Some(code) = line.strip_prefix("@exit") {
                cleanup(&sockets);
                exit(code.trim().parse().unwrap_or(1));
            }
            if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        drop(out);

        // Keep "running" until quit arrives or we get killed
        loop {
            thread::park();
        }
    }

    /// Value following `flag`
    fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    /// Path out of `unix:<path>,server,nowait`
    fn socket_path(spec: &str) -> Option<PathBuf> {
        spec.strip_prefix("unix:")
            .and_then(|rest| rest.split(',').next())
            .map(PathBuf::from)
    }

    fn bind(path: &Path) -> UnixListener {
        let _ = fs::remove_file(path);
        match UnixListener::bind(path) {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("mock-qemu: could not bind {}: {}", path.display(), e);
                exit(1);
            }
        }
    }

    fn serve_qmp(listener: UnixListener, guest_log: Vec<String>) {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            for line in &guest_log {
                if writeln!(stream, "{}", line).is_err() {
                    break;
                }
            }
        }
    }

    fn serve_monitor(listener: UnixListener, sockets: Vec<PathBuf>) {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                if line.trim() == "quit" {
                    cleanup(&sockets);
                    exit(0);
                }
            }
        }
    }

    fn cleanup(sockets: &[PathBuf]) {
        for path in sockets {
            let _ = fs::remove_file(path);
        }
    }
}
