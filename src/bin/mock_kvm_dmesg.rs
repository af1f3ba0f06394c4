//! Mock kvm-dmesg binary for integration testing
//!
//! Takes the same arguments as the real tool, checks the symbol map is
//! readable, connects to the QMP socket and prints whatever the guest side
//! sends.

#[cfg(unix)]
fn main() {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::process::exit;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("usage: kvm-dmesg <System.map> <qmp-socket>");
        exit(2);
    }

    if let Err(e) = std::fs::read(&args[0]) {
        eprintln!("kvm-dmesg: cannot read {}: {}", args[0], e);
        exit(1);
    }

    let mut stream = match UnixStream::connect(&args[1]) {
        Ok(stream) => stream,
        Err(e) => {
            println!("Failed to connect to {}: {}", args[1], e);
            exit(1);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = std::io::copy(&mut stream, &mut out) {
        eprintln!("kvm-dmesg: read error: {}", e);
        exit(1);
    }
    let _ = out.flush();
}

#[cfg(not(unix))]
fn main() {
    eprintln!("kvm-dmesg mock: Unix-domain sockets are required");
    std::process::exit(1);
}
