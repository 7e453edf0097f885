use crate::ipc::{IpcCommand, IpcResponse, get_socket_path};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Send a command to the daemon and get the response
pub fn send_command(command: &IpcCommand) -> Result<IpcResponse> {
    let socket_path = get_socket_path()?;

    let mut stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "Failed to connect to daemon at {}. Is the daemon running?",
            socket_path.display()
        )
    })?;

    // Set timeouts
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    // Send command as simple string
    writeln!(stream, "{}", command)?;
    stream.flush()?;

    // Read response
    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: IpcResponse =
        serde_json::from_str(&response_line).context("Failed to parse daemon response")?;

    Ok(response)
}

/// Human-readable rendering of a successful response
fn render(response: &IpcResponse) -> String {
    let mut out = String::new();
    match response {
        IpcResponse::Ok | IpcResponse::Error(_) => {}
        IpcResponse::Status {
            state,
            switching,
            searching,
            application_count,
            current_index,
            cache_fresh,
        } => {
            out.push_str("Daemon Status:\n");
            out.push_str(&format!("  State: {}\n", state));
            out.push_str(&format!("  Switching: {}\n", switching));
            out.push_str(&format!("  Searching: {}\n", searching));
            out.push_str(&format!("  Application count: {}\n", application_count));
            if let Some(idx) = current_index {
                out.push_str(&format!("  Current index: {}\n", idx));
            }
            out.push_str(&format!("  Cache fresh: {}\n", cache_fresh));
        }
        IpcResponse::Applications(apps) => {
            for app in apps {
                let marker = if app.is_active { "*" } else { " " };
                out.push_str(&format!("{} {} (pid {})\n", marker, app.name, app.pid));
                for title in &app.windows {
                    out.push_str(&format!("    {}\n", title));
                }
            }
        }
        IpcResponse::Results(results) => {
            for result in results {
                out.push_str(&format!(
                    "{:>5}  {:<11} {} (pid {})\n",
                    result.score,
                    format!("{:?}", result.kind),
                    result.text,
                    result.pid
                ));
            }
        }
    }
    out
}

/// Send command and print result, exit with appropriate code
pub fn send_command_and_exit(command: IpcCommand) -> ! {
    match send_command(&command) {
        Ok(IpcResponse::Error(e)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Ok(response) => {
            print!("{}", render(&response));
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
