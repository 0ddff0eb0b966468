use std::path::Path;

use bytebus_sock::ChannelRegistry;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::cmd::ChannelsArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct ChannelRow {
    channel: String,
    socket: String,
    state: &'static str,
}

#[derive(Debug, Serialize)]
struct ChannelsOutput {
    bus_dir: String,
    channels: Vec<ChannelRow>,
}

pub fn run(args: ChannelsArgs, format: OutputFormat) -> CliResult<i32> {
    let dir = args
        .dir
        .unwrap_or_else(|| ChannelRegistry::global().bus_dir().to_path_buf());

    let output = ChannelsOutput {
        bus_dir: dir.display().to_string(),
        channels: scan(&dir)?,
    };
    print_channels(&output, format);

    Ok(SUCCESS)
}

fn scan(dir: &Path) -> CliResult<Vec<ChannelRow>> {
    let mut rows = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        // A missing bus directory just means no channel has published yet.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(rows),
        Err(err) => return Err(io_error("failed reading bus directory", err)),
    };

    for entry in entries {
        let entry = entry.map_err(|err| io_error("failed reading bus directory", err))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sock") {
            continue;
        }
        let channel = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        rows.push(ChannelRow {
            channel,
            state: probe(&path),
            socket: path.display().to_string(),
        });
    }

    rows.sort_by(|a, b| a.channel.cmp(&b.channel));
    Ok(rows)
}

/// A connectable socket has a live publisher behind it; anything else is a
/// leftover from an unclean shutdown.
#[cfg(unix)]
fn probe(path: &Path) -> &'static str {
    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_probe) => "live",
        Err(_) => "stale",
    }
}

#[cfg(not(unix))]
fn probe(_path: &Path) -> &'static str {
    "unknown"
}

fn print_channels(output: &ChannelsOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "STATE", "SOCKET"]);
            for row in &output.channels {
                table.add_row(vec![
                    row.channel.clone(),
                    row.state.to_string(),
                    row.socket.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("bus_dir={}", output.bus_dir);
            for row in &output.channels {
                println!(
                    "channel={} state={} socket={}",
                    row.channel, row.state, row.socket
                );
            }
        }
        OutputFormat::Raw => {
            for row in &output.channels {
                println!("{}", row.channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never-created");
        assert!(scan(&gone).unwrap().is_empty());
    }

    #[test]
    fn non_socket_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"irrelevant").unwrap();
        assert!(scan(dir.path()).unwrap().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn stale_socket_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orphan.sock");
        let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(listener); // leaves the file with nothing behind it

        let rows = scan(dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "orphan");
        assert_eq!(rows[0].state, "stale");
    }

    #[test]
    #[cfg(unix)]
    fn live_socket_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let rows = scan(dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, "live");
    }
}
