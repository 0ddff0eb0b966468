use std::fs;
use std::io::Read;

use bytebus_sock::pub_sock;

use crate::cmd::{parse_duration, PublishArgs};
use crate::exit::{sock_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::OutputFormat;

pub fn run(args: PublishArgs, _format: OutputFormat) -> CliResult<i32> {
    let publisher =
        pub_sock(&args.channel).map_err(|err| sock_error("open failed", err))?;

    if let Some(count) = args.wait_subs {
        let settle_timeout = parse_duration(&args.settle_timeout)?;
        if !publisher.wait_for_subscribers(count, settle_timeout) {
            return Err(CliError::new(
                TIMEOUT,
                format!(
                    "only {} of {} subscribers attached within {}",
                    publisher.subscriber_count(),
                    count,
                    args.settle_timeout
                ),
            ));
        }
    }

    let payload = resolve_payload(&args)?;
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;

    let repeat = args.repeat.max(1);
    for i in 0..repeat {
        if i > 0 {
            if let Some(interval) = interval {
                std::thread::sleep(interval);
            }
        }
        publisher
            .send(&payload)
            .map_err(|err| sock_error("send failed", err))?;
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &PublishArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }

    let mut payload = Vec::new();
    std::io::stdin()
        .lock()
        .read_to_end(&mut payload)
        .map_err(|err| crate::exit::io_error("failed reading stdin", err))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_data(data: &str) -> PublishArgs {
        PublishArgs {
            channel: "test".to_string(),
            data: Some(data.to_string()),
            file: None,
            wait_subs: None,
            settle_timeout: "5s".to_string(),
            repeat: 1,
            interval: None,
        }
    }

    #[test]
    fn data_arg_becomes_payload() {
        let payload = resolve_payload(&args_with_data("hello")).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn file_arg_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"from-a-file").unwrap();

        let mut args = args_with_data("ignored");
        args.data = None;
        args.file = Some(path);

        let payload = resolve_payload(&args).unwrap();
        assert_eq!(payload, b"from-a-file");
    }

    #[test]
    fn missing_file_maps_to_io_error() {
        let mut args = args_with_data("ignored");
        args.data = None;
        args.file = Some("/nonexistent/payload.bin".into());

        assert!(resolve_payload(&args).is_err());
    }
}
