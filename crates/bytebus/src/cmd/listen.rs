use std::sync::Arc;

use bytebus_sock::{sub_sock, SockError};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{sock_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let subscriber = Arc::new(
        sub_sock(&args.channel, args.conflate, timeout)
            .map_err(|err| sock_error("subscribe failed", err))?,
    );
    install_ctrlc_handler(Arc::clone(&subscriber))?;

    let mut printed = 0usize;

    loop {
        match subscriber.receive() {
            Ok(Some(payload)) => {
                print_message(&args.channel, printed, &payload, format);
                printed = printed.saturating_add(1);

                if let Some(count) = args.count {
                    if printed >= count {
                        return Ok(SUCCESS);
                    }
                }
            }
            // Deadline elapsed with nothing available.
            Ok(None) => return Ok(TIMEOUT),
            // Ctrl-C closes the socket, unblocking the receive.
            Err(SockError::HandleClosed) => return Ok(SUCCESS),
            Err(err) => return Err(sock_error("receive failed", err)),
        }
    }
}

fn install_ctrlc_handler(subscriber: Arc<bytebus_sock::SubscriberSocket>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        subscriber.close();
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
