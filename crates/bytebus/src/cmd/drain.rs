use bytebus_sock::{drain_sock_raw, sub_sock};

use crate::cmd::{parse_duration, DrainArgs};
use crate::exit::{sock_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: DrainArgs, format: OutputFormat) -> CliResult<i32> {
    let settle = parse_duration(&args.settle)?;

    let subscriber = sub_sock(&args.channel, args.conflate, None)
        .map_err(|err| sock_error("subscribe failed", err))?;

    // Let in-flight traffic land; drain itself never waits.
    std::thread::sleep(settle);

    let messages =
        drain_sock_raw(&subscriber).map_err(|err| sock_error("drain failed", err))?;

    for (seq, payload) in messages.iter().enumerate() {
        print_message(&args.channel, seq, payload, format);
    }

    Ok(SUCCESS)
}
