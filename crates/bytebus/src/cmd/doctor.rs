use std::sync::Arc;
use std::time::Duration;

use bytebus_sock::{ChannelRegistry, PublisherSocket, SubOptions, SubscriberSocket};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        platform_transport_check(),
        transport_inventory_check(),
        bus_dir_check(),
        loopback_roundtrip_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput { checks, overall };
    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn platform_transport_check() -> CheckResult {
    if cfg!(unix) {
        CheckResult {
            name: "platform_transport".to_string(),
            status: CheckStatus::Pass,
            detail: "Unix domain sockets available".to_string(),
        }
    } else {
        CheckResult {
            name: "platform_transport".to_string(),
            status: CheckStatus::Warn,
            detail: "no cross-process transport on this platform; in-process delivery only"
                .to_string(),
        }
    }
}

fn transport_inventory_check() -> CheckResult {
    let mut transports = vec!["local"];
    if cfg!(unix) {
        transports.insert(0, "unix-domain-socket");
    }
    CheckResult {
        name: "transports".to_string(),
        status: CheckStatus::Info,
        detail: transports.join(", "),
    }
}

/// Bind (and clean up) a real publisher in the bus directory.
fn bus_dir_check() -> CheckResult {
    let registry = Arc::new(ChannelRegistry::with_default_transport());
    let channel = format!("doctor-probe-{}", std::process::id());

    match PublisherSocket::open(&registry, &channel) {
        Ok(publisher) => {
            publisher.close();
            CheckResult {
                name: "bus_dir_writable".to_string(),
                status: CheckStatus::Pass,
                detail: format!("publisher bind succeeded in {}", registry.bus_dir().display()),
            }
        }
        Err(err) => CheckResult {
            name: "bus_dir_writable".to_string(),
            status: CheckStatus::Fail,
            detail: format!("publisher bind failed: {err}"),
        },
    }
}

fn loopback_roundtrip_check() -> CheckResult {
    let registry = Arc::new(ChannelRegistry::in_process());
    let result = (|| {
        let publisher = PublisherSocket::open(&registry, "doctor-loopback")?;
        let subscriber = SubscriberSocket::open(
            &registry,
            "doctor-loopback",
            SubOptions::with_timeout(Duration::from_millis(500)),
        )?;
        publisher.send(b"ping")?;
        subscriber.receive()
    })();

    match result {
        Ok(Some(message)) if message.as_ref() == b"ping" => CheckResult {
            name: "loopback_roundtrip".to_string(),
            status: CheckStatus::Pass,
            detail: "publish/receive round trip succeeded".to_string(),
        },
        Ok(Some(_)) => CheckResult {
            name: "loopback_roundtrip".to_string(),
            status: CheckStatus::Fail,
            detail: "round trip returned corrupted payload".to_string(),
        },
        Ok(None) => CheckResult {
            name: "loopback_roundtrip".to_string(),
            status: CheckStatus::Fail,
            detail: "round trip timed out".to_string(),
        },
        Err(err) => CheckResult {
            name: "loopback_roundtrip".to_string(),
            status: CheckStatus::Fail,
            detail: format!("round trip failed: {err}"),
        },
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("bytebus doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
    }
}
