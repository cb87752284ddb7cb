use std::ops::ControlFlow;
use std::process::ExitCode;

use argh::FromArgs;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ctdump::dump::DumpSession;
use ctdump::message::{AF_INET, AF_INET6};
use ctdump::socket::NetlinkSocket;

/// Dump the kernel's connection tracking table.
#[derive(FromArgs)]
struct Options {
    /// address family to dump, "ipv4" or "ipv6"
    #[argh(option, default = "String::from(\"ipv4\")")]
    family: String,

    /// log level, overridden by the CTDUMP_LOG environment variable
    #[argh(option, default = "String::from(\"info\")")]
    log_level: String,
}

fn main() -> ExitCode {
    let options: Options = argh::from_env();

    let directives =
        std::env::var("CTDUMP_LOG").unwrap_or_else(|_| options.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .init();

    let family = match options.family.as_str() {
        "ipv4" => AF_INET,
        "ipv6" => AF_INET6,
        family => {
            error!(message = "unknown address family", family);
            return ExitCode::FAILURE;
        }
    };

    let socket = match NetlinkSocket::connect() {
        Ok(socket) => socket,
        Err(err) => {
            error!(message = "failed to open netlink socket", ?err);
            return ExitCode::FAILURE;
        }
    };

    let mut session = DumpSession::new(socket);
    let result = session.run(family, |flow| {
        println!("{}", flow);

        ControlFlow::Continue(())
    });

    if let Err(err) = result {
        error!(message = "dump failed", ?err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
