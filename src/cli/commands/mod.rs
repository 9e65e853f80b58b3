use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

/// Pure clap command definitions with zero business logic
#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("config")
                .default_value("cert_exporter.yml")
                .env("CERT_EXPORTER_CONFIG")
                .help("Path to the YAML configuration file")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("listen")
                .env("CERT_EXPORTER_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'"
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9117")
                .env("CERT_EXPORTER_PORT")
                .help("listening port for the HTTP endpoints")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("metrics-path")
                .default_value("/metrics")
                .env("CERT_EXPORTER_METRICS_PATH")
                .help("Path under which to expose exporter metrics")
                .long("metrics-path")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("interval")
                .default_value("60")
                .env("CERT_EXPORTER_INTERVAL")
                .help("number of seconds between sweeps of the configured targets")
                .long("interval")
                .short('i')
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new("probe")
                .help("Probe a single target, print its metrics and exit")
                .long("probe")
                .long_help(
                    "Probe a single target once with the module given by --module,\n\
                    print the exposition text to stdout and exit.\n\
                    Exits non-zero when the probe fails.\n\n\
                    Examples: 'example.com', 'example.com:8443', '[2001:db8::1]:443'"
                )
                .value_name("TARGET"),
        )
        .arg(
            Arg::new("module")
                .default_value("default")
                .env("CERT_EXPORTER_MODULE")
                .help("Module used by --probe")
                .long("module")
                .short('m')
                .value_name("NAME"),
        )
        .arg(
            Arg::new("verbose")
                .help("Increase verbosity, -vv for debug, -vvv for trace")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
}
