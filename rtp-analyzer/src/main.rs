use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

mod analyze;
mod convert;

fn cmd() -> Command {
    Command::new("rtp-analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Find RTP streams in a capture and guess their speech codec")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("analyze")
                .about("List RTP streams with packet counts, payload sizes and codec guess")
                .arg(
                    Arg::new("capture")
                        .help("pcap or rtpdump file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .help("report format")
                        .num_args(1)
                        .value_parser(["text", "yaml"])
                        .default_value("text"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("YAML file with demultiplexing options")
                        .num_args(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .help("only consider UDP datagrams to or from this port, repeatable")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(u16)),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .help("reject datagrams whose RTP version is not 2")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Run the external converter on a capture")
                .arg(
                    Arg::new("capture")
                        .help("pcap or rtpdump file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("output file, defaults to <capture>_converted.<3ga|evs-mime>")
                        .num_args(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("codec")
                        .short('c')
                        .long("codec")
                        .num_args(1)
                        .value_parser(["guess", "amr", "amr-wb", "evs"])
                        .default_value("guess"),
                )
                .arg(
                    Arg::new("framing")
                        .short('f')
                        .long("framing")
                        .num_args(1)
                        .value_parser(["ietf", "iu"])
                        .default_value("ietf"),
                )
                .arg(
                    Arg::new("converter")
                        .long("converter")
                        .help(
                            "converter program, repeat for each leading argument; \
                             the request arguments are appended",
                        )
                        .num_args(1)
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append)
                        .default_values(["python3", "pcap_parser.py"]),
                ),
        )
}

pub(crate) fn required<'a, T>(args: &'a ArgMatches, id: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(id)
        .ok_or_else(|| anyhow!("missing argument <{}>", id))
}

fn run(args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("analyze", args)) => analyze::analyze(args),
        Some(("convert", args)) => convert::convert(args),
        _ => Err(anyhow!("no subcommand given")),
    }
}

fn main() {
    pretty_env_logger::init();

    let args = cmd().get_matches();
    let code = match run(&args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    };
    std::process::exit(code)
}
