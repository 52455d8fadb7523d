mod lint;
mod protobuf;
mod workspace;

use std::process::exit;

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Options {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Build the gRPC protobuf files.
    BuildProto(protobuf::Options),
    /// Run lint.
    Lint(lint::Options),
    /// Run unit tests.
    UnitTest(unit_test::Options),
}

fn main() {
    let opts = Options::parse();

    use Command::*;
    let ret = match opts.command {
        BuildProto(opts) => protobuf::build(opts),
        Lint(_) => lint::lint(),
        UnitTest(opts) => unit_test::unit_test(opts),
    };

    if let Err(e) = ret {
        eprintln!("{e:#}");
        exit(1);
    }
}
