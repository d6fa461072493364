use clap::{Args, Parser, Subcommand, ValueEnum};
use msgseal_container::ContainerKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "msgseal",
    version,
    about = "Decode signed message envelopes and manage their archive containers"
)]
pub struct Cli {
    /// YAML config with `envelope`, `limits` and `container` sections
    #[arg(long, global = true, env = "MSGSEAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured wire message and report its parts and digests
    Decode(DecodeArgs),
    /// Inspect, verify or create archive containers
    Container(ContainerArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Content-Type header the message was received with
    #[arg(long)]
    pub content_type: String,

    /// Accept a fault in place of the signature
    #[arg(long)]
    pub allow_faults: bool,

    /// Raw message body
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub cmd: ContainerSub,
}

#[derive(Subcommand, Debug)]
pub enum ContainerSub {
    /// Print a JSON summary of a stored container
    Inspect(ContainerFileArgs),
    /// Validate a stored container and check its manifests
    Verify(ContainerFileArgs),
    /// Decode a wire message and store it as a new container
    Pack(PackArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ContainerFileArgs {
    /// Container archive (.asice)
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    /// Content-Type header the message was received with
    #[arg(long)]
    pub content_type: String,

    /// Query id the container file is named after
    #[arg(long)]
    pub query_id: String,

    #[arg(long, value_enum, default_value_t = Kind::Request)]
    pub kind: Kind,

    /// Directory receiving the container
    #[arg(long)]
    pub out: PathBuf,

    /// Raw message body
    pub file: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
}

impl From<Kind> for ContainerKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Request => ContainerKind::Request,
            Kind::Response => ContainerKind::Response,
        }
    }
}
