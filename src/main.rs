//! package-image - serialize a built subvolume into a portable package

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use subvol_pack::{package_image, Config, FormatRegistry, PackageDescriptor};

#[derive(Parser)]
#[command(name = "package-image")]
#[command(about = "serialize a btrfs subvolume built by an image layer into a portable package")]
#[command(long_about = "serialize a btrfs subvolume built by an image layer into a portable \
package (either a file, or a directory with a few files). only full packages are produced: \
two builds of the same parent layer are not guaranteed to be bit-identical, so an incremental \
package applied to the wrong one could silently corrupt the result.")]
#[command(version)]
struct Cli {
    /// a directory on a btrfs volume, where all the subvolume wrapper directories reside
    #[arg(long)]
    subvolumes_dir: PathBuf,

    /// the SubvolumeOnDisk JSON output of the image layer to package
    #[arg(long)]
    subvolume_json: PathBuf,

    /// package format, e.g. "sendstream"
    #[arg(long)]
    format: String,

    /// write the package file(s) to this path; must not exist
    #[arg(long)]
    output_path: PathBuf,

    /// TOML config file
    #[arg(long, env = "PACKAGE_IMAGE_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> subvol_pack::Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    init_tracing(&config);

    let registry = FormatRegistry::builtin(&config)?;
    tracing::debug!(formats = %registry.describe(), "format registry ready");

    let descriptor = PackageDescriptor {
        subvolumes_dir: cli.subvolumes_dir,
        subvolume_json: cli.subvolume_json,
        format: cli.format,
        output_path: cli.output_path,
    };
    package_image(&registry, &descriptor)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
