use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory of host files to pack
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory for the disk image
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Image directory the files land under
    #[arg(long, short, default_value = "/")]
    pub prefix: String,
}
