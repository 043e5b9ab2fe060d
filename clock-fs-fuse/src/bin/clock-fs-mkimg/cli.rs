use std::path::PathBuf;

use clap::Parser;
use typed_bytesize::ByteSizeIec;

#[derive(Parser)]
pub struct Cli {
    /// Output image path
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    /// Image size, e.g. `64MiB`
    #[arg(long, short, default_value = "16MiB")]
    pub size: ByteSizeIec,

    /// Files to store, one inode each
    pub files: Vec<PathBuf>,
}
