mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use chain_fs::{FileSystem, NUM_SECTORS, SECTOR_SIZE};
use chain_fs_fuse::BlockFile;
use clap::Parser;
use cli::Cli;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout_dir={:?}", cli.source, cli.out_dir);

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(cli.out_dir.join("fs.img"))?;
    fd.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)?;

    let device = Arc::new(BlockFile(Mutex::new(fd)));
    let fs = FileSystem::format(device).map_err(to_io)?;
    let mut fs = fs.lock();

    let prefix = cli.prefix.trim_end_matches('/');
    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| io::Error::other(format!("non-UTF-8 file name {name:?}")))?;
        log::info!("packing {name:?}");

        let mut data = Vec::new();
        File::open(entry.path())?.read_to_end(&mut data)?;

        let image_path = format!("{prefix}/{name}");
        fs.create(&image_path, data.len() as u32).map_err(to_io)?;
        let mut file = fs.open(&image_path).map_err(to_io)?;
        file.write_at(0, &data).map_err(to_io)?;
    }
    chain_fs::sync_all();

    for row in fs.list_recursively().map_err(to_io)? {
        let kind = if row.is_dir { "/" } else { "" };
        let health = if row.allocated { "" } else { " (dangling!)" };
        println!("{}{}{kind}{health}", "  ".repeat(row.depth), row.name);
    }

    Ok(())
}

fn to_io(e: chain_fs::Error) -> io::Error {
    io::Error::other(e.to_string())
}
