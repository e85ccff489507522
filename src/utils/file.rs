use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::config::defs::FASTQ_EXTS;

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Compresses `path` next to itself as `path.gz` and returns the new path.
pub fn gzip_file(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut reader = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    Ok(gz_path)
}

/// Creates an empty file, leaving existing content alone.
pub fn touch(path: &Path) -> io::Result<()> {
    fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// File name with trailing FASTQ/compression extensions removed.
///
/// `./folder/file1.R1.fastq.gz` becomes `file1.R1`.
pub fn strip_fastq_extensions(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    while let Some(ext) = FASTQ_EXTS.iter().find(|ext| name.ends_with(*ext) && name.len() > ext.len()) {
        name.truncate(name.len() - ext.len());
    }
    name
}

/// Lists the database folders under `db_root`, keyed by folder name.
///
/// With `nested` set the database path is `<root>/<name>/<name>`, the layout
/// bowtie2 index prefixes use; otherwise it is the folder itself.
pub fn list_databases(db_root: &Path, nested: bool) -> io::Result<BTreeMap<String, PathBuf>> {
    let mut dbs = BTreeMap::new();
    for entry in fs::read_dir(db_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let db_path = if nested { entry.path().join(&name) } else { entry.path() };
        dbs.insert(name, db_path);
    }
    Ok(dbs)
}
