use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use log::debug;
use seq_io::fastq::{Reader as FastqReader, Record};

use crate::config::defs::COMBINED_FNA;
use crate::utils::file::is_gzipped;
use crate::utils::samples::SampleRecord;

/// Plain or gzip byte stream, picked from the file's magic bytes.
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = File::open(path)?;
    Ok(if gz {
        FileReader::Gzipped(MultiGzDecoder::new(file))
    } else {
        FileReader::Uncompressed(BufReader::new(file))
    })
}

/// Lazy FASTQ record reader over a plain or gzipped file.
pub fn fastq_reader(path: &Path) -> io::Result<FastqReader<FileReader>> {
    Ok(FastqReader::new(open_reader(path)?))
}

/// Writes one unwrapped FASTA record.
pub fn write_fasta_record<W: Write>(writer: &mut W, id: &str, seq: &[u8]) -> io::Result<()> {
    writer.write_all(b">")?;
    writer.write_all(id.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn append_reads<W: Write>(writer: &mut W, path: &Path, sample_id: &str, count: &mut u64) -> io::Result<()> {
    let mut reader = fastq_reader(path)?;
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), e))
        })?;
        write_fasta_record(writer, &format!("{}_{}", sample_id, count), record.seq())?;
        *count += 1;
    }
    Ok(())
}

/// Concatenates every sample's reads into `combined.fna` inside `temp_dir`.
///
/// Headers are `>{sample_id}_{n}` where `n` counts reads across all samples,
/// forward file first, then reverse.
///
/// # Arguments
///
/// * `temp_dir` - Scratch directory for the job.
/// * `samples` - Resolved samples, in pairing order.
///
/// # Returns
/// Path of the combined FASTA file.
pub fn generate_fna_file(temp_dir: &Path, samples: &[SampleRecord]) -> io::Result<PathBuf> {
    let output_path = temp_dir.join(COMBINED_FNA);
    let mut writer = BufWriter::new(File::create(&output_path)?);
    let mut count: u64 = 0;

    for sample in samples {
        append_reads(&mut writer, &sample.forward, &sample.sample_id, &mut count)?;
        if let Some(reverse) = &sample.reverse {
            append_reads(&mut writer, reverse, &sample.sample_id, &mut count)?;
        }
    }
    writer.flush()?;
    debug!("Wrote {} reads to {}", count, output_path.display());
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    fn write_gz(path: &Path, text: &str) -> io::Result<()> {
        let mut enc = GzEncoder::new(File::create(path)?, Compression::default());
        enc.write_all(text.as_bytes())?;
        enc.finish()?;
        Ok(())
    }

    fn sample(rp: &str, id: &str, fwd: PathBuf, rev: Option<PathBuf>) -> SampleRecord {
        SampleRecord {
            run_prefix: rp.to_string(),
            sample_id: id.to_string(),
            forward: fwd,
            reverse: rev,
        }
    }

    #[test]
    fn test_fastq_reader_plain_and_gzipped() -> io::Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("r.fastq");
        std::fs::write(&plain, "@a\nACGT\n+\nIIII\n@b\nGG\n+\nII\n")?;
        let gz = dir.path().join("r.fastq.gz");
        write_gz(&gz, "@a\nACGT\n+\nIIII\n@b\nGG\n+\nII\n")?;

        for path in [&plain, &gz] {
            let mut reader = fastq_reader(path)?;
            let mut seqs = Vec::new();
            while let Some(rec) = reader.next() {
                let rec = rec.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                seqs.push(String::from_utf8_lossy(rec.seq()).into_owned());
            }
            assert_eq!(seqs, vec!["ACGT", "GG"]);
        }
        Ok(())
    }

    #[test]
    fn test_generate_fna_file() -> io::Result<()> {
        let dir = tempdir()?;
        let s1_r1 = dir.path().join("s1_R1.fastq.gz");
        let s1_r2 = dir.path().join("s1_R2.fastq.gz");
        let s2_r1 = dir.path().join("s2_R1.fastq");
        write_gz(&s1_r1, "@r1 1:N\nAAAA\n+\nIIII\n@r2 1:N\nCCCC\n+\nIIII\n")?;
        write_gz(&s1_r2, "@r1 2:N\nGGGG\n+\nIIII\n")?;
        std::fs::write(&s2_r1, "@x\nTTTT\n+\nIIII\n")?;

        let samples = vec![
            sample("s1", "SKB1", s1_r1, Some(s1_r2)),
            sample("s2", "SKB2", s2_r1, None),
        ];
        let out = generate_fna_file(dir.path(), &samples)?;
        assert_eq!(out, dir.path().join("combined.fna"));
        assert_eq!(
            std::fs::read_to_string(&out)?,
            ">SKB1_0\nAAAA\n>SKB1_1\nCCCC\n>SKB1_2\nGGGG\n>SKB2_3\nTTTT\n"
        );
        Ok(())
    }

    #[test]
    fn test_generate_fna_file_missing_input() {
        let dir = tempdir().unwrap();
        let samples = vec![sample("s1", "SKB1", dir.path().join("nope.fastq.gz"), None)];
        assert!(generate_fna_file(dir.path(), &samples).is_err());
    }
}
