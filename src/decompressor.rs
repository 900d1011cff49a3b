use crate::error::StageError;
use bzip2::read::BzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait Decompressor: Send + Sync {
    /// Expand `compressed` next to itself and return the expanded path.
    /// The compressed file is removed once the output is complete.
    fn decompress(&self, compressed: &Path) -> Result<PathBuf, StageError>;
}

/// `.dem.bz2` -> `.dem`
#[derive(Debug, Default, Clone, Copy)]
pub struct Bz2Decompressor;

impl Bz2Decompressor {
    pub fn output_path(compressed: &Path) -> PathBuf {
        match compressed.extension() {
            Some(ext) if ext == "bz2" => compressed.with_extension(""),
            _ => {
                let mut name = compressed.as_os_str().to_owned();
                name.push(".out");
                PathBuf::from(name)
            }
        }
    }
}

impl Decompressor for Bz2Decompressor {
    fn decompress(&self, compressed: &Path) -> Result<PathBuf, StageError> {
        let output = Self::output_path(compressed);
        tracing::info!(path = %compressed.display(), "Decompressing replay");

        match stream_decompress(compressed, &output) {
            Ok(bytes) => {
                fs::remove_file(compressed)?;
                tracing::info!(path = %output.display(), bytes, "Replay decompressed");
                Ok(output)
            }
            Err(e) => {
                // Never leave a truncated replay behind.
                let _ = fs::remove_file(&output);
                Err(StageError::Decompression(format!("{}: {}", compressed.display(), e)))
            }
        }
    }
}

fn stream_decompress(compressed: &Path, output: &Path) -> io::Result<u64> {
    let mut decoder = BzDecoder::new(BufReader::new(File::open(compressed)?));
    let mut writer = BufWriter::new(File::create(output)?);
    let bytes = io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}
