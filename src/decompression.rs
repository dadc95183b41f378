use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

type ChainReader = Chain<Cursor<Vec<u8>>, File>;
type GzipReader = BufReader<MultiGzDecoder<ChainReader>>;
type ZstdReader = BufReader<zstd::Decoder<'static, BufReader<ChainReader>>>;
type PlainReader = BufReader<ChainReader>;

/// Streaming reader for a batch file.
/// Detects gzip (1F 8B 08) and zstd (28 B5 2F FD) compression using magic bytes
pub enum DecompressionReader {
    Gzip(GzipReader),
    Zstd(ZstdReader),
    /// Uncompressed input
    Plain(PlainReader),
}

impl std::fmt::Debug for DecompressionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl BufRead for DecompressionReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            DecompressionReader::Gzip(reader) => reader.fill_buf(),
            DecompressionReader::Zstd(reader) => reader.fill_buf(),
            DecompressionReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            DecompressionReader::Gzip(reader) => reader.consume(amt),
            DecompressionReader::Zstd(reader) => reader.consume(amt),
            DecompressionReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for DecompressionReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            DecompressionReader::Gzip(reader) => reader.read(buf),
            DecompressionReader::Zstd(reader) => reader.read(buf),
            DecompressionReader::Plain(reader) => reader.read(buf),
        }
    }
}

fn is_gzip(head: &[u8]) -> bool {
    head.len() >= 3 && head[..3] == [0x1F, 0x8B, 0x08]
}

fn is_zstd(head: &[u8]) -> bool {
    head.len() >= 4 && head[..4] == [0x28, 0xB5, 0x2F, 0xFD]
}

fn detect_compression_file(mut file: File) -> std::io::Result<DecompressionReader> {
    let mut head = [0u8; 4];
    let mut n = 0;
    // Short files can hand back fewer bytes than asked
    while n < head.len() {
        match file.read(&mut head[n..])? {
            0 => break,
            read => n += read,
        }
    }
    let head = &head[..n];

    // Put the sniffed bytes back in front
    let chained = Cursor::new(head.to_vec()).chain(file);

    if is_gzip(head) {
        Ok(DecompressionReader::Gzip(BufReader::new(MultiGzDecoder::new(chained))))
    } else if is_zstd(head) {
        let decoder = zstd::Decoder::new(chained)?;
        Ok(DecompressionReader::Zstd(BufReader::new(decoder)))
    } else {
        Ok(DecompressionReader::Plain(BufReader::new(chained)))
    }
}

impl DecompressionReader {
    /// Open a batch file, picking the decoder from its leading bytes
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            if extension.eq_ignore_ascii_case("zip") {
                return Err(anyhow!(
                    "ZIP file decompression is not supported. Only gzip and zstd files are supported for streaming decompression. Extract the ZIP file first: unzip {}",
                    path.display()
                ));
            }
        }

        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        detect_compression_file(file)
            .with_context(|| format!("Failed to detect compression format of {}", path.display()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecompressionReader::Gzip(_) => "gzip",
            DecompressionReader::Zstd(_) => "zstd",
            DecompressionReader::Plain(_) => "plain",
        }
    }
}
