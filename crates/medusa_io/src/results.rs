use anyhow::{Context, Result, bail};
use medusa_core::MedusaError;
use medusa_core::record::{RECORD_WORDS, ResultSink, SolverRunRecord};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes occupied by one persisted record.
pub const RECORD_BYTES: usize = RECORD_WORDS * 4;

/// Results stream backed by a file.
///
/// Every appended record is flushed immediately so a batch interrupted by a
/// power cut or a retry failure keeps the records converged before it.
pub struct ResultsFile {
    writer: BufWriter<File>,
    path: PathBuf,
    records: usize,
}

impl ResultsFile {
    /// Creates the stream, truncating any previous contents.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to create results file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written since the stream was last cleared.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn write_record(&mut self, record: &SolverRunRecord) -> std::io::Result<()> {
        for word in record.to_words() {
            self.writer.write_all(&word.to_le_bytes())?;
        }
        self.writer.flush()
    }
}

impl ResultSink for ResultsFile {
    fn clear(&mut self) -> Result<(), MedusaError> {
        self.truncate().map_err(|e| {
            log::error!("failed to truncate {}: {}", self.path.display(), e);
            MedusaError::Storage
        })?;
        self.records = 0;
        Ok(())
    }

    fn append(&mut self, record: &SolverRunRecord) -> Result<(), MedusaError> {
        self.write_record(record).map_err(|e| {
            log::error!("failed to append to {}: {}", self.path.display(), e);
            MedusaError::Storage
        })?;
        self.records += 1;
        Ok(())
    }
}

/// Reads every record of a results stream.
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<SolverRunRecord>> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open results file {}", path.display()))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    if buffer.len() % RECORD_BYTES != 0 {
        bail!(
            "{} is {} bytes, not a whole number of {}-byte records",
            path.display(),
            buffer.len(),
            RECORD_BYTES
        );
    }

    let records = buffer
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| {
            let mut words = [0u32; RECORD_WORDS];
            for (word, bytes) in words.iter_mut().zip(chunk.chunks_exact(4)) {
                *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            SolverRunRecord::from_words(&words)
        })
        .collect();
    Ok(records)
}
