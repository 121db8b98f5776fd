use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use ampc_core::{Bounds, StepRecord};
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 12] = b"AMPC_LOG_FMT";
pub const LOG_VERSION: i32 = 1;

/// First message of every trajectory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogHeader {
    /// Which controller produced the trajectory.
    pub policy: String,
    pub bounds: Bounds,
    /// Settings of the run, as JSON.
    pub settings: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogMessageKind {
    Unknown = 0,
    Header = 1,
    Step = 2,
}

impl LogMessageKind {
    fn from_i32(value: i32) -> LogMessageKind {
        match value {
            1 => LogMessageKind::Header,
            2 => LogMessageKind::Step,
            _ => LogMessageKind::Unknown,
        }
    }
}

pub struct TrajectoryLogWriter {
    file: BufWriter<File>,
    buf: Vec<u8>,
}

impl TrajectoryLogWriter {
    /// Open a new log file for writing and write the file header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file already exists or if an I/O error occurs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("Log file already exists: {:?}", path);
        }

        let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        let mut writer = TrajectoryLogWriter {
            file: BufWriter::new(file),
            buf: Vec::new(),
        };
        writer.file.write_all(MAGIC)?;
        writer.file.write_all(&LOG_VERSION.to_be_bytes())?;
        Ok(writer)
    }

    pub fn write_header(&mut self, header: &LogHeader) -> Result<()> {
        self.buf = rmp_serde::to_vec_named(header)?;
        self.write_message(LogMessageKind::Header)
    }

    pub fn write_step(&mut self, record: &StepRecord) -> Result<()> {
        self.buf = rmp_serde::to_vec_named(record)?;
        self.write_message(LogMessageKind::Step)
    }

    fn write_message(&mut self, kind: LogMessageKind) -> Result<()> {
        let size = i32::try_from(self.buf.len()).context("message too large")?;
        self.file.write_all(&(kind as i32).to_be_bytes())?;
        self.file.write_all(&size.to_be_bytes())?;
        self.file.write_all(&self.buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for TrajectoryLogWriter {
    fn drop(&mut self) {
        if let Err(err) = self.file.flush() {
            log::error!("Failed to flush trajectory log: {}", err);
        }
    }
}

/// A trajectory log read back into memory.
#[derive(Debug, Clone)]
pub struct TrajectoryLogFile {
    version: i32,
    header: Option<LogHeader>,
    records: Vec<StepRecord>,
}

impl TrajectoryLogFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
        Self::read(BufReader::new(file))
    }

    /// Reads a log from `source`. A truncated trailing frame ends the log.
    pub fn read(mut source: impl Read) -> Result<Self> {
        let mut buf = [0u8; 12 + 4];
        source.read_exact(&mut buf).context("reading log header")?;
        if &buf[0..12] != MAGIC {
            bail!(
                "Invalid log file type: {}",
                String::from_utf8_lossy(&buf[0..12])
            );
        }
        let version = i32::from_be_bytes(buf[12..16].try_into()?);
        if version != LOG_VERSION {
            bail!("Unsupported log file version: {}", version);
        }

        let mut header = None;
        let mut records = Vec::new();
        loop {
            let mut buf = [0u8; 8];
            match source.read_exact(&mut buf) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let kind = LogMessageKind::from_i32(i32::from_be_bytes(buf[0..4].try_into()?));
            let size = i32::from_be_bytes(buf[4..8].try_into()?);
            if size < 0 {
                bail!("Negative message size {}", size);
            }

            // Grows with the bytes actually present, not with the declared size.
            let mut message_buf = Vec::new();
            source
                .by_ref()
                .take(size as u64)
                .read_to_end(&mut message_buf)?;
            if message_buf.len() < size as usize {
                log::warn!(
                    "Trajectory log ends in a truncated message ({} of {} bytes)",
                    message_buf.len(),
                    size
                );
                break;
            }

            match kind {
                LogMessageKind::Header => {
                    header = Some(
                        rmp_serde::from_slice(&message_buf).context("decoding log header")?,
                    );
                }
                LogMessageKind::Step => {
                    records.push(
                        rmp_serde::from_slice(&message_buf).context("decoding step record")?,
                    );
                }
                LogMessageKind::Unknown => {
                    log::warn!("Skipping message of unknown kind");
                }
            }
        }

        Ok(TrajectoryLogFile {
            version,
            header,
            records,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn header(&self) -> Option<&LogHeader> {
        self.header.as_ref()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn take_records(self) -> Vec<StepRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_core::{Observation, State, Variables};
    use nalgebra::DVector;
    use tempfile::tempdir;

    fn header() -> LogHeader {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        LogHeader {
            policy: "test".into(),
            bounds: Bounds::builder(vars).input("u", -1.0, 1.0).build().unwrap(),
            settings: "{}".into(),
        }
    }

    fn record(step: usize) -> StepRecord {
        StepRecord {
            step,
            state: State::from_vec(vec![step as f64]),
            input: DVector::from_vec(vec![0.5]),
            observation: Observation::from_vec(vec![step as f64 + 1.0]),
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.ampclog");
        {
            let mut writer = TrajectoryLogWriter::open(&path).unwrap();
            writer.write_header(&header()).unwrap();
            for k in 0..3 {
                writer.write_step(&record(k)).unwrap();
            }
        }

        let log = TrajectoryLogFile::open(&path).unwrap();
        assert_eq!(log.version(), 1);
        // unset bounds are infinite, which survives msgpack
        assert_eq!(log.header(), Some(&header()));
        assert_eq!(log.records(), &[record(0), record(1), record(2)]);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.ampclog");
        std::fs::write(&path, b"keep me").unwrap();
        assert!(TrajectoryLogWriter::open(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.ampclog");
        {
            let mut writer = TrajectoryLogWriter::open(&path).unwrap();
            writer.write_step(&record(0)).unwrap();
            writer.write_step(&record(1)).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let log = TrajectoryLogFile::read(&bytes[..bytes.len() - 3]).unwrap();
        assert!(log.header().is_none());
        assert_eq!(log.records(), &[record(0)]);
    }

    #[test]
    fn test_oversized_frame_length_is_treated_as_truncation() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&LOG_VERSION.to_be_bytes());
        bytes.extend_from_slice(&(LogMessageKind::Step as i32).to_be_bytes());
        bytes.extend_from_slice(&i32::MAX.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        let log = TrajectoryLogFile::read(&bytes[..]).unwrap();
        assert!(log.header().is_none());
        assert!(log.records().is_empty());
    }

    #[test]
    fn test_rejects_foreign_files() {
        let mut bytes = b"SSL_LOG_FILE".to_vec();
        bytes.extend_from_slice(&1i32.to_be_bytes());
        assert!(TrajectoryLogFile::read(&bytes[..]).is_err());
    }
}
