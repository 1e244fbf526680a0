use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::LcrError;

const MAX_FLUSH_FAILURES: usize = 10;

/// Buffered record log.
///
/// Records are appended as JSON lines in batches of `buffer_size`. With
/// `final_format_json` the file is rewritten as one JSON array when the log
/// is finalized or dropped.
#[derive(Debug)]
pub struct RecordLog<T>
where
    T: Serialize + DeserializeOwned,
{
    buffer: Vec<T>,
    buffer_size: usize,
    file_path: PathBuf,
    final_format_json: bool,
    finalized: bool,
    flush_failures: usize,
}

impl<T> RecordLog<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(file_path: P, buffer_size: usize, final_format_json: bool) -> Self {
        let mut file_path = file_path.into();
        let extension = if final_format_json { "json" } else { "jsonl" };
        if file_path.extension() != Some(OsStr::new(extension)) {
            file_path.set_extension(extension);
        }

        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            file_path,
            final_format_json,
            finalized: false,
            flush_failures: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn add(&mut self, record: T) -> Result<(), LcrError> {
        self.buffer.push(record);

        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append buffered records to the file.
    ///
    /// A failed flush keeps the records buffered and only becomes an error
    /// after repeated consecutive failures.
    pub fn flush(&mut self) -> Result<(), LcrError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        match self.append_buffer() {
            Ok(()) => {
                debug!("Flushed {} record(s) to {:?}", self.buffer.len(), self.file_path);
                self.flush_failures = 0;
                self.buffer.clear();
                Ok(())
            }
            Err(e) => {
                self.flush_failures += 1;
                error!(
                    "Record flush failure {}/{}: {}",
                    self.flush_failures, MAX_FLUSH_FAILURES, e
                );
                if self.flush_failures % 3 == 0 {
                    warn!("Repeated record flush failures for {:?}", self.file_path);
                }

                if self.flush_failures >= MAX_FLUSH_FAILURES {
                    return Err(LcrError::Io {
                        source: std::io::Error::other(e.to_string()),
                        context: format!(
                            "{} consecutive flush failures for {:?}",
                            MAX_FLUSH_FAILURES, self.file_path
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    fn append_buffer(&self) -> Result<(), LcrError> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LcrError::Io {
                source,
                context: format!("Could not create directory {:?}", parent),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|source| LcrError::Io {
                source,
                context: format!("Could not open record log {:?}", self.file_path),
            })?;

        let mut writer = BufWriter::new(file);
        for record in &self.buffer {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Flush and, if configured, rewrite the JSON lines as a JSON array.
    ///
    /// Only the first call converts the file.
    pub fn finalize(&mut self) -> Result<(), LcrError> {
        self.flush()?;

        if !self.final_format_json || self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if !self.file_path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&self.file_path).map_err(|source| LcrError::Io {
            source,
            context: format!("Could not read record log {:?}", self.file_path),
        })?;

        let records = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<T>, _>>()?;

        fs::write(&self.file_path, serde_json::to_string_pretty(&records)?).map_err(
            |source| LcrError::Io {
                source,
                context: format!("Could not write record log {:?}", self.file_path),
            },
        )?;

        info!("Wrote {} record(s) to {:?}", records.len(), self.file_path);
        Ok(())
    }

    /// Records waiting for the next flush
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> Drop for RecordLog<T>
where
    T: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            error!("Could not finalize record log {:?}: {}", self.file_path, e);
        }
    }
}
