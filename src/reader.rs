use std::path::Path;
use std::sync::Arc;

use data_layer::DataLayer;
use errors::*;

const READ_CHUNK_SIZE: u64 = 64 * 1024;

pub const DEFAULT_RECORD_DELIMITER: u8 = b'\n';

/// A `Split` is a contiguous byte range of one input source, owned exclusively by the
/// map task it is assigned to. Splits are created once at job submission and never
/// mutated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub input_path: String,
    pub start_byte: u64,
    pub end_byte: u64,
}

impl Split {
    pub fn new<S: Into<String>>(input_path: S, start_byte: u64, end_byte: u64) -> Self {
        Split {
            input_path: input_path.into(),
            start_byte,
            end_byte,
        }
    }
}

/// A `Record` is one line of input: its byte offset in the source and its content,
/// without the trailing delimiter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub offset: u64,
    pub value: String,
}

/// `RecordReader` lazily yields the `Record`s of a `Split`.
///
/// A line belongs to the split containing its start offset: a reader that does not
/// start at offset 0 skips the partial line its predecessor owns, and every reader
/// reads past `end_byte` to finish the line that straddles its tail. Re-reading the
/// same split always yields the identical sequence, which is what makes map retries
/// safe.
pub struct RecordReader {
    data_layer: Arc<DataLayer + Send + Sync>,
    split: Split,
    delimiter: u8,
    file_size: u64,

    // Absolute offset of the next unconsumed byte.
    position: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    started: bool,
    finished: bool,
}

impl RecordReader {
    pub fn new(data_layer: Arc<DataLayer + Send + Sync>, split: Split) -> Result<Self> {
        RecordReader::with_delimiter(data_layer, split, DEFAULT_RECORD_DELIMITER)
    }

    pub fn with_delimiter(
        data_layer: Arc<DataLayer + Send + Sync>,
        split: Split,
        delimiter: u8,
    ) -> Result<Self> {
        let file_size = data_layer
            .file_size(Path::new(&split.input_path))
            .chain_err(|| format!("Unable to stat input source {}", split.input_path))?;

        // Buffering begins one byte early so the reader can tell whether a line starts
        // exactly on the split boundary.
        let buffer_start = split.start_byte.saturating_sub(1).min(file_size);
        let position = split.start_byte.min(file_size);

        Ok(RecordReader {
            data_layer,
            split,
            delimiter,
            file_size,
            position,
            buffer: Vec::new(),
            buffer_start,
            started: false,
            finished: false,
        })
    }

    fn buffer_end(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    /// Extends the buffer until it covers `offset` or the end of the source.
    fn ensure_buffered(&mut self, offset: u64) -> Result<()> {
        let target = offset.min(self.file_size);
        while self.buffer_end() < target {
            let chunk_start = self.buffer_end();
            let chunk_end = (chunk_start + READ_CHUNK_SIZE).min(self.file_size);
            let chunk = self.data_layer
                .read_range(Path::new(&self.split.input_path), chunk_start, chunk_end)
                .chain_err(|| {
                    format!("Unable to read input source {}", self.split.input_path)
                })?;
            if chunk.is_empty() {
                break;
            }
            self.buffer.extend(chunk);
        }
        Ok(())
    }

    /// Returns the absolute offset of the first delimiter at or after `from`, if any.
    fn find_delimiter(&mut self, from: u64) -> Result<Option<u64>> {
        let mut search = from;
        loop {
            self.ensure_buffered(search + READ_CHUNK_SIZE)?;
            let local = (search - self.buffer_start) as usize;
            if let Some(index) = self.buffer[local..].iter().position(
                |&b| b == self.delimiter,
            )
            {
                return Ok(Some(search + index as u64));
            }
            search = self.buffer_end();
            if search >= self.file_size {
                return Ok(None);
            }
        }
    }

    /// Skips the partial first line when the split does not begin at a line start.
    fn skip_partial_first_line(&mut self) -> Result<()> {
        if self.split.start_byte == 0 || self.split.start_byte >= self.file_size {
            return Ok(());
        }
        self.ensure_buffered(self.split.start_byte)?;
        let previous = self.buffer[(self.split.start_byte - 1 - self.buffer_start) as usize];
        if previous == self.delimiter {
            // A fresh line starts exactly at the boundary, so it is ours.
            return Ok(());
        }
        match self.find_delimiter(self.position)? {
            Some(delimiter_at) => self.position = delimiter_at + 1,
            None => self.finished = true,
        }
        Ok(())
    }

    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.started {
            self.started = true;
            self.skip_partial_first_line().chain_err(
                || "Error seeking to first record of split",
            )?;
        }
        if self.finished || self.position >= self.split.end_byte.min(self.file_size) {
            self.finished = true;
            return Ok(None);
        }

        let record_start = self.position;
        let (record_end, next_position) = match self.find_delimiter(record_start)? {
            Some(delimiter_at) => (delimiter_at, delimiter_at + 1),
            None => (self.file_size, self.file_size),
        };
        self.ensure_buffered(record_end)?;

        let local_start = (record_start - self.buffer_start) as usize;
        let local_end = (record_end - self.buffer_start) as usize;
        let value = String::from_utf8(self.buffer[local_start..local_end].to_vec())
            .chain_err(|| {
                ErrorKind::Serialisation(format!(
                    "record at offset {} of {} is not valid UTF-8",
                    record_start,
                    self.split.input_path
                ))
            })?;

        self.position = next_position;
        Ok(Some(Record {
            offset: record_start,
            value,
        }))
    }
}
