//! V3 backup format
//!
//! Length-framed binary records in per-partition data files, plus a sidecar
//! metadata file at the user-supplied location. Both start with the V3
//! marker. All integers are big-endian; nullable byte fields use a length of
//! -1, an absent timestamp is stored as -1.
//!
//! Frame layout:
//!
//! ```text
//! key_len:i32  key  value_len:i32  value  headers_count:u32
//! (hkey_len:i32  hkey  hval_len:i32  hval)*
//! timestamp_ms:i64  partition:i32  offset:i64
//! ```

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::backends::{
    safe_writer, BackupMetadata, BackupReader, BackupWriter, ConsumedRecord, DataFile,
    Instruction, InstructionIter, ProducerSend, RecordHeader,
};
use crate::error::{BackupError, Result};

/// First four bytes of every V3 file, data and metadata alike
pub const V3_MARKER: &[u8; 4] = b"/V3\n";

/// Upper bound on any single framed field, a corruption guard
const MAX_FIELD_LEN: i32 = 64 * 1024 * 1024;
/// Upper bound on the number of headers per record
const MAX_HEADER_COUNT: u32 = 10_000;

fn data_file_name(topic_name: &str, partition: i32) -> String {
    format!("{topic_name}:{partition}.data")
}

fn parent_dir(location: &Path) -> PathBuf {
    match location.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// V3 writer; requires a real filesystem location
pub struct SchemaBackupV3Writer {
    allow_overwrite: bool,
}

impl SchemaBackupV3Writer {
    pub fn new(allow_overwrite: bool) -> Self {
        Self { allow_overwrite }
    }
}

impl BackupWriter for SchemaBackupV3Writer {
    fn prepare_location(&mut self, _topic_name: &str, location: &Path) -> Result<()> {
        fs::create_dir_all(parent_dir(location))?;
        Ok(())
    }

    fn start_partition(
        &mut self,
        location: &Path,
        topic_name: &str,
        index: i32,
    ) -> Result<PathBuf> {
        Ok(parent_dir(location).join(data_file_name(topic_name, index)))
    }

    fn write_header(&mut self, out: &mut dyn Write) -> Result<()> {
        out.write_all(V3_MARKER)?;
        Ok(())
    }

    fn store_record(&mut self, out: &mut dyn Write, record: &ConsumedRecord) -> Result<()> {
        write_record(out, record)
    }

    fn finalize_partition(&mut self, index: i32, filename: &str) -> Result<DataFile> {
        Ok(DataFile {
            filename: filename.to_string(),
            partition: index,
        })
    }

    fn store_metadata(&mut self, location: &Path, metadata: &BackupMetadata) -> Result<()> {
        safe_writer(location, self.allow_overwrite, |out| {
            out.write_all(V3_MARKER)?;
            serde_json::to_writer_pretty(&mut *out, metadata)?;
            out.write_all(b"\n")?;
            Ok(())
        })
    }
}

fn put_opt_bytes(buf: &mut BytesMut, bytes: Option<&[u8]>) {
    match bytes {
        Some(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        None => buf.put_i32(-1),
    }
}

pub(crate) fn write_record(out: &mut dyn Write, record: &ConsumedRecord) -> Result<()> {
    let mut buf = BytesMut::with_capacity(128);
    put_opt_bytes(&mut buf, record.key.as_deref());
    put_opt_bytes(&mut buf, record.value.as_deref());
    buf.put_u32(record.headers.len() as u32);
    for header in &record.headers {
        put_opt_bytes(&mut buf, header.key.as_deref());
        put_opt_bytes(&mut buf, header.value.as_deref());
    }
    buf.put_i64(record.timestamp_ms.unwrap_or(-1));
    buf.put_i32(record.partition);
    buf.put_i64(record.offset);
    out.write_all(&buf)?;
    Ok(())
}

/// Read four bytes, distinguishing clean end-of-file from a truncated frame
fn try_read_i32(reader: &mut impl Read) -> Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(BackupError::Corrupt("truncated frame".to_string()));
        }
        filled += n;
    }
    Ok(Some(i32::from_be_bytes(buf)))
}

fn read_i32(reader: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_i64(reader: &mut impl Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_opt_bytes(reader: &mut impl Read, len: i32) -> Result<Option<Vec<u8>>> {
    match len {
        -1 => Ok(None),
        len if (0..=MAX_FIELD_LEN).contains(&len) => {
            let mut bytes = vec![0u8; len as usize];
            reader.read_exact(&mut bytes)?;
            Ok(Some(bytes))
        }
        len => Err(BackupError::Corrupt(format!("invalid field length {len}"))),
    }
}

fn next_frame(reader: &mut impl Read) -> Result<Option<ConsumedRecord>> {
    let Some(key_len) = try_read_i32(reader)? else {
        return Ok(None);
    };
    let key = read_opt_bytes(reader, key_len)?;
    let value_len = read_i32(reader)?;
    let value = read_opt_bytes(reader, value_len)?;

    let header_count = read_u32(reader)?;
    if header_count > MAX_HEADER_COUNT {
        return Err(BackupError::Corrupt(format!(
            "invalid header count {header_count}"
        )));
    }
    let mut headers = Vec::with_capacity(header_count as usize);
    for _ in 0..header_count {
        let header_key_len = read_i32(reader)?;
        let header_key = read_opt_bytes(reader, header_key_len)?;
        let header_value_len = read_i32(reader)?;
        let header_value = read_opt_bytes(reader, header_value_len)?;
        headers.push(RecordHeader {
            key: header_key,
            value: header_value,
        });
    }

    let timestamp = read_i64(reader)?;
    let partition = read_i32(reader)?;
    let offset = read_i64(reader)?;
    Ok(Some(ConsumedRecord {
        key,
        value,
        headers,
        timestamp_ms: (timestamp >= 0).then_some(timestamp),
        partition,
        offset,
    }))
}

struct FrameIter {
    reader: BufReader<File>,
    topic: String,
    done: bool,
}

impl Iterator for FrameIter {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match next_frame(&mut self.reader) {
            Ok(None) => {
                self.done = true;
                None
            }
            Ok(Some(record)) => Some(Ok(Instruction::Send(Box::new(ProducerSend {
                topic_name: self.topic.clone(),
                partition_index: record.partition,
                key: record.key,
                value: record.value,
                headers: record.headers,
                timestamp_ms: record.timestamp_ms,
            })))),
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

fn open_frames(path: PathBuf, topic: String) -> InstructionIter {
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(error) => return Box::new(std::iter::once(Err(error.into()))),
    };
    let mut reader = BufReader::new(file);
    let mut marker = [0u8; 4];
    if let Err(error) = reader.read_exact(&mut marker) {
        return Box::new(std::iter::once(Err(error.into())));
    }
    if &marker != V3_MARKER {
        return Box::new(std::iter::once(Err(BackupError::Corrupt(format!(
            "data file {path:?} does not start with the V3 marker"
        )))));
    }
    Box::new(FrameIter {
        reader,
        topic,
        done: false,
    })
}

/// V3 reader; `path` points at the metadata file
pub struct SchemaBackupV3Reader;

impl SchemaBackupV3Reader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SchemaBackupV3Reader {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupReader for SchemaBackupV3Reader {
    fn read(&self, path: &Path, _topic_name: &str) -> Result<InstructionIter> {
        let bytes = fs::read(path)?;
        let document = bytes.strip_prefix(V3_MARKER.as_slice()).ok_or_else(|| {
            BackupError::Corrupt("file does not start with the V3 marker".to_string())
        })?;
        let metadata: BackupMetadata = serde_json::from_slice(document)
            .map_err(|e| BackupError::Corrupt(format!("invalid backup metadata: {e}")))?;
        debug!(topic = %metadata.topic_name, files = metadata.data_files.len(), "read backup metadata");

        let parent = parent_dir(path);
        let topic = metadata.topic_name.clone();
        let files: Vec<PathBuf> = metadata
            .data_files
            .iter()
            .map(|data_file| parent.join(&data_file.filename))
            .collect();

        let restore = std::iter::once(Ok(Instruction::RestoreTopic {
            name: topic.clone(),
        }));
        let frames = files
            .into_iter()
            .flat_map(move |file| open_frames(file, topic.clone()));
        Ok(Box::new(restore.chain(frames)))
    }
}
