//! The primary log: an append-only file of length-prefixed, CRC-checked
//! frames. This is the durability boundary — secondary indices (`index.rs`)
//! are rebuildable from this file and are never the sole copy of a record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::Record;

/// One frame on disk: `length (u32 LE) || record_bytes || crc32 (u32 LE)`.
/// The CRC covers `record_bytes` only.
pub struct Log {
    file: File,
    /// Byte offset of the next frame to write.
    write_pos: u64,
}

/// Result of opening a log: the log itself, plus how many trailing bytes
/// (if any) were a corrupt/partial frame truncated on open.
pub struct OpenOutcome {
    pub log: Log,
    pub truncated_bytes: u64,
}

impl Log {
    /// Open (creating if absent) the log file at `path`, scanning it to find
    /// the valid prefix. Any trailing bytes that don't form a complete,
    /// CRC-valid frame are truncated — this is the crash-recovery path for a
    /// process that died mid-`append`.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<OpenOutcome> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LedgerError::IoError(e.to_string()))?;

        let valid_len = scan_valid_prefix(&mut file)?;
        let total_len = file
            .metadata()
            .map_err(|e| LedgerError::IoError(e.to_string()))?
            .len();
        let truncated_bytes = total_len - valid_len;
        if truncated_bytes > 0 {
            file.set_len(valid_len)
                .map_err(|e| LedgerError::IoError(e.to_string()))?;
        }
        file.seek(SeekFrom::Start(valid_len))
            .map_err(|e| LedgerError::IoError(e.to_string()))?;

        Ok(OpenOutcome {
            log: Log {
                file,
                write_pos: valid_len,
            },
            truncated_bytes,
        })
    }

    /// Append one record, returning the byte offset the frame was written at.
    /// Every call fsyncs before returning — durability is grouped only in the
    /// sense that a single `append` is one write-then-fsync; batching across
    /// calls is left to a future write-combining layer, not implemented here.
    pub fn append(&mut self, record: &Record) -> LedgerResult<u64> {
        let body = record.encode();
        let crc = crc32fast::hash(&body);
        let offset = self.write_pos;

        let mut frame = Vec::with_capacity(4 + body.len() + 4);
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&crc.to_le_bytes());

        self.file
            .write_all(&frame)
            .map_err(|e| LedgerError::IoError(e.to_string()))?;
        self.file
            .sync_data()
            .map_err(|e| LedgerError::IoError(e.to_string()))?;
        self.write_pos += frame.len() as u64;
        Ok(offset)
    }

    /// Read the record frame at `offset`.
    pub fn read_at(&self, offset: u64) -> LedgerResult<Record> {
        let mut file = self.file.try_clone().map_err(|e| LedgerError::IoError(e.to_string()))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| LedgerError::IoError(e.to_string()))?;
        let (body, _) = read_frame(&mut file)?.ok_or_else(|| {
            LedgerError::IoError(format!("no frame at offset {offset}"))
        })?;
        Record::decode(&body)
    }

    /// Read every valid record in the log, in append order, along with the
    /// byte offset it starts at. Used at startup to rebuild secondary
    /// indices and consensus state by replay.
    pub fn read_all(&self) -> LedgerResult<Vec<(u64, Record)>> {
        let mut file = self.file.try_clone().map_err(|e| LedgerError::IoError(e.to_string()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| LedgerError::IoError(e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mut out = Vec::new();
        let mut offset = 0u64;
        while let Some((body, _)) = read_frame(&mut reader)? {
            let record = Record::decode(&body)?;
            out.push((offset, record));
            offset += 4 + body.len() as u64 + 4;
        }
        Ok(out)
    }

    pub fn current_len(&self) -> u64 {
        self.write_pos
    }
}

/// Scan from the start of `file` and return the length of the longest
/// prefix consisting entirely of valid (length+CRC-checked) frames.
fn scan_valid_prefix(file: &mut File) -> LedgerResult<u64> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| LedgerError::IoError(e.to_string()))?;
    let mut reader = BufReader::new(file.try_clone().map_err(|e| LedgerError::IoError(e.to_string()))?);
    let mut valid_len = 0u64;
    loop {
        let start = valid_len;
        match read_frame(&mut reader) {
            Ok(Some((body, _))) => {
                valid_len = start + 4 + body.len() as u64 + 4;
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    Ok(valid_len)
}

/// Read one frame from `r`. Returns `Ok(None)` on clean EOF (no partial
/// bytes read), `Err` on a truncated or CRC-mismatched frame.
fn read_frame<R: Read>(r: &mut R) -> LedgerResult<Option<(Vec<u8>, u32)>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(r, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)
        .map_err(|e| LedgerError::Malformed(format!("truncated frame body: {e}")))?;

    let mut crc_buf = [0u8; 4];
    r.read_exact(&mut crc_buf)
        .map_err(|e| LedgerError::Malformed(format!("truncated frame crc: {e}")))?;
    let stored_crc = u32::from_le_bytes(crc_buf);
    let actual_crc = crc32fast::hash(&body);
    if stored_crc != actual_crc {
        return Err(LedgerError::Malformed(format!(
            "crc mismatch: stored {stored_crc:08x}, computed {actual_crc:08x}"
        )));
    }
    Ok(Some((body, stored_crc)))
}

/// Like `Read::read_exact` but returns `Ok(false)` instead of erroring when
/// zero bytes are available (clean EOF before any byte of the frame).
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> LedgerResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(LedgerError::Malformed("truncated frame header".into()));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LedgerError::IoError(e.to_string())),
        }
    }
    Ok(true)
}
