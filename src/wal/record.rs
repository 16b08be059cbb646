//! WAL Record codec
//!
//! Fixed 26-byte big-endian header followed by key and value bytes.
//! The checksum is a CRC-32 over the key and value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WalError};

/// Size of the fixed record header in bytes
///
/// sequence (8) + transaction_id (8) + type (1) + flags (1)
/// + key_len (2) + value_len (2) + checksum (4)
pub const HEADER_SIZE: usize = 26;

/// Largest key or value a record can carry
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Byte offset of key_len inside the header
const KEY_LEN_OFFSET: usize = 18;

/// Kind of a log record. Tags are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    Write = 1,
    Commit = 2,
    Abort = 3,
    Checkpoint = 4,
    TxnBegin = 5,
    TxnCommit = 6,
    TxnRollback = 7,
}

impl RecordType {
    /// Transaction lifecycle markers are never returned by read-all
    pub fn is_txn_marker(self) -> bool {
        matches!(
            self,
            RecordType::TxnBegin | RecordType::TxnCommit | RecordType::TxnRollback
        )
    }
}

impl TryFrom<u8> for RecordType {
    type Error = WalError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(RecordType::Write),
            2 => Ok(RecordType::Commit),
            3 => Ok(RecordType::Abort),
            4 => Ok(RecordType::Checkpoint),
            5 => Ok(RecordType::TxnBegin),
            6 => Ok(RecordType::TxnCommit),
            7 => Ok(RecordType::TxnRollback),
            other => Err(WalError::UnknownRecordType(other)),
        }
    }
}

/// A single record in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Log sequence number, strictly increasing across the log
    pub sequence: u64,

    /// Owning transaction, 0 when the record is not transactional
    pub transaction_id: u64,

    pub record_type: RecordType,

    /// Reserved
    pub flags: u8,

    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    /// Key/value write
    pub fn write(sequence: u64, transaction_id: u64, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            sequence,
            transaction_id,
            record_type: RecordType::Write,
            flags: 0,
            key,
            value,
        }
    }

    /// Payload-free record such as a transaction marker or a checkpoint
    pub fn marker(record_type: RecordType, sequence: u64, transaction_id: u64) -> Self {
        Self {
            sequence,
            transaction_id,
            record_type,
            flags: 0,
            key: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Total on-disk size
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// CRC-32 of the key followed by the value
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.key);
        hasher.update(&self.value);
        hasher.finalize()
    }

    /// Encode into the on-disk representation
    pub fn encode(&self) -> Result<Bytes> {
        check_field("key", self.key.len())?;
        check_field("value", self.value.len())?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64(self.sequence);
        buf.put_u64(self.transaction_id);
        buf.put_u8(self.record_type as u8);
        buf.put_u8(self.flags);
        buf.put_u16(self.key.len() as u16);
        buf.put_u16(self.value.len() as u16);
        buf.put_u32(self.checksum());
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        Ok(buf.freeze())
    }

    /// Decode one record from the front of `data`
    ///
    /// Bytes past the record's declared length are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(WalError::ShortBuffer {
                len: data.len(),
                needed: HEADER_SIZE,
            });
        }

        let mut header = &data[..HEADER_SIZE];
        let sequence = header.get_u64();
        let transaction_id = header.get_u64();
        let tag = header.get_u8();
        let flags = header.get_u8();
        let key_len = header.get_u16() as usize;
        let value_len = header.get_u16() as usize;
        let stored = header.get_u32();

        let total = HEADER_SIZE + key_len + value_len;
        if data.len() < total {
            return Err(WalError::UnexpectedEof {
                len: data.len(),
                needed: total,
            });
        }

        let payload = &data[HEADER_SIZE..total];
        let computed = crc32fast::hash(payload);
        if computed != stored {
            return Err(WalError::ChecksumMismatch { stored, computed });
        }

        Ok(Self {
            sequence,
            transaction_id,
            record_type: RecordType::try_from(tag)?,
            flags,
            key: payload[..key_len].to_vec(),
            value: payload[key_len..].to_vec(),
        })
    }
}

/// Payload length (key + value) declared by an encoded header
pub(crate) fn payload_len(header: &[u8; HEADER_SIZE]) -> usize {
    let mut lens = &header[KEY_LEN_OFFSET..KEY_LEN_OFFSET + 4];
    lens.get_u16() as usize + lens.get_u16() as usize
}

fn check_field(field: &'static str, len: usize) -> Result<()> {
    if len > MAX_FIELD_LEN {
        return Err(WalError::FieldTooLarge {
            field,
            len,
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}
