//! Append-only byte pool for labels and values.
//!
//! Entries are addressed by 32-bit offsets, which keeps units small:
//! - suffix label: `bytes..., 0`, followed directly by the value slot
//! - internal label: `relay base (u32 LE), bytes..., 0`
//! - value slot: `V::WIDTH` bytes, no terminator
//!
//! Nothing is ever removed. A superseded entry simply becomes unreachable
//! until the owning trie is rebuilt.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::unit::TERMINATOR;
use crate::value::Value;

/// Size of the relay base at the head of an internal label.
pub(crate) const RELAY_SIZE: u32 = 4;

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Arena {
    data: Vec<u8>,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    fn reserve_offset(&self, extra: usize) -> Result<u32> {
        let offset = self.data.len();
        let end = offset as u64 + extra as u64;
        if end > u32::MAX as u64 {
            return Err(Error::CapacityExceeded {
                what: "arena offset",
                requested: end,
            });
        }
        Ok(offset as u32)
    }

    /// Appends `bytes` and returns the offset of the first one.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<u32> {
        let offset = self.reserve_offset(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(offset)
    }

    /// Reserves a zero-filled slot of `width` bytes.
    pub fn append_fixed_value(&mut self, width: usize) -> Result<u32> {
        let offset = self.reserve_offset(width)?;
        self.data.resize(self.data.len() + width, 0);
        Ok(offset)
    }

    /// Appends `bytes` followed by the terminator.
    pub(crate) fn append_label(&mut self, bytes: &[u8]) -> Result<u32> {
        let offset = self.reserve_offset(bytes.len() + 1)?;
        self.data.extend_from_slice(bytes);
        self.data.push(TERMINATOR);
        Ok(offset)
    }

    /// Appends an internal label entry with the given relay base.
    pub(crate) fn append_relay_label(&mut self, relay: u32, bytes: &[u8]) -> Result<u32> {
        let offset = self.reserve_offset(RELAY_SIZE as usize + bytes.len() + 1)?;
        self.data.write_u32::<LittleEndian>(relay)?;
        self.data.extend_from_slice(bytes);
        self.data.push(TERMINATOR);
        Ok(offset)
    }

    #[inline]
    pub fn read_byte(&self, offset: u32) -> u8 {
        self.data[offset as usize]
    }

    #[inline]
    pub fn write_byte(&mut self, offset: u32, byte: u8) {
        self.data[offset as usize] = byte;
    }

    #[inline]
    pub(crate) fn read_u32(&self, offset: u32) -> u32 {
        LittleEndian::read_u32(&self.data[offset as usize..])
    }

    #[inline]
    pub(crate) fn write_u32(&mut self, offset: u32, v: u32) {
        LittleEndian::write_u32(&mut self.data[offset as usize..], v);
    }

    /// Bytes from `offset` up to, not including, the next terminator.
    pub(crate) fn label(&self, offset: u32) -> &[u8] {
        let rest = &self.data[offset as usize..];
        let len = rest
            .iter()
            .position(|&b| b == TERMINATOR)
            .unwrap_or(rest.len());
        &rest[..len]
    }

    #[inline]
    pub(crate) fn read_value<V: Value>(&self, offset: u32) -> V {
        let start = offset as usize;
        V::decode(&self.data[start..start + V::WIDTH])
    }

    #[inline]
    pub(crate) fn write_value<V: Value>(&mut self, offset: u32, value: V) {
        let start = offset as usize;
        value.encode(&mut self.data[start..start + V::WIDTH]);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.data.shrink_to_fit();
    }

    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.data.len() as u64)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let len = r.read_u64::<LittleEndian>()?;
        if len > u32::MAX as u64 {
            return Err(Error::CapacityExceeded {
                what: "arena offset",
                requested: len,
            });
        }
        let mut data = vec![0u8; len as usize];
        r.read_exact(&mut data)?;
        Ok(Self::from_bytes(data))
    }
}
