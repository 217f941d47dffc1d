//! Binary load and store of the raw image.
//!
//! Layout, little endian: general ring head (u32), personal ring head (u32),
//! block count (u64) and blocks, unit count (u64) and units, arena length
//! (u64) and arena bytes. An absent ring head is stored as `u32::MAX`.
//!
//! The configuration is not part of the image; the reader passes the one the
//! image was built with. Loading does not check internal consistency, see
//! [`DaTrie::validate`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use memmap2::Mmap;

use super::DaTrie;
use crate::arena::Arena;
use crate::config::Config;
use crate::container::Container;
use crate::error::Result;
use crate::value::Value;

impl<V: Value> DaTrie<V> {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        self.container.write_to(w)?;
        self.arena.write_to(w)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R, config: Config) -> Result<Self> {
        let container = Container::read_from(r, config.max_trials)?;
        let arena = Arena::read_from(r)?;
        let len = count_leaves(&container);
        Ok(Self::from_parts(container, arena, config, len))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut w = BufWriter::new(File::create(path)?);
        self.write_to(&mut w)?;
        w.flush()?;
        tracing::debug!(
            path = %path.display(),
            bytes = self.size_in_bytes(),
            keys = self.len,
            "saved trie"
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        let t = Self::read_from(&mut r, config)?;
        tracing::debug!(path = %path.display(), keys = t.len, "loaded trie");
        Ok(t)
    }

    /// Like [`load`](Self::load), reading the image through a memory map.
    pub fn load_mmap<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: the map is only read while `file` is open, and the image is
        // copied out before returning.
        let map = unsafe { Mmap::map(&file)? };
        let mut bytes: &[u8] = &map;
        let t = Self::read_from(&mut bytes, config)?;
        tracing::debug!(
            path = %path.display(),
            mapped = map.len(),
            keys = t.len,
            "loaded trie from mmap"
        );
        Ok(t)
    }
}

fn count_leaves(c: &Container) -> usize {
    c.units
        .iter()
        .enumerate()
        .filter(|&(i, u)| !c.is_vacant(i as u32) && u.is_leaf())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Addressing;
    use crate::error::Error;

    #[test]
    fn test_round_trip_in_memory() {
        for config in [
            Config::default(),
            Config::patricia(),
            Config::default().with_addressing(Addressing::LetterCheck),
        ] {
            let mut t: DaTrie<u32> = DaTrie::with_config(config.clone());
            for i in 0..500u32 {
                t.insert(format!("word{}", i * 31 % 700).as_bytes(), i).unwrap();
            }
            t.remove(b"word0");

            let mut buf = Vec::new();
            t.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), t.size_in_bytes());

            let back: DaTrie<u32> = DaTrie::read_from(&mut buf.as_slice(), config).unwrap();
            assert_eq!(back.len(), t.len());
            assert_eq!(back.stats(), t.stats());
            assert!(back.iter().eq(t.iter()));
            back.validate().unwrap();
        }
    }

    #[test]
    fn test_empty_trie_layout() {
        let t: DaTrie<()> = DaTrie::new();
        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        // general head 0, personal head absent
        assert_eq!(&buf[0..4], &0u32.to_le_bytes());
        assert_eq!(&buf[4..8], &u32::MAX.to_le_bytes());
        assert_eq!(&buf[8..16], &1u64.to_le_bytes());
        // arena length last
        assert_eq!(&buf[buf.len() - 8..], &0u64.to_le_bytes());
    }

    #[test]
    fn test_truncated_image() {
        let mut t: DaTrie<u16> = DaTrie::new();
        t.insert(b"abc", 1).unwrap();
        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = DaTrie::<u16>::read_from(&mut buf.as_slice(), Config::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
