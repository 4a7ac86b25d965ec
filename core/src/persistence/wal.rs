//! Append-only block log.
//!
//! Each record is a little-endian `u32` byte length followed by a bincode-encoded
//! [`Block`]. A record cut short by a crash is dropped on read.

use crate::block::Block;
use anyhow::{Context, Result};
use bincode::config;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub static BINCODE_CONFIG: Lazy<config::Configuration> = Lazy::new(|| config::standard());

/// Upper bound on a single record, to reject garbage lengths before allocating.
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct BlockWal {
    path: PathBuf,
}

impl BlockWal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BlockWal { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one block and flush it to disk before returning.
    pub fn append(&self, block: &Block) -> Result<()> {
        let blob = bincode::encode_to_vec(block, *BINCODE_CONFIG)
            .with_context(|| format!("encode block {} for WAL", block.index))?;
        let len = u32::try_from(blob.len()).context("WAL record too large")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open WAL {}", self.path.display()))?;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&blob)?;
        file.sync_data()
            .with_context(|| format!("sync WAL {}", self.path.display()))?;
        Ok(())
    }

    /// Read every complete record. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<Block>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("open WAL {}", self.path.display()));
            }
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .with_context(|| format!("read WAL {}", self.path.display()))?;

        let mut blocks = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let Some(header) = bytes.get(offset..offset + 4) else {
                log::warn!("⚠️  Torn WAL tail at byte {}: incomplete length header", offset);
                break;
            };
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            if len > MAX_RECORD_LEN {
                log::warn!("⚠️  Torn WAL tail at byte {}: record length {} out of range", offset, len);
                break;
            }
            let start = offset + 4;
            let Some(blob) = bytes.get(start..start + len) else {
                log::warn!(
                    "⚠️  Torn WAL tail at byte {}: record wants {} bytes, {} left",
                    offset,
                    len,
                    bytes.len() - start
                );
                break;
            };
            match bincode::decode_from_slice::<Block, _>(blob, *BINCODE_CONFIG) {
                Ok((block, _)) => blocks.push(block),
                Err(e) => {
                    log::warn!("⚠️  Undecodable WAL record at byte {}: {}", offset, e);
                    break;
                }
            }
            offset = start + len;
        }
        Ok(blocks)
    }

    /// Drop all records.
    pub fn truncate(&self) -> Result<()> {
        File::create(&self.path)
            .and_then(|f| f.sync_all())
            .with_context(|| format!("truncate WAL {}", self.path.display()))
    }
}
