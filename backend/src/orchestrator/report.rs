//! Epoch log
//!
//! One tab-separated row per epoch, preceded by a `#`-prefixed header when
//! the file is new. Plotting tools read the header for column names and
//! treat every other line as numbers.

use crate::core::Amount;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const HEADER: &str =
    "#block\ttimestamp\tepoch\tprice\twritten\theld\tcollateral\tcredit\tattempted\tsucceeded\tfailed";

/// Aggregate market state at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub block: u64,
    pub timestamp: u64,
    pub price: Amount,
    /// Option volume written by all agents
    pub written: Amount,
    /// Option volume held by all agents
    pub held: Amount,
    /// Exchange collateral locked by all agents
    pub collateral: Amount,
    /// Free exchange balance of all agents
    pub credit: Amount,
}

/// One log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochRow {
    pub epoch: u64,
    pub snapshot: MarketSnapshot,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct EpochLog<W: Write> {
    out: W,
}

impl EpochLog<BufWriter<File>> {
    /// Append to `path`, writing the header only if the file is empty
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata()?.len() == 0;
        Self::new(BufWriter::new(file), fresh)
    }
}

impl<W: Write> EpochLog<W> {
    pub fn new(mut out: W, write_header: bool) -> io::Result<Self> {
        if write_header {
            writeln!(out, "{HEADER}")?;
        }
        Ok(Self { out })
    }

    pub fn record(&mut self, row: &EpochRow) -> io::Result<()> {
        let s = &row.snapshot;
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.block,
            s.timestamp,
            row.epoch,
            s.price,
            s.written,
            s.held,
            s.collateral,
            s.credit,
            row.attempted,
            row.succeeded,
            row.failed
        )?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
