use crate::{ContainerPortRecord, Db};
use portdump_core::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub skipped: usize,
    pub flushes: usize,
}

/// Buffers `container_ports` rows and writes them `batch_size` at a time.
pub struct ContainerPortWriter<'db> {
    db: &'db mut Db,
    batch_size: usize,
    pending: Vec<ContainerPortRecord>,
    stats: WriteStats,
}

impl<'db> ContainerPortWriter<'db> {
    pub fn new(db: &'db mut Db, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        ContainerPortWriter { db, batch_size, pending: Vec::with_capacity(batch_size), stats: WriteStats::default() }
    }

    pub fn push(&mut self, record: ContainerPortRecord) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let out = self.db.insert_container_ports(&self.pending)?;
        self.stats.written += out.inserted;
        self.stats.skipped += out.skipped;
        self.stats.flushes += 1;
        debug!(rows = self.pending.len(), flush = self.stats.flushes, "container_ports batch written");
        self.pending.clear();
        Ok(())
    }

    /// Write the final partial batch.
    pub fn finish(mut self) -> Result<WriteStats> {
        self.flush()?;
        Ok(self.stats)
    }
}
