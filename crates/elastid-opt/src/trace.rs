//! Per-iteration optimization trace.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use elastid_math::DVec;

/// One optimizer iteration.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub iteration: usize,
    pub value: f64,
    pub grad_norm: f64,
    pub step_norm: f64,
    /// The parameter vector after the update.
    pub parameters: DVec,
}

/// Receives one record per optimizer iteration.
pub trait TraceSink {
    fn record(&mut self, record: &TraceRecord) -> io::Result<()>;
}

/// Discards the trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn record(&mut self, _record: &TraceRecord) -> io::Result<()> {
        Ok(())
    }
}

/// Appends one `key=value` line per iteration to a text file.
#[derive(Debug)]
pub struct FileTrace {
    writer: BufWriter<File>,
}

impl FileTrace {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl TraceSink for FileTrace {
    fn record(&mut self, record: &TraceRecord) -> io::Result<()> {
        writeln!(
            self.writer,
            "iter={} value={:.12e} grad_norm={:.12e} step_norm={:.12e}",
            record.iteration, record.value, record.grad_norm, record.step_norm
        )?;
        self.writer.flush()
    }
}

/// Writes the updated parameter vector to one file per iteration
/// (`params_00001.txt`, one value per line) inside a directory.
#[derive(Debug)]
pub struct ParameterDump {
    dir: PathBuf,
}

impl ParameterDump {
    pub fn create(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl TraceSink for ParameterDump {
    fn record(&mut self, record: &TraceRecord) -> io::Result<()> {
        let path = self.dir.join(format!("params_{:05}.txt", record.iteration));
        let mut writer = BufWriter::new(File::create(path)?);
        for p in record.parameters.iter() {
            writeln!(writer, "{p:.17e}")?;
        }
        writer.flush()
    }
}

/// Keeps the records in memory, oldest first.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    pub records: Vec<TraceRecord>,
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, record: &TraceRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
