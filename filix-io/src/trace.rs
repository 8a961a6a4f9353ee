//! Chain trace files.
//!
//! Each MCMC chain writes one CSV trace: a `step` column, one column per
//! model parameter, and the log likelihood, log prior, and log posterior.
//! Rows are flushed as they are appended so a trace stays readable while
//! the chain is still running.

use filix_core::{FilixError, Result};
use std::fs::File;
use std::path::Path;

use ::csv::ReaderBuilder;

const SCORE_COLUMNS: [&str; 3] = ["log_likelihood", "log_prior", "log_posterior"];

/// One retained MCMC sample as written to a trace file.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    /// Production step the sample was drawn at.
    pub step: usize,
    /// Full parameter vector, in header order.
    pub params: Vec<f64>,
    pub log_likelihood: f64,
    pub log_prior: f64,
    pub log_posterior: f64,
}

/// Writes a chain trace CSV, one row per retained sample.
pub struct TraceWriter {
    writer: ::csv::Writer<File>,
    param_count: usize,
}

impl TraceWriter {
    /// Creates (truncating) the trace file and writes its header.
    pub fn create(path: &Path, param_names: &[&str]) -> Result<TraceWriter> {
        if param_names.is_empty() {
            return Err(FilixError::InvalidInput(
                "TraceWriter::create: parameter names must not be empty".into(),
            ));
        }
        let file = File::create(path).map_err(|e| {
            FilixError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mut writer = ::csv::Writer::from_writer(file);
        let mut header: Vec<&str> = Vec::with_capacity(param_names.len() + 4);
        header.push("step");
        header.extend_from_slice(param_names);
        header.extend_from_slice(&SCORE_COLUMNS);
        writer.write_record(&header).map_err(write_error)?;
        writer.flush()?;
        Ok(TraceWriter {
            writer,
            param_count: param_names.len(),
        })
    }

    /// Appends one sample and flushes it to disk.
    pub fn append(&mut self, row: &TraceRow) -> Result<()> {
        if row.params.len() != self.param_count {
            return Err(FilixError::InvalidInput(format!(
                "TraceWriter::append: row has {} parameters, header has {}",
                row.params.len(),
                self.param_count
            )));
        }
        let mut record: Vec<String> = Vec::with_capacity(self.param_count + 4);
        record.push(row.step.to_string());
        record.extend(row.params.iter().map(|v| v.to_string()));
        record.push(row.log_likelihood.to_string());
        record.push(row.log_prior.to_string());
        record.push(row.log_posterior.to_string());
        self.writer.write_record(&record).map_err(write_error)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn write_error(e: ::csv::Error) -> FilixError {
    FilixError::Other(format!("trace write: {}", e))
}

/// Reads a chain trace back, returning the parameter names and all rows.
pub fn read_trace(path: &Path) -> Result<(Vec<String>, Vec<TraceRow>)> {
    let file = File::open(path).map_err(|e| {
        FilixError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| FilixError::Parse(e.to_string()))?
        .clone();
    let columns: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if columns.len() < 5 || columns[0] != "step" || columns[columns.len() - 3..] != SCORE_COLUMNS {
        return Err(FilixError::Parse(format!(
            "{}: not a chain trace header",
            path.display()
        )));
    }
    let names = columns[1..columns.len() - 3].to_vec();

    let parse_field = |record: &::csv::StringRecord, idx: usize| -> Result<f64> {
        let cell = record.get(idx).ok_or_else(|| {
            FilixError::Parse(format!("trace record missing field {}", idx))
        })?;
        cell.parse::<f64>()
            .map_err(|_| FilixError::Parse(format!("invalid numeric field '{}'", cell)))
    };

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| FilixError::Parse(e.to_string()))?;
        let step_cell = record
            .get(0)
            .ok_or_else(|| FilixError::Parse("trace record missing step".into()))?;
        let step: usize = step_cell
            .parse()
            .map_err(|_| FilixError::Parse(format!("invalid step '{}'", step_cell)))?;
        let mut params = Vec::with_capacity(names.len());
        for idx in 1..=names.len() {
            params.push(parse_field(&record, idx)?);
        }
        let base = names.len();
        rows.push(TraceRow {
            step,
            params,
            log_likelihood: parse_field(&record, base + 1)?,
            log_prior: parse_field(&record, base + 2)?,
            log_posterior: parse_field(&record, base + 3)?,
        });
    }
    Ok((names, rows))
}
