//! Plain-text input and output for spectra, heatmaps and JSON reports.
//!
//! Spectra are two-column files (`x, y`), comma separated for `.csv` and tab or
//! space separated otherwise. Heatmaps are CSV with the x coordinates in the
//! first row (after an empty corner cell) and the y coordinate leading each
//! following row.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use nalgebra::DMatrix;
use serde::Serialize;

use origami::data::heatmap::Heatmap;
use origami::data::spectrum::Spectrum;

/// Field delimiter for a spectrum file, chosen from its extension.
fn delimiter_for(path: &Path) -> Option<u8> {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "csv" => Some(b','),
        _ => None,
    }
}

fn parse_field(value: &str, line: usize) -> Result<f64> {
    value.trim()
        .parse::<f64>()
        .with_context(|| format!("line {}: `{}` is not a number", line, value.trim()))
}

/// Reads a two-column spectrum.
///
/// A non-numeric first line is treated as a header. Lines starting with `#` are skipped.
pub fn read_spectrum(path: &Path) -> Result<Spectrum> {
    let file = File::open(path).with_context(|| format!("Failed to open spectrum: {}", path.display()))?;
    read_spectrum_from(BufReader::new(file), delimiter_for(path))
        .with_context(|| format!("Failed to read spectrum: {}", path.display()))
}

/// Reads a spectrum from any reader; `None` splits fields on tabs and spaces.
pub fn read_spectrum_from<R: Read>(reader: R, delimiter: Option<u8>) -> Result<Spectrum> {
    let mut points = SpectrumPoints::default();
    match delimiter {
        Some(d) => {
            let mut csv_reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .delimiter(d)
                .comment(Some(b'#'))
                .trim(csv::Trim::All)
                .flexible(true)
                .from_reader(reader);
            for record in csv_reader.records() {
                let record = record.context("Failed to read spectrum record")?;
                let line = record.position().map_or(0, |p| p.line() as usize);
                if record.iter().all(|field| field.is_empty()) {
                    continue;
                }
                points.push(record.iter().collect(), line)?;
            }
        }
        None => {
            let mut text = String::new();
            BufReader::new(reader).read_to_string(&mut text)?;
            for (number, line) in text.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                points.push(trimmed.split_whitespace().collect(), number + 1)?;
            }
        }
    }
    Ok(Spectrum::new(points.x, points.y)?)
}

/// Accumulates `x, y` pairs, skipping a single non-numeric header line.
#[derive(Default)]
struct SpectrumPoints {
    x: Vec<f64>,
    y: Vec<f64>,
    header_skipped: bool,
}

impl SpectrumPoints {
    fn push(&mut self, fields: Vec<&str>, line: usize) -> Result<()> {
        if fields.len() < 2 {
            bail!("line {}: expected two columns, found {}", line, fields.len());
        }
        match (parse_field(fields[0], line), parse_field(fields[1], line)) {
            (Ok(x), Ok(y)) => {
                self.x.push(x);
                self.y.push(y);
            }
            (Err(_), _) | (_, Err(_)) if self.x.is_empty() && !self.header_skipped => self.header_skipped = true,
            (Err(e), _) | (_, Err(e)) => return Err(e),
        }
        Ok(())
    }
}

pub fn write_spectrum(path: &Path, spectrum: &Spectrum) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    writer.write_record(["x", "y"])?;
    for (x, y) in spectrum.x.iter().zip(spectrum.y.iter()) {
        writer.write_record([x.to_string(), y.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_heatmap(path: &Path) -> Result<Heatmap> {
    let file = File::open(path).with_context(|| format!("Failed to open heatmap: {}", path.display()))?;
    read_heatmap_from(BufReader::new(file)).with_context(|| format!("Failed to read heatmap: {}", path.display()))
}

pub fn read_heatmap_from<R: Read>(reader: R) -> Result<Heatmap> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = csv_reader.records();
    let header = match records.next() {
        Some(record) => record.context("Failed to read the x-axis row")?,
        None => bail!("heatmap file is empty"),
    };
    let x = header.iter()
        .skip(1)
        .map(|value| parse_field(value, 1))
        .collect::<Result<Vec<f64>>>()?;

    let mut y = Vec::new();
    let mut values = Vec::new();
    for (i, record) in records.enumerate() {
        let line = i + 2;
        let record = record.with_context(|| format!("Failed to read line {}", line))?;
        if record.len() != x.len() + 1 {
            bail!("line {}: expected {} fields, found {}", line, x.len() + 1, record.len());
        }
        let mut fields = record.iter().map(|value| parse_field(value, line));
        if let Some(coordinate) = fields.next() {
            y.push(coordinate?);
        }
        for value in fields {
            values.push(value?);
        }
    }

    let array = DMatrix::from_row_slice(y.len(), x.len(), &values);
    Ok(Heatmap::new(array, x, y)?)
}

pub fn write_heatmap(path: &Path, heatmap: &Heatmap) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
    write_heatmap_to(BufWriter::new(file), heatmap)
}

pub fn write_heatmap_to<W: Write>(writer: W, heatmap: &Heatmap) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let header: Vec<String> = std::iter::once(String::new())
        .chain(heatmap.x.iter().map(|x| x.to_string()))
        .collect();
    csv_writer.write_record(&header)?;

    for (r, y) in heatmap.y.iter().enumerate() {
        let row: Vec<String> = std::iter::once(y.to_string())
            .chain(heatmap.array.row(r).iter().map(|v| v.to_string()))
            .collect();
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_spectrum_with_header_and_comments() {
        let text = "mz,intensity\n# comment\n100.0,1.5\n100.5,3\n";
        let spectrum = read_spectrum_from(text.as_bytes(), Some(b',')).unwrap();
        assert_eq!(spectrum.x, vec![100.0, 100.5]);
        assert_eq!(spectrum.y, vec![1.5, 3.0]);
    }

    #[test]
    fn test_read_whitespace_spectrum() {
        let text = "100.0\t1\n100.5   2\n";
        let spectrum = read_spectrum_from(text.as_bytes(), None).unwrap();
        assert_eq!(spectrum.y, vec![1.0, 2.0]);
    }

    #[test]
    fn test_read_semicolon_spectrum_with_extra_columns() {
        let text = "m/z; intensity; note\n100.0; 1.5; a\n\n100.5; 3\n";
        let spectrum = read_spectrum_from(text.as_bytes(), Some(b';')).unwrap();
        assert_eq!(spectrum.x, vec![100.0, 100.5]);
        assert_eq!(spectrum.y, vec![1.5, 3.0]);
    }

    #[test]
    fn test_single_column_line_fails() {
        let text = "100.0,1\n100.5\n";
        assert!(read_spectrum_from(text.as_bytes(), Some(b',')).is_err());
    }

    #[test]
    fn test_bad_value_after_first_line_fails() {
        let text = "100.0,1\n100.5,abc\n";
        assert!(read_spectrum_from(text.as_bytes(), Some(b',')).is_err());
    }

    #[test]
    fn test_heatmap_round_trip() {
        let array = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.5]);
        let heatmap = Heatmap::new(array, vec![10.0, 20.0, 30.0], vec![0.5, 1.5]).unwrap();

        let mut buffer = Vec::new();
        write_heatmap_to(&mut buffer, &heatmap).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with(",10,20,30"));

        let parsed = read_heatmap_from(buffer.as_slice()).unwrap();
        assert_eq!(parsed, heatmap);
    }

    #[test]
    fn test_ragged_heatmap_is_rejected() {
        let text = ",1,2\n0,1,2\n1,3\n";
        assert!(read_heatmap_from(text.as_bytes()).is_err());
    }

    #[test]
    fn test_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.csv");
        let spectrum = Spectrum::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();

        write_spectrum(&path, &spectrum).unwrap();
        assert_eq!(read_spectrum(&path).unwrap(), spectrum);

        let json = dir.path().join("spectrum.json");
        write_json(&json, &spectrum).unwrap();
        let value: serde_json::Value = serde_json::from_reader(File::open(&json).unwrap()).unwrap();
        assert_eq!(value["y"][1], 4.0);
    }
}
