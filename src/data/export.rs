use std::io::{self, Write};
use std::path::Path;

use super::traces::SeriesTrace;

fn csv_field(s: &str) -> String {
	if s.contains([',', '"', '\n']) {
		format!("\"{}\"", s.replace('"', "\"\""))
	} else {
		s.to_string()
	}
}

/// Write traces as long-format CSV: `trace,x,y`, one row per point.
pub fn write_series_csv<W: Write>(mut w: W, traces: &[SeriesTrace]) -> io::Result<()> {
	writeln!(w, "trace,x,y")?;
	for tr in traces {
		let name = csv_field(&tr.name.0);
		for [x, y] in tr.points() {
			writeln!(w, "{},{:.9},{}", name, x, y)?;
		}
	}
	w.flush()
}

pub fn save_series_csv<P: AsRef<Path>>(path: P, traces: &[SeriesTrace]) -> io::Result<()> {
	let f = std::fs::File::create(path)?;
	write_series_csv(io::BufWriter::new(f), traces)
}

#[cfg(feature = "parquet")]
pub fn save_series_parquet<P: AsRef<Path>>(
	path: P,
	traces: &[SeriesTrace],
) -> parquet::errors::Result<()> {
	use arrow_array::{Float64Array, RecordBatch, StringArray};
	use arrow_schema::{DataType, Field, Schema};
	use parquet::arrow::arrow_writer::ArrowWriter;
	use parquet::file::properties::WriterProperties;
	use std::sync::Arc;

	let mut trace_col: Vec<String> = Vec::new();
	let mut x_col: Vec<f64> = Vec::new();
	let mut y_col: Vec<f64> = Vec::new();
	for tr in traces {
		for [x, y] in tr.points() {
			trace_col.push(tr.name.0.clone());
			x_col.push(x);
			y_col.push(y);
		}
	}
	let schema = Arc::new(Schema::new(vec![
		Field::new("trace", DataType::Utf8, false),
		Field::new("x", DataType::Float64, false),
		Field::new("y", DataType::Float64, false),
	]));
	let batch = RecordBatch::try_new(
		schema.clone(),
		vec![
			Arc::new(StringArray::from(trace_col)) as _,
			Arc::new(Float64Array::from(x_col)) as _,
			Arc::new(Float64Array::from(y_col)) as _,
		],
	)?;
	let file = std::fs::File::create(path)?;
	let props = WriterProperties::builder().build();
	let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
	writer.write(&batch)?;
	writer.close()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::trace_look::TraceLook;

	#[test]
	fn csv_has_one_row_per_point() {
		let traces = vec![
			SeriesTrace::new("a/loss", vec![0.0, 1.0], vec![2.0, 1.5], TraceLook::default()),
			SeriesTrace::new("b, run", vec![0.0], vec![3.0], TraceLook::default()),
		];
		let mut out = Vec::new();
		write_series_csv(&mut out, &traces).unwrap();
		let text = String::from_utf8(out).unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines[0], "trace,x,y");
		assert_eq!(lines[1], "a/loss,0.000000000,2");
		assert_eq!(lines[2], "a/loss,1.000000000,1.5");
		assert_eq!(lines[3], "\"b, run\",0.000000000,3");
		assert_eq!(lines.len(), 4);
	}
}
