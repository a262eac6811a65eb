/// Captured telemetry rows and the column views used for plotting

use std::sync::{Arc, Mutex};

/// Shared buffer filled by the board reader thread
pub type TelemetryBuffer = Arc<Mutex<Vec<Vec<f64>>>>;

pub const DEFAULT_TELEMETRY_CAPACITY: usize = 50_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("No data available")]
    Empty,
    #[error("Bad column index: {0:?}")]
    InvalidColumn(String),
    #[error("Column {column} out of range (rows have {width} columns)")]
    ColumnOutOfRange { column: usize, width: usize },
    #[error("Row {row} has {len} columns, expected {width}")]
    RaggedRow { row: usize, len: usize, width: usize },
}

/// One plotted line: sample index on x, column value on y
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub column: usize,
    pub points: Vec<[f64; 2]>,
}

pub fn new_buffer() -> TelemetryBuffer {
    Arc::new(Mutex::new(Vec::new()))
}

/// Append a row, dropping the oldest rows once `capacity` is exceeded
pub fn push_row(buffer: &TelemetryBuffer, row: Vec<f64>, capacity: usize) {
    let Ok(mut rows) = buffer.lock() else { return; };
    rows.push(row);
    if rows.len() > capacity {
        let excess = rows.len() - capacity;
        rows.drain(..excess);
    }
}

/// Transpose rows into columns. Width comes from the first row.
pub fn columns(rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, TelemetryError> {
    let first = rows.first().ok_or(TelemetryError::Empty)?;
    let width = first.len();
    let mut cols = vec![Vec::with_capacity(rows.len()); width];
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(TelemetryError::RaggedRow { row: row_idx, len: row.len(), width });
        }
        for (col, value) in cols.iter_mut().zip(row) {
            col.push(*value);
        }
    }
    Ok(cols)
}

/// Parse a column selection like `"2 4 8"`
pub fn parse_selection(text: &str) -> Result<Vec<usize>, TelemetryError> {
    text.split_whitespace()
        .map(|tok| tok.parse::<usize>().map_err(|_| TelemetryError::InvalidColumn(tok.to_string())))
        .collect()
}

pub fn select_series(rows: &[Vec<f64>], selection: &[usize]) -> Result<Vec<PlotSeries>, TelemetryError> {
    let cols = columns(rows)?;
    selection
        .iter()
        .map(|&column| {
            let values = cols
                .get(column)
                .ok_or(TelemetryError::ColumnOutOfRange { column, width: cols.len() })?;
            let points = values.iter().enumerate().map(|(i, v)| [i as f64, *v]).collect();
            Ok(PlotSeries { column, points })
        })
        .collect()
}

/// Render a row as `(a, b, c)`
pub fn format_entry(row: &[f64]) -> String {
    let items: Vec<String> = row.iter().map(|v| v.to_string()).collect();
    format!("({})", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 1.0, 2.0],
            vec![10.0, 11.0, 12.0],
            vec![20.0, 21.0, 22.5],
        ]
    }

    #[test]
    fn test_columns_transposes() {
        let cols = columns(&sample()).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[2], vec![2.0, 12.0, 22.5]);
    }

    #[test]
    fn test_columns_empty_and_ragged() {
        assert_eq!(columns(&[]), Err(TelemetryError::Empty));
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert_eq!(columns(&rows), Err(TelemetryError::RaggedRow { row: 1, len: 1, width: 2 }));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(" 2 4  8 ").unwrap(), vec![2, 4, 8]);
        assert!(parse_selection("").unwrap().is_empty());
        assert_eq!(parse_selection("2 x"), Err(TelemetryError::InvalidColumn("x".into())));
        assert!(parse_selection("-1").is_err());
    }

    #[test]
    fn test_select_series_points() {
        let series = select_series(&sample(), &[1]).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].column, 1);
        assert_eq!(series[0].points, vec![[0.0, 1.0], [1.0, 11.0], [2.0, 21.0]]);
    }

    #[test]
    fn test_select_series_column_out_of_range() {
        let err = select_series(&sample(), &[0, 3]).unwrap_err();
        assert_eq!(err, TelemetryError::ColumnOutOfRange { column: 3, width: 3 });
    }

    #[test]
    fn test_push_row_evicts_oldest() {
        let buffer = new_buffer();
        for i in 0..5 {
            push_row(&buffer, vec![i as f64], 3);
        }
        let rows = buffer.lock().unwrap();
        assert_eq!(*rows, vec![vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[test]
    fn test_format_entry() {
        assert_eq!(format_entry(&[1.0, -2.5, 300.0]), "(1, -2.5, 300)");
        assert_eq!(format_entry(&[]), "()");
    }
}
