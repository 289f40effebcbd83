use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// Open a text file for buffered reading, transparently decompressing when
/// the path ends in `.gz`.
pub fn get_dynamic_reader(path: &Path) -> io::Result<BufReader<Box<dyn Read>>> {
    let file = File::open(path)?;

    let reader: Box<dyn Read> = if path.extension().and_then(OsStr::to_str) == Some("gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };

    Ok(BufReader::new(reader))
}

/// Format a statistic for tabular output.
///
/// Ordinary magnitudes get a trimmed fixed-point rendering, very small
/// non-zero values switch to scientific notation, and NaN becomes `NA`.
pub fn format_stat(x: f64) -> String {
    if x.is_nan() {
        return "NA".to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }
    if x.abs() >= 0.001 {
        let s = format!("{:.4}", x);
        let s = s.trim_end_matches('0').trim_end_matches('.');
        s.to_string()
    } else {
        format!("{:.3e}", x)
    }
}
