use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use hifitime::{
    efmt::Format,
    prelude::{Epoch, Formatter},
};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid date format: {0}")]
    Format(String),

    #[error("failed to write \"{path}\": {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// CSV export file name, dated (UTC) `t`
pub fn filename(t: Epoch) -> Result<String, ExportError> {
    let fmt = Format::from_str("%Y-%m-%d").map_err(|e| ExportError::Format(format!("{:?}", e)))?;
    let formatter = Formatter::new(t, fmt);
    Ok(format!("cors_devices_{}.csv", formatter))
}

/// Writes the CSV export `body` in `dir`. Returns the file path.
pub fn save(dir: &Path, t: Epoch, body: &[u8]) -> Result<PathBuf, ExportError> {
    let path = dir.join(filename(t)?);

    let io_error = |source: std::io::Error| ExportError::Io {
        path: path.clone(),
        source,
    };

    let fd = File::create(&path).map_err(io_error)?;
    let mut writer = BufWriter::new(fd);

    writer.write_all(body).map_err(io_error)?;
    writer.flush().map_err(io_error)?;

    debug!("{} bytes written to {}", body.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::{filename, save};
    use hifitime::prelude::Epoch;
    use std::str::FromStr;

    #[test]
    fn dated_filename() {
        let t = Epoch::from_str("2024-06-01T23:59:00 UTC").unwrap();
        assert_eq!(filename(t).unwrap(), "cors_devices_2024-06-01.csv");
    }

    #[test]
    fn csv_export() {
        let t = Epoch::from_str("2024-06-02T10:00:00 UTC").unwrap();
        let dir = std::env::temp_dir().join(format!("cors-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = save(&dir, t, b"serial,name\nA,Station A\n").unwrap();
        assert!(path.ends_with("cors_devices_2024-06-02.csv"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "serial,name\nA,Station A\n"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
