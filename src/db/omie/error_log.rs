use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use jiff::Zoned;

/// Append-only text file with one `<timestamp>: <message>` line per failed
/// download.  Read it after the run to find out what needs another pass.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new<P: AsRef<Path>>(path: P) -> ErrorLog {
        ErrorLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let timestamp = Zoned::now().strftime("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{}: {}", timestamp, message)
    }

    /// A non-success status other than 404.
    pub fn http_failure(&self, filename: &str, status: u16) -> io::Result<()> {
        self.append(&format!("Failed: {} (HTTP {})", filename, status))
    }

    /// A transport or local I/O fault.
    pub fn fault(&self, filename: &str, description: &str) -> io::Result<()> {
        self.append(&format!("Error: {} ({})", filename, description))
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs};

    use super::*;

    #[test]
    fn append_lines() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let log = ErrorLog::new(dir.path().join("download_errors.log"));
        log.http_failure("pdbc_202001.zip", 503)?;
        log.fault("trades_202001.zip", "operation timed out")?;

        let content = fs::read_to_string(log.path())?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": Failed: pdbc_202001.zip (HTTP 503)"));
        assert!(lines[1].ends_with(": Error: trades_202001.zip (operation timed out)"));

        // 2025-01-31 08:15:00: ...
        let (timestamp, _) = lines[0].split_once(": ").unwrap();
        assert_eq!(timestamp.len(), 19);
        assert!(jiff::civil::DateTime::strptime("%Y-%m-%d %H:%M:%S", timestamp).is_ok());
        Ok(())
    }

    #[test]
    fn keeps_previous_runs() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("download_errors.log");
        fs::write(&path, "2024-12-01 10:00:00: Failed: pdvd_202411.zip (HTTP 500)\n")?;
        ErrorLog::new(&path).http_failure("pdvd_202412.zip", 500)?;
        assert_eq!(fs::read_to_string(&path)?.lines().count(), 2);
        Ok(())
    }
}
