use super::ReadAt;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::Path;

/// Local file reader with random access support
pub struct LocalFileReader {
    file: File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::io_at(path))?;
        Self::from_file(file)
    }

    /// Wrap an already opened handle, e.g. a reopened spool file.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            // seek_read moves the handle's cursor, but every caller passes
            // its own offset so nothing depends on it
            Ok(self.file.seek_read(buf, offset)?)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (offset, buf);
            Err(Error::UnsupportedFeature(
                "positional file reads on this platform".into(),
            ))
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}
