//! Line-delimited detection input: stdin, a file, or a followed file with rotation detection

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::time::sleep;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

pub struct FileLineReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    inode: Option<u64>,
    follow: bool,
    poll_interval: Duration,
    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
}

impl FileLineReader {
    pub fn new(path: PathBuf, follow: bool) -> Self {
        Self {
            path,
            reader: None,
            inode: None,
            follow,
            poll_interval: Duration::from_millis(100),
            partial: Vec::new(),
        }
    }

    /// Open the file from its beginning
    pub async fn open(&mut self) -> io::Result<()> {
        let file = File::open(&self.path).await?;

        #[cfg(unix)]
        {
            self.inode = Some(file.metadata().await?.ino());
        }

        self.reader = Some(BufReader::new(file));
        log::info!("📖 Reading detections from {}", self.path.display());
        Ok(())
    }

    /// Next non-blank line as raw bytes, surrounding whitespace trimmed.
    ///
    /// Without `follow`, `Ok(None)` marks end of file and a final unterminated line
    /// is returned as is. With it, a line is only returned once its newline arrives;
    /// the reader waits for appended data and reopens the file after rotation.
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File not opened"))?;

            reader.read_until(b'\n', &mut self.partial).await?;

            if self.partial.ends_with(b"\n") {
                let line = std::mem::take(&mut self.partial);
                if let Some(trimmed) = trim_line(&line) {
                    return Ok(Some(trimmed));
                }
                continue;
            }

            // End of file, possibly mid-line
            if !self.follow {
                let line = std::mem::take(&mut self.partial);
                return Ok(trim_line(&line));
            }

            if self.rotated().await? {
                if !self.partial.is_empty() {
                    log::warn!(
                        "⚠️  Discarding {} bytes of unterminated line from rotated file",
                        self.partial.len()
                    );
                    self.partial.clear();
                }
                log::info!("🔄 File rotation detected, reopening: {}", self.path.display());
                self.open().await?;
                continue;
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn rotated(&self) -> io::Result<bool> {
        #[cfg(unix)]
        {
            match tokio::fs::metadata(&self.path).await {
                Ok(metadata) => Ok(self.inode.map_or(false, |old| old != metadata.ino())),
                // Mid-rotation the path may briefly not exist
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            }
        }

        #[cfg(not(unix))]
        {
            Ok(false)
        }
    }
}

fn trim_line(line: &[u8]) -> Option<Vec<u8>> {
    let start = line.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace())?;
    Some(line[start..=end].to_vec())
}

pub enum LineSource {
    Stdin(BufReader<Stdin>),
    File(FileLineReader),
}

impl LineSource {
    /// `None` reads stdin
    pub async fn open(path: Option<&str>, follow: bool) -> io::Result<Self> {
        match path {
            Some(path) => {
                let mut reader = FileLineReader::new(PathBuf::from(path), follow);
                reader.open().await?;
                Ok(LineSource::File(reader))
            }
            None => {
                log::info!("📖 Reading detections from stdin");
                Ok(LineSource::Stdin(BufReader::new(tokio::io::stdin())))
            }
        }
    }

    /// Raw bytes of the next non-blank line; decoding is left to the classifier
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self {
            LineSource::File(reader) => reader.next_line().await,
            LineSource::Stdin(stdin) => loop {
                let mut line = Vec::new();
                if stdin.read_until(b'\n', &mut line).await? == 0 {
                    return Ok(None);
                }
                if let Some(trimmed) = trim_line(&line) {
                    return Ok(Some(trimmed));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reads_whole_file_then_stops() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("detections.jsonl");
        tokio::fs::write(&file_path, b"first\n\n  second  \n").await.unwrap();

        let mut source = LineSource::open(file_path.to_str(), false).await.unwrap();
        assert_eq!(source.next_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_follow_picks_up_appended_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("detections.jsonl");
        tokio::fs::write(&file_path, b"line1\n").await.unwrap();

        let mut reader = FileLineReader::new(file_path.clone(), true);
        reader.open().await.unwrap();
        assert_eq!(reader.next_line().await.unwrap(), Some(b"line1".to_vec()));

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&file_path)
            .await
            .unwrap();
        file.write_all(b"line2\n").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let line = tokio::time::timeout(Duration::from_secs(2), reader.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, Some(b"line2".to_vec()));
    }

    #[tokio::test]
    async fn test_non_utf8_line_does_not_end_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("detections.jsonl");
        tokio::fs::write(&file_path, b"first\n\xff\xfe garbage\nthird\n").await.unwrap();

        let mut source = LineSource::open(file_path.to_str(), false).await.unwrap();
        assert_eq!(source.next_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"\xff\xfe garbage".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"third".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_follow_waits_for_the_rest_of_a_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("detections.jsonl");
        tokio::fs::write(&file_path, br#"{"ProtectiveEquipmentModelVersion":"1.0","Pers"#)
            .await
            .unwrap();

        let mut reader = FileLineReader::new(file_path.clone(), true);
        reader.open().await.unwrap();

        // Nothing complete yet
        let pending = tokio::time::timeout(Duration::from_millis(300), reader.next_line()).await;
        assert!(pending.is_err());

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&file_path)
            .await
            .unwrap();
        file.write_all(b"ons\":[]}\n").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let line = tokio::time::timeout(Duration::from_secs(2), reader.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            line,
            Some(br#"{"ProtectiveEquipmentModelVersion":"1.0","Persons":[]}"#.to_vec())
        );
    }

    #[tokio::test]
    async fn test_unterminated_last_line_returned_without_follow() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("detections.jsonl");
        tokio::fs::write(&file_path, b"first\nlast").await.unwrap();

        let mut source = LineSource::open(file_path.to_str(), false).await.unwrap();
        assert_eq!(source.next_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), Some(b"last".to_vec()));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope.jsonl");
        assert!(LineSource::open(missing.to_str(), false).await.is_err());
    }
}
