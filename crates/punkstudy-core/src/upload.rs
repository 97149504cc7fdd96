use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::UploadError;
use crate::gateway::{Backend, UploadResult};

/// File types the picker offers. Drops are not filtered.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

pub fn is_accepted(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

/// A file's bytes plus the name sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub async fn load(path: &Path) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }
}

/// Reads `path` and sends it to the backend.
pub async fn upload_path(
    backend: &dyn Backend,
    path: &Path,
    user_id: &str,
) -> Result<UploadResult, UploadError> {
    let file = UploadFile::load(path).await?;
    Ok(backend.upload_document(&file, user_id).await?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Succeeded,
    Failed,
}

/// Transient state of one submission; dropped once it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadTask {
    path: PathBuf,
    status: UploadStatus,
}

/// Terminal acknowledgment shown once per upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub status: UploadStatus,
    pub file_name: String,
}

impl Notice {
    pub fn succeeded(&self) -> bool {
        self.status == UploadStatus::Succeeded
    }

    pub fn message(&self) -> &'static str {
        if self.succeeded() {
            "Upload successful!"
        } else {
            "Upload failed. Please try again."
        }
    }
}

/// Accepts one file at a time and refuses new ones while an upload is in flight.
#[derive(Debug, Default)]
pub struct UploadWidget {
    task: Option<UploadTask>,
}

impl UploadWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> UploadStatus {
        self.task
            .as_ref()
            .map(|task| task.status)
            .unwrap_or(UploadStatus::Idle)
    }

    pub fn is_uploading(&self) -> bool {
        self.status() == UploadStatus::Uploading
    }

    pub fn in_flight(&self) -> Option<&Path> {
        self.task.as_ref().map(|task| task.path.as_path())
    }

    /// Takes the first of `paths` and marks it uploading.
    ///
    /// Returns `None` without touching state when nothing was offered or an
    /// upload is already running.
    pub fn accept(&mut self, paths: &[PathBuf]) -> Option<PathBuf> {
        if self.is_uploading() {
            info!("upload already in flight, ignoring drop");
            return None;
        }
        let path = paths.first()?.clone();
        if paths.len() > 1 {
            info!(ignored = paths.len() - 1, "only the first dropped file is uploaded");
        }
        self.task = Some(UploadTask {
            path: path.clone(),
            status: UploadStatus::Uploading,
        });
        Some(path)
    }

    /// Settles the in-flight upload and returns the acknowledgment for it.
    pub fn finish(&mut self, outcome: Result<UploadResult, UploadError>) -> Option<Notice> {
        let mut task = self.task.take()?;
        task.status = match outcome {
            Ok(_) => {
                info!(path = %task.path.display(), "upload succeeded");
                UploadStatus::Succeeded
            }
            Err(err) => {
                warn!(path = %task.path.display(), error = %err, "upload failed");
                UploadStatus::Failed
            }
        };
        let file_name = task
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Notice {
            status: task.status,
            file_name,
        })
    }

    /// Accepts, uploads and settles in one go.
    pub async fn upload(
        &mut self,
        backend: &dyn Backend,
        paths: &[PathBuf],
        user_id: &str,
    ) -> Option<Notice> {
        let path = self.accept(paths)?;
        let outcome = upload_path(backend, &path, user_id).await;
        self.finish(outcome)
    }
}

/// Splits the text a terminal pastes for dragged-in files into paths.
///
/// Terminals differ: some quote paths with spaces, some backslash-escape
/// them, some paste `file://` URIs.
pub fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    paths.push(token_to_path(&std::mem::take(&mut current)));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        paths.push(token_to_path(&current));
    }

    paths.retain(|path| !path.as_os_str().is_empty());
    paths
}

fn token_to_path(token: &str) -> PathBuf {
    match token.strip_prefix("file://") {
        Some(rest) => PathBuf::from(percent_decode(rest)),
        None => PathBuf::from(token),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push((hex_value(bytes[i + 1]) << 4) | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::gateway::{GenerationResult, QueryResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        uploads: AtomicUsize,
        names: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        async fn upload_document(
            &self,
            file: &UploadFile,
            _user_id: &str,
        ) -> Result<UploadResult, TransportError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.names.lock().unwrap().push(file.file_name.clone());
            if self.fail {
                Err(TransportError::Status {
                    operation: "upload",
                    status: 502,
                    body: String::new(),
                })
            } else {
                Ok(UploadResult(serde_json::json!({ "message": "stored" })))
            }
        }

        async fn process_query(
            &self,
            _query: &str,
            _user_id: &str,
        ) -> Result<QueryResult, TransportError> {
            unreachable!()
        }

        async fn generate_text(
            &self,
            _prompt: &str,
            _max_length: u32,
        ) -> Result<GenerationResult, TransportError> {
            unreachable!()
        }
    }

    fn write_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"lecture notes").unwrap();
        path
    }

    #[test]
    fn test_zero_files_is_noop() {
        let mut widget = UploadWidget::new();
        assert_eq!(widget.accept(&[]), None);
        assert_eq!(widget.status(), UploadStatus::Idle);
        assert!(widget.finish(Ok(UploadResult(serde_json::Value::Null))).is_none());
    }

    #[test]
    fn test_second_drop_rejected_while_uploading() {
        let mut widget = UploadWidget::new();
        let first = widget.accept(&[PathBuf::from("a.pdf")]);
        assert_eq!(first, Some(PathBuf::from("a.pdf")));
        assert_eq!(widget.accept(&[PathBuf::from("b.pdf")]), None);
        assert_eq!(widget.status(), UploadStatus::Uploading);
        assert_eq!(widget.in_flight(), Some(Path::new("a.pdf")));
    }

    #[test]
    fn test_only_first_file_taken() {
        let mut widget = UploadWidget::new();
        let picked = widget.accept(&[PathBuf::from("one.txt"), PathBuf::from("two.txt")]);
        assert_eq!(picked, Some(PathBuf::from("one.txt")));
    }

    #[tokio::test]
    async fn test_pending_upload_blocks_second_request() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.txt");
        let b = write_file(dir.path(), "b.txt");
        let backend = RecordingBackend::default();
        let mut widget = UploadWidget::new();

        let path = widget.accept(&[a]).unwrap();
        assert!(widget.accept(&[b]).is_none());
        assert_eq!(widget.status(), UploadStatus::Uploading);

        let outcome = upload_path(&backend, &path, "default_user").await;
        let notice = widget.finish(outcome).unwrap();

        assert!(notice.succeeded());
        assert_eq!(notice.message(), "Upload successful!");
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(*backend.names.lock().unwrap(), ["a.txt"]);
        assert_eq!(widget.status(), UploadStatus::Idle);
    }

    #[tokio::test]
    async fn test_backend_failure_reports_notice() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.docx");
        let backend = RecordingBackend { fail: true, ..Default::default() };
        let mut widget = UploadWidget::new();

        let notice = widget.upload(&backend, &[path], "u").await.unwrap();
        assert_eq!(notice.status, UploadStatus::Failed);
        assert_eq!(notice.message(), "Upload failed. Please try again.");
        assert_eq!(notice.file_name, "notes.docx");
        assert!(!widget.is_uploading());
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::default();
        let mut widget = UploadWidget::new();

        let notice = widget
            .upload(&backend, &[dir.path().join("missing.pdf")], "u")
            .await
            .unwrap();
        assert!(!notice.succeeded());
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_accepted_extensions() {
        assert!(is_accepted(Path::new("week1.pdf")));
        assert!(is_accepted(Path::new("essay.DOCX")));
        assert!(is_accepted(Path::new("notes.txt")));
        assert!(!is_accepted(Path::new("photo.png")));
        assert!(!is_accepted(Path::new("README")));
    }

    #[test]
    fn test_parse_plain_and_escaped_paths() {
        let paths = parse_dropped_paths("/tmp/a.pdf /tmp/my\\ notes.txt\n");
        assert_eq!(paths, [PathBuf::from("/tmp/a.pdf"), PathBuf::from("/tmp/my notes.txt")]);
    }

    #[test]
    fn test_parse_quoted_paths() {
        let paths = parse_dropped_paths("'/home/me/Study Guide.docx' \"/tmp/b.txt\"");
        assert_eq!(
            paths,
            [PathBuf::from("/home/me/Study Guide.docx"), PathBuf::from("/tmp/b.txt")]
        );
    }

    #[test]
    fn test_parse_file_uris() {
        let paths = parse_dropped_paths("file:///tmp/Chapter%201.pdf");
        assert_eq!(paths, [PathBuf::from("/tmp/Chapter 1.pdf")]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_dropped_paths("").is_empty());
        assert!(parse_dropped_paths("   \n ").is_empty());
        assert!(parse_dropped_paths("''").is_empty());
    }
}
