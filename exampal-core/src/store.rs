//! Material store: the upload directory.
//!
//! Lists, saves and deletes material files. Extracted text is never cached
//! here; see [`crate::assistant::StudyAssistant`] for extraction on demand.

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::types::{MaterialDescriptor, MaterialKind};

/// Result of a delete request, reported to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
}

impl DeleteOutcome {
    fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

/// The upload directory and its admission rules.
pub struct MaterialStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    /// Serializes the existence-check-and-create step of `save`.
    save_lock: Mutex<()>,
}

impl MaterialStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.upload_dir.clone(),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it does not exist.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Whether `filename` carries an allowed extension.
    pub fn is_allowed(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            })
            .unwrap_or(false)
    }

    fn allowed_list(&self) -> String {
        let mut allowed = self.allowed_extensions.clone();
        allowed.sort();
        allowed.join(", ")
    }

    /// Describe every regular file in the upload directory, sorted by name.
    pub async fn list(&self) -> Result<Vec<MaterialDescriptor>, StoreError> {
        let list_err = |e: std::io::Error| StoreError::ListFailed {
            path: self.root.clone(),
            message: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(list_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            files.push(MaterialDescriptor {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                kind: MaterialKind::from_path(&path),
                path,
                extraction: None,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Save an uploaded file under a sanitized, collision-free name.
    pub async fn save(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<MaterialDescriptor, StoreError> {
        if filename.is_empty() {
            return Err(StoreError::EmptyFilename);
        }
        if !self.is_allowed(filename) {
            return Err(StoreError::DisallowedExtension {
                allowed: self.allowed_list(),
            });
        }

        let secured = sanitize_filename(filename);
        if !self.is_allowed(&secured) {
            return Err(StoreError::InvalidFilename {
                name: filename.to_string(),
            });
        }
        let (base, ext) = match secured.rsplit_once('.') {
            Some((base, ext)) => (base.to_string(), format!(".{ext}")),
            None => (secured.clone(), String::new()),
        };

        let save_err = |e: std::io::Error| StoreError::SaveFailed {
            message: e.to_string(),
        };

        let _guard = self.save_lock.lock().await;
        let mut candidate = secured.clone();
        let mut counter = 1u32;
        let (path, mut file) = loop {
            let path = self.root.join(&candidate);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(name = %candidate, "Upload name taken, trying next suffix");
                    candidate = format!("{base}_{counter}{ext}");
                    counter += 1;
                }
                Err(e) => return Err(save_err(e)),
            }
        };

        if let Err(e) = file.write_all(bytes).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(save_err(e));
        }
        file.flush().await.map_err(save_err)?;
        info!(original = %filename, saved = %path.display(), bytes = bytes.len(), "File uploaded successfully");

        Ok(MaterialDescriptor {
            name: candidate,
            size: bytes.len() as u64,
            kind: MaterialKind::from_path(&path),
            path,
            extraction: None,
        })
    }

    /// Map a client-supplied filename to a path inside the upload directory.
    ///
    /// Rejects parent-directory segments and absolute paths before any
    /// filesystem access.
    pub fn resolve_delete_target(&self, requested: &str) -> Result<PathBuf, StoreError> {
        if is_traversal_attempt(requested) {
            return Err(StoreError::InvalidFilename {
                name: requested.to_string(),
            });
        }
        let path = Path::new(requested);
        if path.starts_with(&self.root) {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }

    /// Remove a file. A missing file is reported, not raised.
    pub async fn delete(&self, path: &Path) -> DeleteOutcome {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return DeleteOutcome::new(false, "File not found"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error checking file");
                return DeleteOutcome::new(false, format!("Error deleting file: {e}"));
            }
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "File deleted");
                DeleteOutcome::new(true, "File deleted successfully")
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error deleting file");
                DeleteOutcome::new(false, format!("Error deleting file: {e}"))
            }
        }
    }
}

/// Whether a client-supplied name tries to escape the upload directory.
///
/// Only a whole `..` segment counts, so `exam..final.pdf` is a plain name.
/// Both separators are checked since clients may send Windows paths.
pub fn is_traversal_attempt(name: &str) -> bool {
    let bytes = name.as_bytes();
    let drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    let parent_segment = name.split(['/', '\\']).any(|segment| segment == "..");
    parent_segment || name.starts_with('/') || name.starts_with('\\') || drive_prefix
}

/// Reduce a client filename to a safe ASCII name.
///
/// Normalizes to NFKD and drops non-ASCII, turns path separators into
/// spaces, joins whitespace runs with `_`, keeps only `[A-Za-z0-9_.-]`, and
/// strips leading and trailing `.` and `_`.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> MaterialStore {
        MaterialStore::new(&StorageConfig {
            upload_dir: dir.to_path_buf(),
            ..StorageConfig::default()
        })
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_umlauts.txt");
        assert_eq!(sanitize_filename("..\\windows\\notes.pdf"), "windows_notes.pdf");
        assert_eq!(sanitize_filename("__.hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("\u{6f22}\u{5b57}"), "");
    }

    #[test]
    fn test_traversal_detection() {
        assert!(is_traversal_attempt("../../etc/passwd"));
        assert!(is_traversal_attempt("/etc/passwd"));
        assert!(is_traversal_attempt("uploads/../secret.pdf"));
        assert!(is_traversal_attempt("\\\\server\\share"));
        assert!(is_traversal_attempt("C:\\Windows\\win.ini"));
        assert!(!is_traversal_attempt("notes.pdf"));
        assert!(!is_traversal_attempt("uploads/notes.pdf"));
    }

    #[test]
    fn test_double_dot_inside_name_is_allowed() {
        assert!(!is_traversal_attempt("a..b.pdf"));
        assert!(!is_traversal_attempt("exam..final.pdf"));
        assert!(!is_traversal_attempt("notes...pdf"));
        assert!(is_traversal_attempt(".."));
        assert!(is_traversal_attempt("notes/.."));
        assert!(is_traversal_attempt("..\\secret.pdf"));
        assert!(is_traversal_attempt("uploads\\..\\secret.pdf"));
    }

    #[test]
    fn test_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.is_allowed("notes.pdf"));
        assert!(store.is_allowed("scan.JPEG"));
        assert!(!store.is_allowed("notes.docx"));
        assert!(!store.is_allowed("pdf"));
    }

    #[test]
    fn test_resolve_delete_target() {
        let store = MaterialStore::new(&StorageConfig::default());
        assert_eq!(
            store.resolve_delete_target("notes.pdf").unwrap(),
            PathBuf::from("uploads/notes.pdf")
        );
        assert_eq!(
            store.resolve_delete_target("uploads/notes.pdf").unwrap(),
            PathBuf::from("uploads/notes.pdf")
        );
        assert!(store.resolve_delete_target("../../etc/passwd").is_err());
        assert!(store.resolve_delete_target("/etc/passwd").is_err());
        assert_eq!(
            store.resolve_delete_target("a..b.pdf").unwrap(),
            PathBuf::from("uploads/a..b.pdf")
        );
    }

    #[tokio::test]
    async fn test_save_collision_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.save("notes.pdf", b"one").await.unwrap();
        let second = store.save("notes.pdf", b"two").await.unwrap();
        let third = store.save("notes.pdf", b"three").await.unwrap();

        assert_eq!(first.name, "notes.pdf");
        assert_eq!(second.name, "notes_1.pdf");
        assert_eq!(third.name, "notes_2.pdf");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"two");
        assert_eq!(third.size, 5);
        assert_eq!(third.kind, MaterialKind::Pdf);
    }

    #[tokio::test]
    async fn test_concurrent_saves_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save("lecture.png", format!("img{i}").as_bytes())
                    .await
                    .unwrap()
                    .name
            }));
        }
        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert_eq!(store.list().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_save_rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let err = store.save("malware.exe", b"MZ").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "File type not allowed. Supported types: jpeg, jpg, pdf, png"
        );
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_and_unsanitizable_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(
            store.save("", b"x").await,
            Err(StoreError::EmptyFilename)
        ));
        assert!(matches!(
            store.save("\u{6f22}\u{5b57}.pdf", b"x").await,
            Err(StoreError::InvalidFilename { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_sanitizes_traversal_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let saved = store.save("../../evil.pdf", b"%PDF").await.unwrap();
        assert_eq!(saved.name, "evil.pdf");
        assert_eq!(saved.path, dir.path().join("evil.pdf"));
    }

    #[tokio::test]
    async fn test_list_sorted_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"12").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"1234").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = store_in(dir.path()).list().await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.png", "c.txt"]);
        assert_eq!(files[0].size, 4);
        assert_eq!(files[0].kind, MaterialKind::Pdf);
        assert_eq!(files[1].kind, MaterialKind::Image);
        assert_eq!(files[2].kind, MaterialKind::Unknown);
        assert!(files.iter().all(|f| f.extraction.is_none()));
    }

    #[tokio::test]
    async fn test_list_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("missing"));
        assert!(matches!(
            store.list().await,
            Err(StoreError::ListFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let saved = store.save("notes.pdf", b"x").await.unwrap();

        let outcome = store.delete(&saved.path).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "File deleted successfully");
        assert!(!saved.path.exists());

        let outcome = store.delete(&saved.path).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "File not found");
    }
}
