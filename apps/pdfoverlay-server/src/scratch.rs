//! Per-request scratch storage
//!
//! Every request gets its own directory under the scratch root, named after
//! a fresh request id. Uploads land in `uploads/`, the result in
//! `processed/`. The directory is deleted when the [`ScratchSpace`] is
//! dropped, whichever way the request ends.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

const UPLOADS_DIR: &str = "uploads";
const PROCESSED_DIR: &str = "processed";

/// Name of the composited document inside `processed/`
pub const RESULT_FILE_NAME: &str = "edited.pdf";

#[derive(Debug)]
pub struct ScratchSpace {
    id: Uuid,
    dir: TempDir,
}

impl ScratchSpace {
    /// Create a fresh directory under `root`
    pub fn create(root: &Path) -> io::Result<Self> {
        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("req-{}-", id))
            .tempdir_in(root)?;
        std::fs::create_dir(dir.path().join(UPLOADS_DIR))?;
        std::fs::create_dir(dir.path().join(PROCESSED_DIR))?;

        tracing::debug!(request_id = %id, path = %dir.path().display(), "Scratch space created");
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Persist one uploaded file for `field`
    pub async fn save_upload(
        &self,
        field: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self
            .path()
            .join(UPLOADS_DIR)
            .join(upload_file_name(field, file_name));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Where [`write_result`](Self::write_result) puts the composited document
    pub fn result_path(&self) -> PathBuf {
        self.path().join(PROCESSED_DIR).join(RESULT_FILE_NAME)
    }

    /// Write the composited document, returning its size on disk
    pub async fn write_result(&self, bytes: &[u8]) -> io::Result<u64> {
        let path = self.result_path();
        tokio::fs::write(&path, bytes).await?;
        Ok(tokio::fs::metadata(&path).await?.len())
    }
}

/// Field-prefixed, sanitized file name, so two fields uploading the same
/// file name never collide
fn upload_file_name(field: &str, file_name: &str) -> String {
    let field = secure_filename(field);
    let field = if field.is_empty() { "field".to_string() } else { field };
    match secure_filename(file_name) {
        name if name.is_empty() => format!("{}.bin", field),
        name => format!("{}-{}", field, name),
    }
}

/// Reduce a client-supplied file name to a safe ASCII name
///
/// Path separators and whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing dots and
/// underscores are stripped. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
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

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\photo.jpg"), "C_Users_me_photo.jpg");
        assert_eq!(secure_filename("फ़ोटो.png"), "png");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn test_upload_file_name_falls_back_to_field() {
        assert_eq!(upload_file_name("photo", "me.png"), "photo-me.png");
        assert_eq!(upload_file_name("photo", "../"), "photo.bin");
    }

    #[tokio::test]
    async fn test_scratch_spaces_are_distinct_and_removed() {
        let root = tempfile::tempdir().unwrap();

        let first = ScratchSpace::create(root.path()).unwrap();
        let second = ScratchSpace::create(root.path()).unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.path(), second.path());

        let upload = first.save_upload("pdf", "template.pdf", b"%PDF").await.unwrap();
        assert!(upload.starts_with(first.path()));
        assert_eq!(upload.file_name().unwrap(), "pdf-template.pdf");

        assert!(!second.result_path().exists());
        let size = second.write_result(b"%PDF-1.7").await.unwrap();
        assert_eq!(size, 8);
        assert_eq!(std::fs::read(second.result_path()).unwrap(), b"%PDF-1.7");

        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());
        assert!(second.path().exists());

        drop(second);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
