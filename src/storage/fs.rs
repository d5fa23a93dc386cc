use super::{check_name, group_by_top_folder, BlobGroup, BlobPermissions, BlobStore};
use crate::error::PipelineError;
use crate::pipeline::input::path_to_file_uri;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// Prefix of in-flight temp files; never listed.
const TEMP_PREFIX: &str = ".tmp";

/// Blob store backed by a directory tree: `{root}/{account}/{container}/{blob}`.
///
/// Writes are atomic (temp file in the target directory, then rename), so
/// a reader never sees a half-written blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, account: &str, container: &str) -> Result<PathBuf, PipelineError> {
        check_name("account", account)?;
        check_name("container", container)?;
        if container.contains('/') || account.contains('/') {
            return Err(PipelineError::InvalidInput {
                input: format!("container '{container}'"),
            });
        }
        Ok(self.root.join(account).join(container))
    }

    fn blob_path(&self, account: &str, container: &str, blob: &str) -> Result<PathBuf, PipelineError> {
        check_name("blob", blob)?;
        let mut path = self.container_dir(account, container)?;
        path.extend(blob.split('/'));
        Ok(path)
    }
}

fn storage_err(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

fn write_blocking(
    path: &Path,
    container: &str,
    blob: &str,
    bytes: &[u8],
    overwrite: bool,
) -> Result<(), PipelineError> {
    let parent = path.parent().unwrap_or(path);
    std::fs::create_dir_all(parent).map_err(storage_err(parent))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err(parent))?;
    tmp.write_all(bytes).map_err(storage_err(path))?;
    tmp.as_file().sync_all().map_err(storage_err(path))?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    match persisted {
        Ok(_) => Ok(()),
        Err(e) if !overwrite && e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(PipelineError::BlobExists {
                container: container.to_string(),
                blob: blob.to_string(),
            })
        }
        Err(e) => Err(PipelineError::Storage {
            path: path.to_path_buf(),
            source: e.error,
        }),
    }
}

/// Collect blob names under `dir`, `/`-joined and sorted.
fn list_blocking(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let mut names = Vec::new();
    if !dir.exists() {
        return Ok(names);
    }
    let mut stack = vec![(dir.to_path_buf(), String::new())];
    while let Some((current, prefix)) = stack.pop() {
        for entry in std::fs::read_dir(&current).map_err(storage_err(&current))? {
            let entry = entry.map_err(storage_err(&current))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let name = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };
            let file_type = entry.file_type().map_err(storage_err(&current))?;
            if file_type.is_dir() {
                stack.push((entry.path(), name));
            } else {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), PipelineError> {
        let path = self.blob_path(account, container, blob)?;
        let (container, blob) = (container.to_string(), blob.to_string());
        let len = bytes.len();

        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            write_blocking(&target, &container, &blob, &bytes, overwrite)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Write task panicked: {}", e)))??;

        debug!("Wrote {} bytes to {}", len, path.display());
        Ok(())
    }

    async fn read_all(
        &self,
        account: &str,
        container: &str,
        blob: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let path = self.blob_path(account, container, blob)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::BlobNotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            }),
            Err(e) => Err(PipelineError::Storage { path, source: e }),
        }
    }

    async fn list_grouped_by_top_folder(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<BlobGroup>, PipelineError> {
        let dir = self.container_dir(account, container)?;
        let names = tokio::task::spawn_blocking(move || list_blocking(&dir))
            .await
            .map_err(|e| PipelineError::Internal(format!("List task panicked: {}", e)))??;
        Ok(group_by_top_folder(container, names))
    }

    async fn generate_timed_read_uri(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        permissions: BlobPermissions,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        let path = self.blob_path(account, container, blob)?;
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(storage_err(&path))?
                .join(&path)
        };
        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| PipelineError::Internal(format!("TTL out of range: {e}")))?;
        Ok(format!(
            "{}?sp={}&se={}",
            path_to_file_uri(&absolute),
            permissions.as_query(),
            expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::fetch_bytes;

    #[tokio::test]
    async fn second_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store
            .write("acct", "invoices", "march/a.pdf.Data.json", b"one".to_vec(), true)
            .await
            .unwrap();
        store
            .write("acct", "invoices", "march/a.pdf.Data.json", b"two".to_vec(), true)
            .await
            .unwrap();

        let groups = store.list_grouped_by_top_folder("acct", "invoices").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].blobs, vec!["march/a.pdf.Data.json".to_string()]);
        assert_eq!(
            store.read_all("acct", "invoices", "march/a.pdf.Data.json").await.unwrap(),
            b"two"
        );
    }

    #[tokio::test]
    async fn no_clobber_reports_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.write("a", "c", "x", b"1".to_vec(), false).await.unwrap();
        let err = store.write("a", "c", "x", b"2".to_vec(), false).await.unwrap_err();
        assert!(matches!(err, PipelineError::BlobExists { .. }));
    }

    #[tokio::test]
    async fn missing_blob_and_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.read_all("a", "c", "nope").await.unwrap_err();
        assert!(matches!(err, PipelineError::BlobNotFound { .. }));
        assert!(store.list_grouped_by_top_folder("a", "c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_uri_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store
            .write("a", "c", "f/doc.pdf", b"%PDF".to_vec(), true)
            .await
            .unwrap();
        let uri = store
            .generate_timed_read_uri("a", "c", "f/doc.pdf", BlobPermissions::READ, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.contains("?sp=r&se="));
        assert_eq!(fetch_bytes(&uri, 5).await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn read_uri_escapes_query_and_fragment_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for (blob, body) in [
            ("f/a?b.pdf", &b"qmark"[..]),
            ("f/a#b.pdf", &b"hash"[..]),
            ("f/50% off?.pdf", &b"mixed"[..]),
        ] {
            store.write("a", "c", blob, body.to_vec(), true).await.unwrap();
            let uri = store
                .generate_timed_read_uri("a", "c", blob, BlobPermissions::READ, Duration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(uri.matches('?').count(), 1, "{uri}");
            assert!(!uri.contains('#'), "{uri}");
            assert_eq!(fetch_bytes(&uri, 5).await.unwrap(), body, "{blob}");
        }
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store
            .write("a", "c", "../../escape", b"x".to_vec(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { .. }));
    }
}
