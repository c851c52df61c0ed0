//! Transport onto a file share that is already mounted locally (CIFS, NFS).
//!
//! The mount carries its own authentication; credentials only name the share
//! in log lines. Uploads are written to a `.part` file, size-checked and then
//! renamed, so a half-written copy never appears under its final name.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::progress::ProgressReporter;
use crate::transport::{Credentials, Transport, TransportError};

const CHUNK: usize = 1024 * 1024;
const PROBE_FILE: &str = ".tubesync-probe";

pub struct MountedShareTransport {
    mount_root: Option<PathBuf>,
}

impl MountedShareTransport {
    pub fn new(mount_root: Option<PathBuf>) -> Self {
        Self { mount_root }
    }

    fn root(&self) -> Result<&Path, TransportError> {
        self.mount_root
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("transport.mount_root is not set".into()))
    }

    async fn ensure_mounted(&self) -> Result<&Path, TransportError> {
        let root = self.root()?;
        match fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(TransportError::Unreachable(format!(
                "{} is not a directory",
                root.display()
            ))),
            Err(e) => Err(map_io(e, root)),
        }
    }
}

/// `remote` is share-relative; leading separators are ignored.
fn resolve(root: &Path, remote: &str) -> PathBuf {
    remote
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

fn map_io(e: io::Error, path: &Path) -> TransportError {
    let message = format!("{}: {e}", path.display());
    match e.kind() {
        io::ErrorKind::NotFound => TransportError::Unreachable(message),
        io::ErrorKind::PermissionDenied => TransportError::AuthFailed(message),
        _ => TransportError::Transient(message),
    }
}

#[async_trait]
impl Transport for MountedShareTransport {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        credentials: &Credentials,
        progress: &ProgressReporter,
    ) -> Result<(), TransportError> {
        let root = self.ensure_mounted().await?;
        let dest = resolve(root, remote);
        let Some(file_name) = dest.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(TransportError::Transient(format!("invalid remote path {remote:?}")));
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| map_io(e, parent))?;
        }
        let part = dest.with_file_name(format!("{file_name}.part"));

        let mut src = File::open(local).await.map_err(|e| {
            TransportError::Transient(format!("open {}: {e}", local.display()))
        })?;
        let total = src
            .metadata()
            .await
            .map_err(|e| TransportError::Transient(format!("stat {}: {e}", local.display())))?
            .len();

        tracing::debug!(share = %credentials.share, dest = %dest.display(), total, "copying to share");
        let mut out = File::create(&part).await.map_err(|e| map_io(e, &part))?;
        let mut buf = vec![0u8; CHUNK];
        let mut written = 0u64;
        loop {
            let n = src.read(&mut buf).await.map_err(|e| {
                TransportError::Transient(format!("read {}: {e}", local.display()))
            })?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await.map_err(|e| map_io(e, &part))?;
            written += n as u64;
            progress.report(written, Some(total));
        }
        out.flush().await.map_err(|e| map_io(e, &part))?;
        out.sync_all().await.map_err(|e| map_io(e, &part))?;
        drop(out);

        let copied = fs::metadata(&part).await.map_err(|e| map_io(e, &part))?.len();
        if copied != total {
            let _ = fs::remove_file(&part).await;
            return Err(TransportError::Transient(format!(
                "size mismatch after copy: {copied} of {total} bytes"
            )));
        }
        fs::rename(&part, &dest).await.map_err(|e| map_io(e, &dest))?;
        progress.report(total, Some(total));
        Ok(())
    }

    async fn test_connection(
        &self,
        credentials: &Credentials,
        directory: &str,
    ) -> Result<(), TransportError> {
        let root = self.ensure_mounted().await?;
        let dir = resolve(root, directory);
        fs::create_dir_all(&dir).await.map_err(|e| map_io(e, &dir))?;
        let probe = dir.join(PROBE_FILE);
        fs::write(&probe, b"ok").await.map_err(|e| map_io(e, &probe))?;
        fs::remove_file(&probe).await.map_err(|e| map_io(e, &probe))?;
        tracing::debug!(host = %credentials.host, share = %credentials.share, "share is writable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_stays_under_root() {
        let root = Path::new("/mnt/share");
        assert_eq!(
            resolve(root, "/youtube/abc_title.mp4"),
            PathBuf::from("/mnt/share/youtube/abc_title.mp4")
        );
        assert_eq!(resolve(root, "../../etc/passwd"), PathBuf::from("/mnt/share/etc/passwd"));
    }

    #[tokio::test]
    async fn upload_copies_and_verifies() {
        let local_dir = tempfile::tempdir().unwrap();
        let share = tempfile::tempdir().unwrap();
        let local = local_dir.path().join("abc.mp4");
        let payload = vec![7u8; CHUNK + 123];
        fs::write(&local, &payload).await.unwrap();

        let transport = MountedShareTransport::new(Some(share.path().to_path_buf()));
        transport
            .upload(
                &local,
                "/youtube/abc_title.mp4",
                &Credentials::default(),
                &ProgressReporter::detached(),
            )
            .await
            .unwrap();

        let copied = fs::read(share.path().join("youtube/abc_title.mp4")).await.unwrap();
        assert_eq!(copied, payload);
        assert!(!share.path().join("youtube/abc_title.mp4.part").exists());
    }

    #[tokio::test]
    async fn missing_mount_is_unreachable() {
        let share = tempfile::tempdir().unwrap();
        let transport = MountedShareTransport::new(Some(share.path().join("gone")));
        let err = transport
            .test_connection(&Credentials::default(), "/youtube")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));

        let unset = MountedShareTransport::new(None);
        let err = unset
            .test_connection(&Credentials::default(), "/youtube")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn connection_check_leaves_no_probe() {
        let share = tempfile::tempdir().unwrap();
        let transport = MountedShareTransport::new(Some(share.path().to_path_buf()));
        transport
            .test_connection(&Credentials::default(), "/youtube")
            .await
            .unwrap();
        assert!(share.path().join("youtube").is_dir());
        assert!(!share.path().join("youtube").join(PROBE_FILE).exists());
    }
}
