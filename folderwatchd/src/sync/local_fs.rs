use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use super::collaborators::{CollaboratorError, DiskFs};

/// `DiskFs` over the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDisk;

#[async_trait]
impl DiskFs for LocalDisk {
    async fn is_directory(&self, path: &str) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>, CollaboratorError> {
        let root = PathBuf::from(path);
        tokio::task::spawn_blocking(move || list_files_blocking(root))
            .await
            .map_err(|err| CollaboratorError::Io(std::io::Error::other(err)))?
    }
}

fn list_files_blocking(root: PathBuf) -> Result<Vec<String>, CollaboratorError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(CollaboratorError::Io(err.into())),
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().to_str() {
            Some(path) => files.push(path.to_string()),
            None => warn!(path = %entry.path().display(), "skipping non UTF-8 path"),
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_nested_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Trip/day1")).unwrap();
        std::fs::write(dir.path().join("Trip/a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("Trip/day1/b.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"h").unwrap();
        let root = dir.path().to_str().unwrap();

        let files = LocalDisk.list_files(root).await.unwrap();

        assert_eq!(
            files,
            vec![
                format!("{root}/.hidden"),
                format!("{root}/Trip/a.jpg"),
                format!("{root}/Trip/day1/b.jpg"),
            ]
        );
    }

    #[tokio::test]
    async fn directory_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(LocalDisk.is_directory(dir.path().to_str().unwrap()).await);
        assert!(!LocalDisk.is_directory(file.to_str().unwrap()).await);
        assert!(!LocalDisk.is_directory("/definitely/not/here").await);
        assert!(LocalDisk.list_files("/definitely/not/here").await.is_err());
    }
}
