use serde::{Deserialize, Serialize};

/// A file found on disk that may be handed to the upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: String,
}

impl LocalFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Identity assigned by the remote side once a file has been uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: i64,
    pub collection_id: i64,
}

/// Result reported by the upload pipeline for one logical item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded,
    UploadedWithStaticThumbnail,
    AlreadyUploaded,
    AddedSymlink,
    Unsupported,
    TooLarge,
    Failed,
    Blocked,
    Cancelled,
    LargerThanAvailableStorage,
}

impl UploadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadOutcome::Uploaded => "uploaded",
            UploadOutcome::UploadedWithStaticThumbnail => "uploaded_with_static_thumbnail",
            UploadOutcome::AlreadyUploaded => "already_uploaded",
            UploadOutcome::AddedSymlink => "added_symlink",
            UploadOutcome::Unsupported => "unsupported",
            UploadOutcome::TooLarge => "too_large",
            UploadOutcome::Failed => "failed",
            UploadOutcome::Blocked => "blocked",
            UploadOutcome::Cancelled => "cancelled",
            UploadOutcome::LargerThanAvailableStorage => "larger_than_available_storage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let outcome = match value {
            "uploaded" => UploadOutcome::Uploaded,
            "uploaded_with_static_thumbnail" => UploadOutcome::UploadedWithStaticThumbnail,
            "already_uploaded" => UploadOutcome::AlreadyUploaded,
            "added_symlink" => UploadOutcome::AddedSymlink,
            "unsupported" => UploadOutcome::Unsupported,
            "too_large" => UploadOutcome::TooLarge,
            "failed" => UploadOutcome::Failed,
            "blocked" => UploadOutcome::Blocked,
            "cancelled" => UploadOutcome::Cancelled,
            "larger_than_available_storage" => UploadOutcome::LargerThanAvailableStorage,
            _ => return None,
        };
        Some(outcome)
    }

    /// The file now exists remotely and counts as synced.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            UploadOutcome::Uploaded
                | UploadOutcome::UploadedWithStaticThumbnail
                | UploadOutcome::AlreadyUploaded
                | UploadOutcome::AddedSymlink
        )
    }

    /// The file can never be uploaded and must not be retried.
    pub fn is_unuploadable(&self) -> bool {
        matches!(self, UploadOutcome::Unsupported | UploadOutcome::TooLarge)
    }
}

/// One logical upload unit. Live photos travel as an image/video pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadItem {
    File { path: String },
    LivePhoto { image: String, video: String },
}

impl UploadItem {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            UploadItem::File { path } => vec![path.as_str()],
            UploadItem::LivePhoto { image, video } => vec![image.as_str(), video.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWithCollection {
    pub collection_id: i64,
    #[serde(flatten)]
    pub item: UploadItem,
}
