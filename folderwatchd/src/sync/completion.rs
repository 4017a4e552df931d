use std::collections::{HashMap, HashSet};

use folderwatch_core::{LocalFile, RemoteFile, SyncedFile, UploadItem, UploadOutcome};
use tracing::{debug, warn};

/// Per-batch bookkeeping of what the upload pipeline has reported so far.
#[derive(Debug, Default)]
pub struct UploadTracker {
    uploaded: HashMap<String, RemoteFile>,
    unuploadable: HashSet<String>,
    live_photo_partner: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classification {
    pub synced: Vec<SyncedFile>,
    pub ignored: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty() && self.ignored.is_empty()
    }
}

enum Landing {
    Synced(RemoteFile),
    Ignored,
}

impl UploadTracker {
    pub fn record(&mut self, outcome: UploadOutcome, item: &UploadItem, remote: Option<RemoteFile>) {
        if let UploadItem::LivePhoto { image, video } = item {
            self.live_photo_partner.insert(image.clone(), video.clone());
            self.live_photo_partner.insert(video.clone(), image.clone());
        }

        if outcome.is_success() {
            let Some(remote) = remote else {
                warn!(outcome = outcome.as_str(), paths = ?item.paths(), "success reported without remote file");
                return;
            };
            for path in item.paths() {
                self.unuploadable.remove(path);
                self.uploaded.insert(path.to_string(), remote);
            }
        } else if outcome.is_unuploadable() {
            for path in item.paths() {
                self.uploaded.remove(path);
                self.unuploadable.insert(path.to_string());
            }
        } else {
            debug!(outcome = outcome.as_str(), paths = ?item.paths(), "outcome leaves files unclassified");
        }
    }

    /// Sorts batch files into synced and ignored. A live photo half only lands
    /// when its partner landed in the same place; anything else is left out.
    pub fn classify(&self, files: &[LocalFile]) -> Classification {
        let mut out = Classification::default();
        for file in files {
            let Some(landing) = self.landing(&file.path) else {
                continue;
            };
            if let Some(partner) = self.live_photo_partner.get(&file.path) {
                let partner_matches = matches!(
                    (&landing, self.landing(partner)),
                    (Landing::Synced(_), Some(Landing::Synced(_)))
                        | (Landing::Ignored, Some(Landing::Ignored))
                );
                if !partner_matches {
                    debug!(path = %file.path, partner = %partner, "live photo pair not settled");
                    continue;
                }
            }
            match landing {
                Landing::Synced(remote) => out.synced.push(SyncedFile {
                    path: file.path.clone(),
                    uploaded_file_id: remote.id,
                    collection_id: remote.collection_id,
                }),
                Landing::Ignored => out.ignored.push(file.path.clone()),
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.uploaded.clear();
        self.unuploadable.clear();
        self.live_photo_partner.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty() && self.unuploadable.is_empty()
    }

    fn landing(&self, path: &str) -> Option<Landing> {
        if let Some(remote) = self.uploaded.get(path) {
            return Some(Landing::Synced(*remote));
        }
        self.unuploadable.contains(path).then_some(Landing::Ignored)
    }
}
