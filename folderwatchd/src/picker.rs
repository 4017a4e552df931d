use ashpd::desktop::ResponseError;
use ashpd::desktop::file_chooser::SelectedFiles;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::sync::collaborators::{CollaboratorError, FolderPicker};

/// Folder selection through the XDG desktop portal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortalFolderPicker;

#[async_trait]
impl FolderPicker for PortalFolderPicker {
    async fn select_directory(&self) -> Result<Option<String>, CollaboratorError> {
        let request = SelectedFiles::open_file()
            .title("Choose a folder to watch")
            .modal(true)
            .multiple(false)
            .directory(true)
            .send()
            .await
            .map_err(portal_error)?;
        let selected = match request.response() {
            Ok(selected) => selected,
            Err(ashpd::Error::Response(ResponseError::Cancelled)) => {
                debug!("folder selection cancelled");
                return Ok(None);
            }
            Err(err) => return Err(portal_error(err)),
        };
        Ok(selected
            .uris()
            .iter()
            .find_map(|uri| uri_to_folder_path(uri.as_str())))
    }
}

fn portal_error(err: ashpd::Error) -> CollaboratorError {
    CollaboratorError::Remote(format!("file chooser portal: {err}"))
}

fn uri_to_folder_path(uri: &str) -> Option<String> {
    let path = Url::parse(uri).ok()?.to_file_path().ok()?;
    path.to_str().map(str::to_string)
}
