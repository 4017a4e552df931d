mod mapping;
mod paths;
mod upload;

pub use mapping::{
    CollectionNameError, FolderMapping, InvalidStrategy, SyncedFile, UploadStrategy, collection_name_for,
};
pub use paths::{
    file_name, is_hidden_file, is_system_file, is_within, mapping_for_path, parent_directory_name,
};
pub use upload::{FileWithCollection, LocalFile, RemoteFile, UploadItem, UploadOutcome};
