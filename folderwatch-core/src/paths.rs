use crate::mapping::FolderMapping;

/// Names that operating systems drop into folders on their own.
const SYSTEM_FILE_NAMES: [&str; 3] = ["thumbs.db", "desktop.ini", "icon\r"];

/// Last `/`-separated segment of `path`.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Name of the directory that directly contains `path`, if any.
pub fn parent_directory_name(path: &str) -> Option<&str> {
    let mut parts = path.rsplit('/');
    parts.next()?;
    parts.next().filter(|part| !part.is_empty())
}

pub fn is_hidden_file(path: &str) -> bool {
    file_name(path).starts_with('.')
}

pub fn is_system_file(path: &str) -> bool {
    let name = file_name(path);
    name.starts_with('.')
        || SYSTEM_FILE_NAMES
            .iter()
            .any(|system| name.eq_ignore_ascii_case(system))
}

/// True when `path` is strictly inside `dir` (component boundary aware).
pub fn is_within(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

pub fn mapping_for_path<'a>(mappings: &'a [FolderMapping], path: &str) -> Option<&'a FolderMapping> {
    mappings
        .iter()
        .find(|mapping| is_within(path, &mapping.folder_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_name_is_the_immediate_directory() {
        assert_eq!(parent_directory_name("/w/Trip/a.jpg"), Some("Trip"));
        assert_eq!(parent_directory_name("/w/a.jpg"), Some("w"));
        assert_eq!(parent_directory_name("/a.jpg"), None);
        assert_eq!(parent_directory_name("a.jpg"), None);
    }

    #[test]
    fn within_respects_component_boundaries() {
        assert!(is_within("/root/Trip/a.jpg", "/root/Trip"));
        assert!(is_within("/root/Trip/a.jpg", "/root/Trip/"));
        assert!(!is_within("/root/Trip2/a.jpg", "/root/Trip"));
        assert!(!is_within("/root/Trip", "/root/Trip"));
    }

    #[test]
    fn system_files_include_dotfiles_and_os_artifacts() {
        assert!(is_system_file("/w/.DS_Store"));
        assert!(is_system_file("/w/Thumbs.db"));
        assert!(is_system_file("/w/Desktop.ini"));
        assert!(!is_system_file("/w/photo.jpg"));
        assert!(is_hidden_file("/w/Trip/.hidden.png"));
        assert!(!is_hidden_file("/w/.Trip/visible.png"));
    }
}
