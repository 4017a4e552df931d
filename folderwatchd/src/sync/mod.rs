pub mod collaborators;
pub mod completion;
pub mod debounce;
pub mod engine;
pub mod local_fs;
pub mod local_watcher;
pub mod mapping_store;
pub mod queue;
pub mod reconciler;
pub mod trash;

#[cfg(test)]
pub(crate) mod test_support;
