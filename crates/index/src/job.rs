use std::path::PathBuf;
use tome_storage::{FileRef, path_segments};

/// One file waiting to be processed by one content kind.
#[derive(Debug, Clone)]
pub struct ContentJob<S> {
    pub file: FileRef,
    /// Folder names leading to the file, outermost first.
    pub path_segments: Vec<String>,
    /// Reprocess even when the cached stamp matches the file.
    pub force: bool,
    /// Whatever the strategy worked out while deciding whether to process
    /// the file, handed on to the processing step.
    pub scratch: S,
}
impl<S: Default> ContentJob<S> {
    pub fn new(file: FileRef, force: bool) -> Self {
        let path_segments = path_segments(&file.path);
        Self { file, path_segments, force, scratch: S::default() }
    }
}
impl<S> ContentJob<S> {
    pub fn path(&self) -> &PathBuf {
        &self.file.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        let job: ContentJob<()> = ContentJob::new(FileRef::new("Projects/2024/Plan.md", 1, 1), false);
        assert_eq!(job.path_segments, vec!["Projects", "2024"]);
        let job: ContentJob<()> = ContentJob::new(FileRef::new("Inbox.md", 1, 1), true);
        assert!(job.path_segments.is_empty());
        assert!(job.force);
    }
}
