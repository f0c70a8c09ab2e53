use std::path::{Path, PathBuf};

use crate::format::{ArchiveMetadata, ObjectInArchive};
use crate::{ParzError, Result};

use super::objects::join_inside_path;

/// Which archive objects a decompress run restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecompressSelection {
    AllFiles,
    MultipleFiles(Vec<String>),
    /// One object; `None` is only valid for single-object archives.
    SingleFile(Option<String>),
}

impl DecompressSelection {
    /// Derives the selection from the target path and requested inside paths.
    pub fn from_request(target: &Path, inside_paths: &[String]) -> Result<Self> {
        let target_is_dir = target.is_dir();
        match inside_paths {
            [] if target_is_dir => Ok(Self::AllFiles),
            [_, _, ..] if target_is_dir => Ok(Self::MultipleFiles(inside_paths.to_vec())),
            [] => Ok(Self::SingleFile(None)),
            [single] => Ok(Self::SingleFile(Some(single.clone()))),
            _ => Err(ParzError::validation(format!(
                "Target \"{}\" must be an existing directory to decompress multiple files.",
                target.display()
            ))),
        }
    }

    /// Picks the objects to restore and the path each one is written to.
    ///
    /// Requested paths missing from the archive are ignored.
    pub fn resolve(
        &self,
        metadata: &ArchiveMetadata,
        target: &Path,
    ) -> Result<Vec<(ObjectInArchive, PathBuf)>> {
        if metadata.is_empty() {
            return Err(ParzError::validation("There are no files in archive."));
        }

        let chosen: Vec<&ObjectInArchive> = match self {
            Self::AllFiles => metadata.objects.iter().collect(),
            Self::MultipleFiles(paths) => paths
                .iter()
                .filter_map(|path| metadata.find(path))
                .collect(),
            Self::SingleFile(Some(path)) => metadata.find(path).into_iter().collect(),
            Self::SingleFile(None) => match metadata.objects.as_slice() {
                [only] => vec![only],
                _ => {
                    return Err(ParzError::validation(
                        "Archive contains multiple files. Specify internal file path.",
                    ));
                }
            },
        };

        chosen
            .into_iter()
            .map(|object| {
                let output = match self {
                    Self::SingleFile(_) if !target.is_dir() => target.to_path_buf(),
                    _ => join_inside_path(target, &object.inside_path)?,
                };
                let mut object = object.clone();
                object.original_path = output.clone();
                Ok((object, output))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(paths: &[&str]) -> ArchiveMetadata {
        let mut metadata = ArchiveMetadata::new(1024);
        for (index, path) in paths.iter().enumerate() {
            metadata.objects.push(ObjectInArchive {
                inside_path: path.to_string(),
                header_offset: 28 + index as u64 * 100,
                data_offset: 60 + index as u64 * 100,
                ..ObjectInArchive::default()
            });
        }
        metadata
    }

    #[test]
    fn selection_follows_target_and_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_target = dir.path().join("out.bin");
        let paths = vec!["a".to_string(), "b".to_string()];

        assert_eq!(
            DecompressSelection::from_request(dir.path(), &[]).expect("all"),
            DecompressSelection::AllFiles
        );
        assert_eq!(
            DecompressSelection::from_request(dir.path(), &paths).expect("multiple"),
            DecompressSelection::MultipleFiles(paths.clone())
        );
        assert_eq!(
            DecompressSelection::from_request(&file_target, &paths[..1]).expect("single"),
            DecompressSelection::SingleFile(Some("a".to_string()))
        );
        assert!(DecompressSelection::from_request(&file_target, &paths).is_err());
    }

    #[test]
    fn resolve_maps_output_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let meta = metadata(&["x/a.txt", "b.txt"]);

        let all = DecompressSelection::AllFiles
            .resolve(&meta, dir.path())
            .expect("resolve");
        assert_eq!(all[0].1, dir.path().join("x/a.txt"));
        assert_eq!(all[1].1, dir.path().join("b.txt"));

        let file_target = dir.path().join("restored.txt");
        let single = DecompressSelection::SingleFile(Some("b.txt".to_string()))
            .resolve(&meta, &file_target)
            .expect("resolve");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].1, file_target);

        let missing = DecompressSelection::MultipleFiles(vec!["nope".to_string()])
            .resolve(&meta, dir.path())
            .expect("resolve");
        assert!(missing.is_empty());
    }

    #[test]
    fn ambiguous_or_empty_archives_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out");
        let error = DecompressSelection::SingleFile(None)
            .resolve(&metadata(&["a", "b"]), &target)
            .expect_err("ambiguous");
        assert_eq!(
            error.to_string(),
            "Archive contains multiple files. Specify internal file path."
        );
        assert!(
            DecompressSelection::AllFiles
                .resolve(&metadata(&[]), dir.path())
                .is_err()
        );

        let only = DecompressSelection::SingleFile(None)
            .resolve(&metadata(&["solo"]), &target)
            .expect("single object");
        assert_eq!(only[0].1, target);
    }
}
