use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use jwalk::WalkDir;

use crate::format::ObjectInArchive;
use crate::{ParzError, Result};

/// Builds the object list for a compress or append run.
///
/// A file becomes one object named after the file. A directory contributes
/// every regular file below it as `<dir name>/<relative path>`. Each source's
/// objects are sorted, and a file reached twice is only listed once.
pub fn collect_objects(sources: &[PathBuf]) -> Result<Vec<ObjectInArchive>> {
    let mut seen = HashSet::new();
    let mut objects = Vec::new();

    for source in sources {
        let metadata = fs::metadata(source).map_err(|_| {
            ParzError::validation(format!("Path \"{}\" does not exist.", source.display()))
        })?;

        let mut found = if metadata.is_dir() {
            walk_directory(source)?
        } else {
            let name = file_name(source)?;
            vec![ObjectInArchive::from_source(name, source.clone(), metadata.len())]
        };
        found.sort_by(|left, right| left.inside_path.cmp(&right.inside_path));

        for object in found {
            let key = fs::canonicalize(&object.original_path)
                .unwrap_or_else(|_| object.original_path.clone());
            if seen.insert(key) {
                objects.push(object);
            }
        }
    }

    Ok(objects)
}

fn walk_directory(root: &Path) -> Result<Vec<ObjectInArchive>> {
    let prefix = match root.file_name() {
        Some(name) => Some(path_to_utf8(Path::new(name))?),
        None => fs::canonicalize(root)
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned())),
    };

    let mut objects = Vec::new();
    for entry in WalkDir::new(root).sort(true) {
        let entry = entry.map_err(anyhow::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| ParzError::InvalidFormat("walked path is outside its root"))?;
        let relative = path_to_utf8(relative)?;
        let inside_path = match &prefix {
            Some(prefix) => format!("{prefix}/{relative}"),
            None => relative,
        };
        let size = fs::metadata(&path)?.len();
        objects.push(ObjectInArchive::from_source(
            normalize_inside_path(&inside_path),
            path,
            size,
        ));
    }
    Ok(objects)
}

fn file_name(path: &Path) -> Result<String> {
    let name = path.file_name().ok_or_else(|| {
        ParzError::validation(format!("Path \"{}\" has no file name.", path.display()))
    })?;
    path_to_utf8(Path::new(name))
}

fn path_to_utf8(path: &Path) -> Result<String> {
    path.to_str()
        .map(|raw| raw.replace('\\', "/"))
        .ok_or_else(|| ParzError::validation(format!("Path \"{}\" is not valid UTF-8.", path.display())))
}

/// Strips leading separators and turns `\` into `/`.
pub fn normalize_inside_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Joins a normalized inside path under `root`, rejecting paths that would
/// escape it.
pub(crate) fn join_inside_path(root: &Path, inside_path: &str) -> Result<PathBuf> {
    let normalized = normalize_inside_path(inside_path);
    let relative = Path::new(&normalized);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ParzError::validation(format!(
            "Inside path \"{inside_path}\" cannot be restored safely."
        )));
    }
    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_inside_path("\\dir\\a.txt"), "dir/a.txt");
        assert_eq!(normalize_inside_path("//a"), "a");
        assert_eq!(normalize_inside_path("plain"), "plain");
    }

    #[test]
    fn directories_are_walked_with_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("nested")).expect("mkdir");
        fs::write(root.join("b.txt"), b"bb").expect("write");
        fs::write(root.join("nested").join("a.txt"), b"a").expect("write");
        let single = dir.path().join("single.bin");
        fs::write(&single, b"xyz").expect("write");

        let objects =
            collect_objects(&[root.clone(), single.clone(), root.join("b.txt")]).expect("collect");
        let names: Vec<&str> = objects
            .iter()
            .map(|object| object.inside_path.as_str())
            .collect();
        assert_eq!(names, vec!["data/b.txt", "data/nested/a.txt", "single.bin"]);
        assert_eq!(objects[2].original_size, 3);
    }

    #[test]
    fn missing_source_is_a_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let error = collect_objects(&[missing]).expect_err("missing");
        assert!(error.to_string().ends_with("does not exist."));
    }

    #[test]
    fn escaping_paths_are_refused() {
        let root = Path::new("out");
        assert_eq!(
            join_inside_path(root, "\\a\\b.txt").expect("join"),
            root.join("a/b.txt")
        );
        assert!(join_inside_path(root, "../etc/passwd").is_err());
    }
}
