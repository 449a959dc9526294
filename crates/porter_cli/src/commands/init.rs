use std::path::Path;

use crate::config::example_config;

/// Write the example configuration to `path`.
///
/// An existing file is left alone unless `force` is set.
pub(crate) fn handle_init(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, example_config())?;

    println!("Wrote example configuration to {}", path.display());
    println!("Fill in the YOUR_... values, then run: porter run");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_example_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("porter.toml");

        handle_init(&path, false).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, example_config());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("porter.toml");
        std::fs::write(&path, "[source]\ntoken = \"keep\"\n").unwrap();

        let err = handle_init(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("keep"));

        handle_init(&path, true).unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("keep"));
    }
}
