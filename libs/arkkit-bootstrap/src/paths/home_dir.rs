use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("neither HOME nor USERPROFILE is set")]
    HomeMissing,
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn user_home() -> Result<PathBuf, HomeDirError> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| HomeDirError::HomeMissing)
}

/// Resolve the runtime home directory.
///
/// - `Some(path)`: a leading `~` expands to the user home; the result must be absolute.
/// - `None`: `<user home>/<default_subdir>`.
///
/// The directory is created when `create` is true. Theme preferences and log
/// files live below it.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = if raw == "~" {
                user_home()?
            } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
            {
                user_home()?.join(rest)
            } else {
                PathBuf::from(&raw)
            };
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into(),
                ));
            }
            expanded
        }
        None => Path::new(&user_home()?).join(default_subdir),
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}
