use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for data files (snapshots, locks, local cloud).
///
/// `SITESTACK_DATA` overrides the platform default.
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("SITESTACK_DATA") {
    return PathBuf::from(dir);
  }
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for data files (snapshots, locks, local cloud).
///
/// `SITESTACK_DATA` overrides the platform default.
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("SITESTACK_DATA") {
    return PathBuf::from(dir);
  }
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Directory holding per-stack state (snapshots and lock file).
pub fn stack_dir(stack: &str) -> PathBuf {
  data_dir().join("stacks").join(stack)
}

/// Root of the filesystem-backed local cloud.
///
/// `SITESTACK_ROOT` overrides the default of `<data_dir>/cloud`.
pub fn cloud_dir() -> PathBuf {
  std::env::var("SITESTACK_ROOT")
    .map(PathBuf::from)
    .unwrap_or_else(|_| data_dir().join("cloud"))
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn xdg_data_home_takes_precedence() {
    temp_env::with_vars(
      [
        ("SITESTACK_DATA", None::<&str>),
        ("XDG_DATA_HOME", Some("/custom/data")),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/custom/data").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn falls_back_to_home() {
    temp_env::with_vars(
      [
        ("SITESTACK_DATA", None::<&str>),
        ("XDG_DATA_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
        assert_eq!(
          stack_dir("dev"),
          PathBuf::from("/home/user/.local/share/sitestack/stacks/dev")
        );
      },
    );
  }

  #[test]
  #[serial]
  fn explicit_overrides_win() {
    temp_env::with_vars(
      [
        ("SITESTACK_DATA", Some("/tmp/state")),
        ("SITESTACK_ROOT", Some("/tmp/cloud")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/tmp/state"));
        assert_eq!(cloud_dir(), PathBuf::from("/tmp/cloud"));
      },
    );
  }

  #[test]
  #[serial]
  fn cloud_defaults_under_data_dir() {
    temp_env::with_vars(
      [("SITESTACK_DATA", Some("/tmp/state")), ("SITESTACK_ROOT", None::<&str>)],
      || {
        assert_eq!(cloud_dir(), PathBuf::from("/tmp/state/cloud"));
      },
    );
  }
}
