//! Where the CLI looks for the message store and the curated tables.

use std::path::PathBuf;

pub struct MailnetPaths {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub curation_path: PathBuf,
}

impl MailnetPaths {
    /// `MAILNET_DATA_DIR`, else the platform data directory, else `.mailnet`.
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os("MAILNET_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| {
                directories::ProjectDirs::from("org", "mailnet", "mailnet")
                    .map(|d| d.data_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from(".mailnet"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("mailnet.db"),
            curation_path: data_dir.join("curation.toml"),
            data_dir,
        }
    }

    pub fn with_overrides(mut self, db: Option<PathBuf>, curation: Option<PathBuf>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(curation) = curation {
            self.curation_path = curation;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_paths() {
        let paths = MailnetPaths::at(PathBuf::from("/data"))
            .with_overrides(Some(PathBuf::from("/tmp/other.db")), None);
        assert_eq!(paths.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(paths.curation_path, PathBuf::from("/data/curation.toml"));
        assert_eq!(paths.data_dir, PathBuf::from("/data"));
    }
}
