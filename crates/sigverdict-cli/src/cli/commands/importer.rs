//! Key importer that stores fetched keys as `<KEYID>.asc` files.

use std::path::PathBuf;

use async_trait::async_trait;
use sigverdict_keyserver::{KeyImporter, KeyServerError, KeyServerResult};

/// Writes every imported key to its own armored file in `dir`.
#[derive(Debug, Clone)]
pub struct DirectoryImporter {
    dir: PathBuf,
}

impl DirectoryImporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn target(&self, key_id: &str) -> KeyServerResult<PathBuf> {
        let id = key_id.trim_start_matches("0x").trim_start_matches("0X");
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(KeyServerError::Import {
                key_id: key_id.to_string(),
                message: "key id is not hexadecimal".to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.asc", id.to_ascii_uppercase())))
    }
}

#[async_trait]
impl KeyImporter for DirectoryImporter {
    async fn import_key(&self, key_id: &str, armored: &str) -> KeyServerResult<()> {
        let path = self.target(key_id)?;
        let io_err = |e: std::io::Error| KeyServerError::Import {
            key_id: key_id.to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, armored).await.map_err(io_err)?;
        tracing::debug!(key_id = %key_id, path = %path.display(), "key written");
        Ok(())
    }
}
