//! Database directory - the catalog of configured databases
//!
//! A flat ordered list of named entries persisted as a single JSON file
//! (`{"databases": [...]}`). The file is replaced wholesale by
//! administrative writes; there is no partial update and no merge. Lookups
//! by unknown name fail loudly - this layer never silently defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{OpenQueryError, Result};
use crate::store;
use crate::types::DatabaseConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    databases: Vec<DatabaseConfig>,
}

pub struct DatabaseDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DatabaseDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// All configured databases, in file order; a missing file is empty
    pub async fn list(&self) -> Result<Vec<DatabaseConfig>> {
        let file: DirectoryFile = store::read_json_or_default(&self.path).await?;
        Ok(file.databases)
    }

    /// Look up one database by name
    pub async fn get(&self, name: &str) -> Result<DatabaseConfig> {
        self.list()
            .await?
            .into_iter()
            .find(|db| db.name == name)
            .ok_or_else(|| OpenQueryError::UnknownDatabase(name.to_string()))
    }

    /// Replace the whole directory (atomic overwrite, no merge)
    pub async fn replace_all(&self, databases: Vec<DatabaseConfig>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        store::write_json_atomic(&self.path, &DirectoryFile { databases }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionConfig, Dialect};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn entry(name: &str) -> DatabaseConfig {
        DatabaseConfig {
            name: name.to_string(),
            description: format!("{} database", name),
            connection: ConnectionConfig {
                dialect: Dialect::Sqlite,
                params: BTreeMap::from([("database".to_string(), format!("{}.db", name))]),
            },
        }
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempdir().unwrap();
        let directory = DatabaseDirectory::new(dir.path().join("databases.json"));
        assert!(directory.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let directory = DatabaseDirectory::new(dir.path().join("databases.json"));

        directory
            .replace_all(vec![entry("inventory"), entry("sales")])
            .await
            .unwrap();

        let found = directory.get("sales").await.unwrap();
        assert_eq!(found.name, "sales");
        assert_eq!(directory.list().await.unwrap().len(), 2);

        // Replace is wholesale, not a merge
        directory.replace_all(vec![entry("hr")]).await.unwrap();
        let names: Vec<String> = directory
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|db| db.name)
            .collect();
        assert_eq!(names, vec!["hr"]);
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let dir = tempdir().unwrap();
        let directory = DatabaseDirectory::new(dir.path().join("databases.json"));
        directory.replace_all(vec![entry("inventory")]).await.unwrap();

        let err = directory.get("ghosts").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::UnknownDatabase(n) if n == "ghosts"));
    }
}
