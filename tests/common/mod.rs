//! Shared setup for integration tests.

#![allow(dead_code)]

use db_fixture::{Config, DbModule, TestCase};
use std::path::PathBuf;
use tempfile::TempDir;

pub const SQLITE_DUMP: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/_data/sqlite_dump.sql");

/// Install a subscriber so `RUST_LOG=db_fixture=debug` shows engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A populated SQLite database in a temporary directory.
pub struct SqliteSuite {
    pub module: DbModule,
    pub db_path: PathBuf,
    _dir: TempDir,
}

impl SqliteSuite {
    pub fn dsn(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}

/// Base configuration: populate from the dump and reload between tests.
pub fn sqlite_config(db_path: &std::path::Path) -> Config {
    Config::new(format!("sqlite:{}", db_path.display()))
        .with_populate(true)
        .with_cleanup(true)
        .with_dump(SQLITE_DUMP)
}

/// Run the suite hooks and the first test's `before`, as a runner would.
pub async fn sqlite_suite() -> SqliteSuite {
    sqlite_suite_with(|config| config).await
}

pub async fn sqlite_suite_with(customize: impl FnOnce(Config) -> Config) -> SqliteSuite {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("suite.db");

    let mut module = DbModule::new(customize(sqlite_config(&db_path))).unwrap();
    module.before_suite().await.unwrap();
    module.before(&TestCase::passed("setup")).await.unwrap();
    assert!(module.is_populated());

    SqliteSuite {
        module,
        db_path,
        _dir: dir,
    }
}

/// Finish a test the way a runner would: `after` then `before` of the next one.
pub async fn next_test(module: &mut DbModule, name: &str) {
    module.after(&TestCase::passed(name)).await.unwrap();
    module.before(&TestCase::passed(name)).await.unwrap();
}
