//! Dataset loading.
//!
//! A populator is either a shell command (the usual choice for big dumps
//! loaded with the database's own client) or an async callback. Without one,
//! the configured dump file is split and executed through the driver.

use crate::config::Config;
use crate::db::Driver;
use crate::error::{DbError, DbResult};
use crate::fixture::dump;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Async seeding function run against the suite's driver.
pub type PopulateFn =
    Arc<dyn for<'a> Fn(&'a Driver) -> BoxFuture<'a, DbResult<()>> + Send + Sync>;

#[derive(Clone)]
pub enum Populator {
    /// Shell command run through `sh -c`.
    ///
    /// `$dsn`, `$user`, `$password`, `$dump`, `$host`, `$port` and `$dbname`
    /// are replaced before execution.
    Command(String),
    Callback(PopulateFn),
}

impl Populator {
    pub fn command(command: impl Into<String>) -> Self {
        Self::Command(command.into())
    }

    /// Wrap an async function as a populator.
    ///
    /// ```
    /// use db_fixture::fixture::Populator;
    ///
    /// let populator = Populator::callback(|driver| {
    ///     Box::pin(async move {
    ///         driver.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[]).await?;
    ///         Ok(())
    ///     })
    /// });
    /// # let _ = populator;
    /// ```
    pub fn callback<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Driver) -> BoxFuture<'a, DbResult<()>> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }
}

impl std::fmt::Debug for Populator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Self::Callback(_) => f.debug_tuple("Callback").field(&"<fn>").finish(),
        }
    }
}

/// Config files can only name a command.
impl<'de> Deserialize<'de> for Populator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Command)
    }
}

/// Load the dataset using whichever source the configuration names.
pub async fn populate(config: &Config, driver: &Driver) -> DbResult<()> {
    match (&config.populator, &config.dump) {
        (Some(Populator::Command(template)), _) => run_command(template, config).await,
        (Some(Populator::Callback(f)), _) => {
            info!("Running populator callback");
            f(driver).await.map_err(into_populator_error)
        }
        (None, Some(path)) => {
            let statements = dump::read_statements(path).await?;
            info!(
                dump = %path.display(),
                statements = statements.len(),
                "Loading dump"
            );
            driver
                .load_statements(&statements)
                .await
                .map_err(|e| DbError::populator(format!("{}: {}", path.display(), e)))?;
            Ok(())
        }
        (None, None) => Err(DbError::invalid_input(
            "populate is enabled but neither a populator nor a dump is configured",
        )),
    }
}

fn into_populator_error(err: DbError) -> DbError {
    match err {
        DbError::Populator { .. } => err,
        other => DbError::populator(other.to_string()),
    }
}

async fn run_command(template: &str, config: &Config) -> DbResult<()> {
    info!(command = %template, "Running populator command");
    let command = substitute_placeholders(template, config);

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .output()
        .await
        .map_err(|e| DbError::populator(format!("Cannot spawn populator: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        return Err(DbError::populator(format!(
            "command exited with {}: {}",
            code,
            stderr.trim()
        )));
    }

    debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Populator finished");
    Ok(())
}

/// Replace `$name` placeholders with values from the configuration.
fn substitute_placeholders(template: &str, config: &Config) -> String {
    let url = Url::parse(&config.dsn).ok();
    let user = config.user.clone().or_else(|| {
        url.as_ref()
            .map(|u| u.username().to_string())
            .filter(|u| !u.is_empty())
    });
    let password = config
        .password
        .clone()
        .or_else(|| url.as_ref().and_then(|u| u.password().map(String::from)));
    let parts = config.dsn_parts();

    let values = [
        ("$dsn", Some(config.dsn.clone())),
        ("$user", user),
        ("$password", password),
        (
            "$dump",
            config.dump.as_ref().map(|p| p.display().to_string()),
        ),
        ("$host", parts.host),
        ("$port", parts.port.map(|p| p.to_string())),
        ("$dbname", parts.dbname),
    ];

    values
        .into_iter()
        .fold(template.to_string(), |acc, (placeholder, value)| {
            acc.replace(placeholder, value.as_deref().unwrap_or_default())
        })
}
