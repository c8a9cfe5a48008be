use anyhow::{Context, Result, bail};
use cookbook_core::db::{DEFAULT_COLLECTION, validate_collection_name};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::{debug, info};

const CONNECTION_VAR: &str = "COOKBOOK_CONNECTION";
const DATABASE_VAR: &str = "COOKBOOK_DATABASE";
const COLLECTION_VAR: &str = "COOKBOOK_COLLECTION";
const ROUTE_PREFIX_VAR: &str = "COOKBOOK_ROUTE_PREFIX";

const DEFAULT_DATABASE: &str = "Cookbook";
const DEFAULT_ROUTE_PREFIX: &str = "api";

pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub collection: String,
    /// Either empty or a single leading-slash segment such as `/api`.
    pub route_prefix: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "cookbook").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_vars(data_dir, |key| std::env::var(key).ok())
    }

    fn from_vars(data_dir: PathBuf, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let setting = |key: &str, default: &str| {
            var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| {
                    debug!("{key} not set, using default: {default}");
                    default.to_string()
                })
        };

        let database = setting(DATABASE_VAR, DEFAULT_DATABASE);
        if database.contains(['/', '\\']) || database.starts_with('.') {
            bail!("Invalid database name '{database}'. It must be a plain file name");
        }

        let collection = setting(COLLECTION_VAR, DEFAULT_COLLECTION);
        validate_collection_name(&collection)?;

        let db_path = var(CONNECTION_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| data_dir.join(format!("{database}.db")), PathBuf::from);

        // An explicitly empty prefix mounts routes at the root.
        let route_prefix = normalize_prefix(
            &var(ROUTE_PREFIX_VAR).unwrap_or_else(|| DEFAULT_ROUTE_PREFIX.to_string()),
        );

        Ok(Config {
            data_dir,
            db_path,
            collection,
            route_prefix,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        info!(path = %path.display(), "Generated new API key: {key}");
        info!("Include in requests: x-functions-key: {key}");
        Ok((key, true))
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
