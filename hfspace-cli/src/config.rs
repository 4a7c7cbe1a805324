use directories::ProjectDirs;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, ser::SerializeMap};
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No home directory found")]
    NoHomeDir,

    #[error("Failed to create directory: {0}")]
    CreateDir(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "hfspace", "hfspace-cli").ok_or(ConfigError::NoHomeDir)
}

fn ensure_dir(dir: &Path) -> ConfigResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(e.to_string()))?;
    }
    Ok(())
}

/// Directory holding the favorites file and the results database.
///
/// `--data-dir` wins; otherwise the platform data directory is used.
pub fn resolve_data_dir(data_dir: Option<&Path>) -> ConfigResult<PathBuf> {
    let dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => project_dirs()?.data_dir().to_path_buf(),
    };
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Hugging Face credentials
/// Supported sources(in order of precedence):
/// - CLI arguments(by clap)
/// - Environment variables(by clap)
/// - Dot-env file(by clap and dotenv)
/// - Credentials file
///   - Support Store and Load
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Access token, empty when browsing public Spaces anonymously
    #[serde(default = "empty_secret")]
    pub hf_token: SecretString,

    /// Hub endpoint, when set explicitly. Unset leaves the client config's value.
    #[serde(default)]
    pub hub_url: Option<String>,

    // for internal use
    #[serde(skip)]
    credentials_dir: Option<String>,
}

/// Masks all but the last four characters.
pub fn partial_show_secret(s: &SecretString) -> String {
    let chars = s.expose_secret().chars();
    if chars.clone().count() <= 4 {
        "**************************".to_string()
    } else {
        let last_4 = chars.rev().take(4).collect::<String>();
        format!(
            "**********************{}",
            last_4.chars().rev().collect::<String>()
        )
    }
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("hf_token", &self.hf_token.expose_secret())?;
        if let Some(hub_url) = &self.hub_url {
            map.serialize_entry("hub_url", hub_url)?;
        }
        map.end()
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(Box::default())
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            hf_token: empty_secret(),
            hub_url: None,
            credentials_dir: None,
        }
    }
}

impl Credentials {
    pub fn new(credentials_dir: String) -> Self {
        Self {
            credentials_dir: Some(credentials_dir),
            ..Default::default()
        }
    }

    /// Layers explicit values over whatever the credentials file holds.
    pub fn initialize(
        credentials_dir: Option<String>,
        hub_url: Option<String>,
        token: Option<String>,
    ) -> Self {
        let mut credentials = match credentials_dir {
            Some(dir) => Credentials::new(dir),
            None => Credentials::default(),
        };
        if let Err(e) = credentials.load_credentials() {
            tracing::debug!("No stored credentials loaded: {}", e);
        }

        if let Some(url) = hub_url.filter(|u| !u.is_empty()) {
            credentials.hub_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            credentials.hf_token = SecretString::new(Box::from(token));
        }
        credentials
    }

    /// Token to send, if one is configured.
    pub fn token(&self) -> Option<SecretString> {
        if self.hf_token.expose_secret().is_empty() {
            None
        } else {
            Some(self.hf_token.clone())
        }
    }

    /// Get the credentials file path in the user's config directory
    pub fn get_credentials_file_path(&self) -> ConfigResult<PathBuf> {
        let dir = match &self.credentials_dir {
            Some(parent) => PathBuf::from(parent),
            None => project_dirs()?.config_dir().to_path_buf(),
        };
        ensure_dir(&dir)?;
        Ok(dir.join("credentials.json"))
    }

    pub fn load_credentials(&mut self) -> ConfigResult<Credentials> {
        let file_path = self.get_credentials_file_path()?;
        if file_path.exists() {
            let mut file = File::open(&file_path)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let credentials: Self = serde_json::from_str(&contents)?;
            self.hf_token = credentials.hf_token;
            if credentials.hub_url.is_some() {
                self.hub_url = credentials.hub_url;
            }
        }

        Ok(self.clone())
    }

    pub fn save_credentials(&self) -> ConfigResult<PathBuf> {
        let file_path = self.get_credentials_file_path()?;
        let json = serde_json::to_string_pretty(self)?;

        let mut file = File::create(&file_path)?;
        file.write_all(json.as_bytes())?;

        Ok(file_path)
    }
}
