use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "NASSYNC_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Picks the explicit path if given, else `NASSYNC_CONFIG`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .ok_or(ConfigError::MissingPath(CONFIG_ENV_VAR))
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let nas = &config.nas;
    if nas.host.trim().is_empty() {
        return Err(invalid("nas.host must not be empty"));
    }
    if nas.username.trim().is_empty() {
        return Err(invalid("nas.username must not be empty"));
    }
    if nas.port == 0 {
        return Err(invalid("nas.port must be greater than 0"));
    }
    if nas.scheme != "http" && nas.scheme != "https" {
        return Err(invalid(format!(
            "nas.scheme must be 'http' or 'https', got '{}'",
            nas.scheme
        )));
    }
    if !nas.base_path.starts_with('/') {
        return Err(invalid(format!(
            "nas.basePath must be an absolute share path, got '{}'",
            nas.base_path
        )));
    }
    if !crate::secrets::has_secret_source(
        nas.password.as_deref(),
        nas.password_file.as_deref(),
        nas.password_env_var.as_deref(),
    ) {
        return Err(invalid(
            "nas needs one of password, passwordFile or passwordEnvVar",
        ));
    }
    if nas.page_size == 0 {
        return Err(invalid("nas.pageSize must be greater than 0"));
    }

    validate_endpoint("upload.jsonEndpoint", &config.upload.json_endpoint)?;
    if let Some(form) = &config.upload.form_endpoint {
        validate_endpoint("upload.formEndpoint", form)?;
    }

    for (name, value) in [
        ("nas.requestTimeoutSecs", nas.request_timeout_secs),
        ("nas.downloadTimeoutSecs", nas.download_timeout_secs),
        ("upload.jsonTimeoutSecs", config.upload.json_timeout_secs),
        ("upload.formTimeoutSecs", config.upload.form_timeout_secs),
        ("sync.itemTimeoutSecs", config.sync.item_timeout_secs),
    ] {
        if value == 0 {
            return Err(invalid(format!("{} must be greater than 0", name)));
        }
    }

    if config.storage.download_dir.as_os_str().is_empty() {
        return Err(invalid("storage.downloadDir must not be empty"));
    }

    Ok(())
}

fn validate_endpoint(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| invalid(format!("{} is not a valid URL ({}): {}", name, e, value)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!(
            "{} must use http or https, got '{}'",
            name, other
        ))),
    }
}
