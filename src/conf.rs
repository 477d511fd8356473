use crate::cv::DEFAULT_CLASSES;
use crate::stats::{DEFAULT_HISTORY_CAP, DEFAULT_SNAPSHOT_INTERVAL, StateConfig};
use crate::store::NewUser;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const APP_NAME: &str = "lookout";
pub const SECRET_ENV: &str = "JWT_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConf {
	/// Caffe 'deploy' prototxt file
	pub proto: String,
	pub model: String,
	pub confidence: f32,
}

impl Default for ModelConf {
	fn default() -> Self {
		Self {
			proto: "mobilenet_ssd/MobileNetSSD_deploy.prototxt".into(),
			model: "mobilenet_ssd/MobileNetSSD_deploy.caffemodel".into(),
			confidence: 0.5,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
	pub version: u8,
	pub bind: String,
	pub jwt_secret: Option<String>,
	/// Set the `Secure` attribute on the session cookie
	pub secure_cookies: bool,
	pub log_level: String,
	pub history_cap: usize,
	pub snapshot_interval_ms: u64,
	pub default_classes: Vec<String>,
	pub seed_users: Vec<NewUser>,
	pub model: ModelConf,
}

impl Default for Conf {
	fn default() -> Self {
		Self {
			version: 0,
			bind: "127.0.0.1:3000".into(),
			jwt_secret: None,
			secure_cookies: true,
			log_level: "info".into(),
			history_cap: DEFAULT_HISTORY_CAP,
			snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL.as_millis() as u64,
			default_classes: DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
			seed_users: Vec::new(),
			model: ModelConf::default(),
		}
	}
}

impl Conf {
	/// Environment first, then the config file. No secret means no server.
	pub fn jwt_secret(&self) -> Result<String> {
		resolve_secret(std::env::var(SECRET_ENV).ok(), self.jwt_secret.as_deref())
	}

	pub fn state_config(&self) -> StateConfig {
		StateConfig {
			history_cap: self.history_cap,
			// Never sample history more often than the default spacing.
			snapshot_interval: Duration::from_millis(self.snapshot_interval_ms).max(DEFAULT_SNAPSHOT_INTERVAL),
			default_classes: self.default_classes.clone(),
		}
	}
}

pub fn resolve_secret(env: Option<String>, file: Option<&str>) -> Result<String> {
	match env.filter(|s| !s.is_empty()) {
		Some(secret) => Ok(secret),
		None => match file.filter(|s| !s.is_empty()) {
			Some(secret) => Ok(secret.to_owned()),
			None => bail!("{SECRET_ENV} is not set and the config file has no jwt_secret"),
		},
	}
}

pub fn load_config(path: Option<&Path>) -> Result<Conf> {
	match path {
		Some(path) => confy::load_path(path)
			.with_context(|| format!("Failed to load config from {}", path.display())),
		None => confy::load(APP_NAME, None).context("Failed to load config"),
	}
}
