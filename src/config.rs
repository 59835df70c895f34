// src/config.rs
use anyhow::{anyhow, bail, Context};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

/// Service configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Allowed distance from the class location. Required; there is no sane default.
    pub radius_meters: f64,
    /// JSON class table; the built-in table is used when unset.
    pub class_locations_path: Option<PathBuf>,
    pub reference_image: PathBuf,
    /// Where decoded submissions are written while the verifier looks at them.
    pub scratch_dir: PathBuf,
    pub face_verifier_url: String,
    pub face_model: String,
    /// Upper bound on verifier calls in flight at once.
    pub face_concurrency: usize,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let radius_meters: f64 = parse_var(&get, "LOCATION_RADIUS_METERS")?
            .ok_or_else(|| anyhow!("LOCATION_RADIUS_METERS must be set"))?;
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            bail!("LOCATION_RADIUS_METERS must be a positive number, got {radius_meters}");
        }

        let face_concurrency: usize = parse_var(&get, "FACE_VERIFY_CONCURRENCY")?.unwrap_or(1);
        if face_concurrency == 0 {
            bail!("FACE_VERIFY_CONCURRENCY must be at least 1");
        }

        let timeout_secs: u64 = parse_var(&get, "REQUEST_TIMEOUT_SECS")?.unwrap_or(60);

        Ok(Self {
            bind_addr: parse_var(&get, "BIND_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000))),
            radius_meters,
            class_locations_path: non_empty(&get, "CLASS_LOCATIONS_PATH").map(PathBuf::from),
            reference_image: non_empty(&get, "REFERENCE_IMG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reference.jpg")),
            scratch_dir: non_empty(&get, "SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            face_verifier_url: non_empty(&get, "FACE_VERIFIER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5005".to_string()),
            face_model: non_empty(&get, "FACE_MODEL").unwrap_or_else(|| "Facenet".to_string()),
            face_concurrency,
            request_timeout: Duration::from_secs(timeout_secs),
            max_body_bytes: parse_var(&get, "MAX_BODY_BYTES")?.unwrap_or(10 * 1024 * 1024),
        })
    }
}

fn non_empty<F>(get: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Unset or blank is `None`; set but unparseable is an error.
fn parse_var<F, T>(get: &F, key: &str) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(get, key)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid {key}: {v:?}")))
        .transpose()
}
