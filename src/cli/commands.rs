// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::codec;
use crate::config::EncryptionConfig;
use crate::crypto::{CryptoSession, PublicJwk, RequestEnvelope, ResponseEnvelope};
use crate::runtime::ServerRender;

/// Arguments shared by commands that need the encryption config
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// TOML config file (defaults to environment variables)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// API base URL, overrides the config
    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<EncryptionConfig> {
        let mut config = match &self.config {
            Some(path) => EncryptionConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EncryptionConfig::from_env().context("reading environment")?,
        };
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }
}

/// Arguments for fetch-key command
#[derive(Args, Debug)]
pub struct FetchKeyArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Cookie header to forward, as a server render would
    #[arg(long)]
    pub cookie: Option<String>,
}

/// Arguments for seal command
#[derive(Args, Debug)]
pub struct SealArgs {
    /// File holding the server public JWK
    #[arg(long)]
    pub jwk: PathBuf,

    /// JSON payload to seal; read from stdin when omitted
    #[arg(long)]
    pub payload: Option<String>,

    /// Nonce length in bytes
    #[arg(long, default_value_t = 16)]
    pub nonce_bytes: usize,
}

/// Arguments for inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Envelope file; `-` reads stdin
    #[arg(default_value = "-")]
    pub envelope: PathBuf,
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

/// Run a key bootstrap as a server render and print the transfer state
pub async fn fetch_key(args: FetchKeyArgs) -> Result<()> {
    let config = args.config.load()?;
    info!("Fetching server public key from {}", config.public_key_url());

    let render = ServerRender::new(&config, args.cookie.as_deref())?;
    match render.bootstrap().await? {
        Some(jwk) => info!("✅ Key received (kid: {})", jwk.kid.as_deref().unwrap_or("none")),
        None => info!("⚠️  No key available, clients will run without encryption"),
    }

    println!("{}", render.finish()?);
    Ok(())
}

/// Seal a JSON payload for the given key and print the envelope
pub async fn seal(args: SealArgs) -> Result<()> {
    let jwk_text = read_input(Some(&args.jwk))?;
    let jwk: PublicJwk = serde_json::from_str(&jwk_text).context("parsing JWK")?;

    let payload_text = match args.payload {
        Some(payload) => payload,
        None => read_input(None)?,
    };
    let payload: Value = serde_json::from_str(&payload_text).context("parsing payload")?;

    let session = CryptoSession::with_options(args.nonce_bytes, None);
    session.import_server_public_key(jwk).await?;
    let sealed = session.encrypt(&payload).await?;

    println!("{}", serde_json::to_string_pretty(&sealed.envelope)?);
    info!("Nonce: {}", sealed.nonce);
    Ok(())
}

/// Validate an envelope and describe its decoded fields
pub async fn inspect(args: InspectArgs) -> Result<()> {
    let text = read_input(Some(&args.envelope))?;
    let value: Value = serde_json::from_str(&text).context("envelope is not JSON")?;
    let report = describe_envelope(&value)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn decoded_len(field: &str, text: &str) -> Result<usize> {
    codec::b64_to_bytes(text)
        .map(|bytes| bytes.len())
        .map_err(|e| anyhow!("field '{}': {}", field, e))
}

/// Field sizes of a request or response envelope
pub fn describe_envelope(value: &Value) -> Result<Value> {
    if value.get("ek").is_some() || value.get("key").is_some() {
        let envelope: RequestEnvelope =
            serde_json::from_value(value.clone()).context("invalid request envelope")?;
        Ok(json!({
            "kind": "request",
            "iv_bytes": decoded_len("iv", &envelope.iv)?,
            "data_bytes": decoded_len("data", &envelope.data)?,
            "ek_bytes": decoded_len("ek", &envelope.ek)?,
            "nonce_bytes": decoded_len("nonce", &envelope.nonce)?,
        }))
    } else {
        let envelope = ResponseEnvelope::from_value(value)?;
        Ok(json!({
            "kind": "response",
            "iv_bytes": decoded_len("iv", &envelope.iv)?,
            "data_bytes": decoded_len("data", &envelope.data)?,
            "nonce_bytes": decoded_len("nonce", &envelope.nonce)?,
        }))
    }
}
