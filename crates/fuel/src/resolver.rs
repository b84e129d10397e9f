//! Turns free-form model URLs and unique names into [`Identifier`]s.
//!
//! Parsing is a pure function of the input and the configured server list,
//! so it can be called from any number of threads at once.

use fuel_tools_core::identifier::{validate_segment, DEFAULT_API_VERSION};
use fuel_tools_core::{FuelError, FuelResult, Identifier, ServerConfig};

const MODELS: &str = "models";
const FILES: &str = "files";

/// Parse `<scheme>://<server>/<version>/<owner>/models/<name>`, the
/// version-less `<scheme>://<server>/<owner>/models/<name>`, or the unique
/// name `<owner>/models/<name>`. Trailing slashes are ignored.
///
/// If `servers` holds an entry for the parsed host, its API version wins
/// over the one embedded in the URL. A unique name takes the first
/// configured server, or none.
pub fn parse_model_url(input: &str, servers: &[ServerConfig]) -> FuelResult<Identifier> {
    let input = input.trim();
    match split_scheme(input) {
        Some(Ok((_, rest))) => {
            let segments = split_segments(input, rest)?;
            match segments.as_slice() {
                [server, version, owner, MODELS, name] => {
                    build(input, server, Some(*version), owner, name, servers)
                }
                [server, owner, MODELS, name] => build(input, server, None, owner, name, servers),
                _ => Err(FuelError::parse(input, "not a model URL")),
            }
        }
        Some(Err(reason)) => Err(FuelError::parse(input, reason)),
        None => {
            let segments = split_segments(input, input)?;
            match segments.as_slice() {
                [owner, MODELS, name] => {
                    let mut id = identifier(input, owner, name)?;
                    if let Some(server) = servers.first() {
                        id.server = server.host();
                        id.api_version = Some(server.api_version.clone());
                    }
                    Ok(id)
                }
                _ => Err(FuelError::parse(input, "not a model unique name")),
            }
        }
    }
}

/// Accept only the full `<scheme>://<server>/<version>/<owner>/models/<name>`
/// form.
pub fn parse_model_url_strict(input: &str, servers: &[ServerConfig]) -> FuelResult<Identifier> {
    let input = input.trim();
    let (_, rest) = require_scheme(input)?;
    let segments = split_segments(input, rest)?;
    match segments.as_slice() {
        [server, version, owner, MODELS, name] => {
            build(input, server, Some(*version), owner, name, servers)
        }
        _ => Err(FuelError::parse(
            input,
            "expected <scheme>://<server>/<version>/<owner>/models/<name>",
        )),
    }
}

/// Parse the URL of one file inside a model, e.g.
/// `https://fuel.example.org/1.0/alice/models/Chair/files/meshes/chair.dae`.
/// The `files` marker segment is optional. Returns the identifier and the
/// file's path relative to the model root.
pub fn parse_model_file_url(
    input: &str,
    servers: &[ServerConfig],
) -> FuelResult<(Identifier, String)> {
    let input = input.trim();
    let (_, rest) = require_scheme(input)?;
    let segments = split_segments(input, rest)?;
    if segments.len() < 6 || segments[3] != MODELS {
        return Err(FuelError::parse(input, "not a model file URL"));
    }

    let id = build(
        input,
        segments[0],
        Some(segments[1]),
        segments[2],
        segments[4],
        servers,
    )?;

    let file_segments = match &segments[5..] {
        [FILES, path @ ..] => path,
        path => path,
    };
    if file_segments.is_empty() {
        return Err(FuelError::parse(input, "missing file path"));
    }
    if file_segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(FuelError::parse(input, "relative file path segment"));
    }
    Ok((id, file_segments.join("/")))
}

/// `<scheme>://<server>/<version>/<owner>/models/<name>` for `id`.
pub fn model_url(scheme: &str, id: &Identifier) -> String {
    format!(
        "{}://{}/{}/{}",
        scheme,
        id.server,
        id.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION),
        id.remote_path()
    )
}

/// Split off a URL scheme. `None` means the input has no `://` at all.
fn split_scheme(input: &str) -> Option<Result<(&str, &str), &'static str>> {
    let (scheme, rest) = input.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Some(Err("malformed scheme"));
    }
    if rest.starts_with('/') {
        return Some(Err("missing server"));
    }
    Some(Ok((scheme, rest)))
}

fn require_scheme(input: &str) -> FuelResult<(&str, &str)> {
    match split_scheme(input) {
        Some(Ok(parts)) => Ok(parts),
        Some(Err(reason)) => Err(FuelError::parse(input, reason)),
        None => Err(FuelError::parse(input, "missing scheme")),
    }
}

/// Runs of slashes count as one separator. Whitespace anywhere is fatal.
fn split_segments<'a>(input: &str, rest: &'a str) -> FuelResult<Vec<&'a str>> {
    if rest.chars().any(char::is_whitespace) {
        return Err(FuelError::parse(input, "whitespace in URL"));
    }
    Ok(rest.split('/').filter(|s| !s.is_empty()).collect())
}

fn identifier(input: &str, owner: &str, name: &str) -> FuelResult<Identifier> {
    validate_segment(owner).map_err(|reason| FuelError::parse(input, reason))?;
    validate_segment(name).map_err(|reason| FuelError::parse(input, reason))?;
    Ok(Identifier {
        owner: owner.to_string(),
        name: name.to_string(),
        ..Default::default()
    })
}

fn build(
    input: &str,
    server: &str,
    version: Option<&str>,
    owner: &str,
    name: &str,
    servers: &[ServerConfig],
) -> FuelResult<Identifier> {
    let mut id = identifier(input, owner, name)?;
    id.server = server.to_string();
    id.api_version = version.map(str::to_string);

    // The locally configured record beats a stale version in the URL.
    if let Some(known) = servers.iter().find(|s| s.host() == server) {
        id.api_version = Some(known.api_version.clone());
    }
    Ok(id)
}
