use super::{decode, encode};
use crate::error::{Error, Result};
use crate::models::{Pact, PactSpecification};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Reads and decodes one pact file.
pub fn read_pact_file<P: AsRef<Path>>(path: P) -> Result<Pact> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&contents)
        .map_err(|err| Error::parse(format!("'{}' is not valid JSON: {}", path.display(), err)))?;
    decode(&document)
}

/// Every `*.json` file of a directory, in file name order.
pub fn load_pact_directory<P: AsRef<Path>>(directory: P) -> Result<Vec<(PathBuf, Pact)>> {
    let mut paths = fs::read_dir(directory.as_ref())?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect::<Vec<_>>();
    paths.sort();

    let mut pacts = Vec::with_capacity(paths.len());
    for path in paths {
        debug!("Loading pact file {}", path.display());
        let pact = read_pact_file(&path)?;
        pacts.push((path, pact));
    }
    Ok(pacts)
}

/// Unions the interactions of two pacts between the same parties. An
/// interaction of `newer` replaces one of `existing` with the same
/// description and kind.
pub fn merge_pacts(existing: &Pact, newer: &Pact) -> Result<Pact> {
    if existing.consumer != newer.consumer || existing.provider != newer.provider {
        return Err(Error::configuration(format!(
            "Can not merge the pact between {} and {} into one between {} and {}",
            newer.consumer, newer.provider, existing.consumer, existing.provider
        )));
    }

    let mut merged = Pact::new(
        newer.consumer.clone(),
        newer.provider.clone(),
        existing.specification.max(newer.specification),
    );
    merged.metadata = existing.metadata.clone();
    for (namespace, values) in &newer.metadata {
        merged
            .metadata
            .entry(namespace.clone())
            .or_default()
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for interaction in &existing.interactions {
        let replacement = newer
            .interactions
            .iter()
            .find(|i| i.description() == interaction.description() && i.kind() == interaction.kind());
        match replacement {
            Some(replacement) => {
                if replacement != interaction {
                    debug!("Replacing interaction '{}'", interaction.description());
                }
                merged.interactions.push(replacement.clone());
            }
            None => merged.interactions.push(interaction.clone()),
        }
    }
    for interaction in &newer.interactions {
        let known = existing
            .interactions
            .iter()
            .any(|i| i.description() == interaction.description() && i.kind() == interaction.kind());
        if !known {
            merged.interactions.push(interaction.clone());
        }
    }
    Ok(merged)
}

/// Writes `pact` as `specification` to `path`, creating parent directories.
/// Without `overwrite` an existing file is merged with the pact first.
pub fn write_pact_file<P: AsRef<Path>>(
    path: P,
    pact: &Pact,
    specification: PactSpecification,
    overwrite: bool,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let document = if !overwrite && path.exists() {
        match read_pact_file(path) {
            Ok(existing) => {
                debug!("Merging with existing pact file {}", path.display());
                let merged = merge_pacts(&existing, pact)?;
                encode(&merged, specification.max(existing.specification))?
            }
            Err(Error::Parse(message)) | Err(Error::UnsupportedVersion(message)) => {
                warn!("Replacing unreadable pact file {}: {}", path.display(), message);
                encode(pact, specification)?
            }
            Err(err) => return Err(err),
        }
    } else {
        encode(pact, specification)?
    };

    let mut contents = serde_json::to_string_pretty(&document)?;
    contents.push('\n');
    fs::write(path, contents)?;
    info!(
        "Wrote {} pact file for {} -> {} to {}",
        specification,
        pact.consumer,
        pact.provider,
        path.display()
    );
    Ok(())
}
