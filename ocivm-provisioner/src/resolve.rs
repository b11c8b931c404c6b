use ocivm_common::error::{Error, Result};
use ocivm_common::{ImageRef, NetworkTarget};
use ocivm_providers::config::expand_home;
use ocivm_providers::{ComputeApi, IdentityApi, ImageFilter, NetworkApi};

/// Most recently published image matching the OS family/version filter,
/// preferring shape-compatible candidates. An empty shape-filtered result
/// widens once to an architecture-agnostic search before giving up.
pub async fn resolve_image(
    compute: &dyn ComputeApi,
    os_family: &str,
    os_version: &str,
    shape: &str,
) -> Result<ImageRef> {
    let filter = ImageFilter {
        os_family: os_family.to_string(),
        os_version: os_version.to_string(),
        shape: Some(shape.to_string()),
    };
    let mut candidates = compute.list_images(&filter).await?;
    if candidates.is_empty() {
        tracing::info!(shape, "no shape-compatible images, widening search");
        candidates = compute
            .list_images(&ImageFilter {
                shape: None,
                ..filter
            })
            .await?;
    }
    // The API is asked to sort newest-first; re-assert it locally so a
    // provider (or mock) returning unsorted data picks the same image.
    candidates.sort_by(|a, b| b.time_created.cmp(&a.time_created));
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("image", format!("{os_family} {os_version}")))
}

/// First VCN in the account, subnet chosen by the optional hint (first
/// display-name substring match, case-insensitive) or the API's own order.
/// Availability domain comes from the chosen subnet when it has one
/// (AD-local subnet); regional subnets fall back to the account's first
/// listed availability domain.
pub async fn resolve_network(
    network: &dyn NetworkApi,
    identity: &dyn IdentityApi,
    subnet_hint: Option<&str>,
) -> Result<NetworkTarget> {
    let vcns = network.list_vcns().await?;
    let vcn = vcns
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("vcn", "no virtual network in compartment"))?;

    let subnets = network.list_subnets(&vcn.id).await?;
    if subnets.is_empty() {
        return Err(Error::not_found("subnet", vcn.id));
    }
    let subnet = match subnet_hint {
        Some(hint) => {
            let needle = hint.to_lowercase();
            subnets
                .iter()
                .find(|s| s.display_name.to_lowercase().contains(&needle))
                .or_else(|| subnets.first())
        }
        None => subnets.first(),
    }
    .cloned()
    .ok_or_else(|| Error::not_found("subnet", vcn.id.clone()))?;

    let availability_domain = match subnet.availability_domain.clone() {
        Some(ad) => ad,
        None => {
            let domains = identity.list_availability_domains().await?;
            domains
                .into_iter()
                .next()
                .map(|d| d.name)
                .ok_or_else(|| Error::not_found("availability domain", "none listed"))?
        }
    };

    tracing::debug!(
        vcn = %vcn.display_name,
        subnet = %subnet.display_name,
        ad = %availability_domain,
        "network target resolved"
    );

    Ok(NetworkTarget {
        vcn_id: vcn.id,
        subnet_id: subnet.id,
        subnet_name: subnet.display_name,
        availability_domain,
    })
}

/// Read the SSH public key, trimmed. No format validation: malformed key
/// material is the provider's to reject at launch time.
pub fn load_public_key(path: &str) -> Result<String> {
    let expanded = expand_home(path);
    let contents = std::fs::read_to_string(&expanded).map_err(|e| Error::KeyNotFound {
        path: expanded.clone(),
        reason: e.to_string(),
    })?;
    let key = contents.trim().to_string();
    if key.is_empty() {
        return Err(Error::KeyNotFound {
            path: expanded,
            reason: "file is empty".to_string(),
        });
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_file_reports_path() {
        let err = load_public_key("/nonexistent/id_rsa.pub").unwrap_err();
        match err {
            Error::KeyNotFound { path, .. } => assert_eq!(path, "/nonexistent/id_rsa.pub"),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }
}
