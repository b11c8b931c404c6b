use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use ocivm_common::error::{Error, Result};
use ocivm_common::{
    AvailabilityDomain, ImageRef, Instance, LifecycleState, Subnet, Vcn, Vnic, VnicAttachment,
};

use crate::config::Credentials;
use crate::signer::RequestSigner;
use crate::{ComputeApi, IdentityApi, ImageFilter, LaunchSpec, NetworkApi};

const API_VERSION: &str = "20160918";

/// REST adapter for the provider's compute, network and identity APIs.
/// One signed `reqwest::Client`, scoped to the credentials' tenancy as the
/// root compartment.
pub struct OciClient {
    client: Client,
    signer: RequestSigner,
    compartment_id: String,
    compute_base: String,
    identity_base: String,
}

impl OciClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        // An unbounded client can hang a launch forever if the API stalls.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport {
                operation: "build_client",
                message: e.to_string(),
            })?;
        let signer = RequestSigner::from_credentials(&credentials)?;
        Ok(OciClient {
            client,
            signer,
            compartment_id: credentials.compartment_id().to_string(),
            compute_base: format!(
                "https://iaas.{}.oraclecloud.com/{API_VERSION}",
                credentials.region
            ),
            identity_base: format!(
                "https://identity.{}.oraclecloud.com/{API_VERSION}",
                credentials.region
            ),
        })
    }

    fn url(&self, operation: &'static str, base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{base}{path}")).map_err(|e| Error::Transport {
            operation,
            message: format!("bad url {base}{path}: {e}"),
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Issue one signed request. `not_found` maps a 404 to the domain
    /// NotFound error for endpoints where a 404 is meaningful; every other
    /// non-success status surfaces the provider's message verbatim as a
    /// rejection with a best-effort category hint.
    async fn request(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        not_found: Option<(&'static str, &str)>,
    ) -> Result<Option<String>> {
        let body_bytes = match &body {
            Some(value) => Some(serde_json::to_vec(value).map_err(|e| Error::Transport {
                operation,
                message: format!("request encode failed: {e}"),
            })?),
            None => None,
        };
        let headers = self.signer.sign(&method, &url, body_bytes.as_deref())?;

        tracing::debug!(%url, method = %method, operation, "provider api call");

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(bytes) = body_bytes {
            request = request.body(bytes);
        }
        let response = request.send().await.map_err(|e| Error::Transport {
            operation,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }
            let text = response.text().await.map_err(|e| Error::Transport {
                operation,
                message: format!("reading response body: {e}"),
            })?;
            return Ok(Some(text));
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(operation, status = status.as_u16(), body = %text, "provider api failure");

        if status == StatusCode::NOT_FOUND {
            if let Some((resource, ident)) = not_found {
                return Err(Error::not_found(resource, ident));
            }
        }
        let message = extract_api_message(&text)
            .unwrap_or_else(|| format!("status={} body={text}", status.as_u16()));
        Err(Error::rejected(operation, Some(status.as_u16()), message))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        not_found: Option<(&'static str, &str)>,
    ) -> Result<T> {
        let text = self
            .request(operation, method, url, body, not_found)
            .await?
            .ok_or_else(|| Error::Malformed {
                operation,
                detail: "empty response body".to_string(),
            })?;
        serde_json::from_str(&text).map_err(|e| Error::Malformed {
            operation,
            detail: e.to_string(),
        })
    }
}

/// Pull the human-readable `message` out of the provider's error envelope.
fn extract_api_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value.get("message")?.as_str()?;
    match value.get("code").and_then(|c| c.as_str()) {
        Some(code) => Some(format!("{code}: {message}")),
        None => Some(message.to_string()),
    }
}

// --- Wire DTOs (validated here, at the boundary) ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceDto {
    id: String,
    display_name: String,
    shape: String,
    lifecycle_state: LifecycleState,
    availability_domain: Option<String>,
    time_created: Option<DateTime<Utc>>,
}

impl From<InstanceDto> for Instance {
    fn from(dto: InstanceDto) -> Self {
        Instance {
            id: dto.id,
            display_name: dto.display_name,
            shape: dto.shape,
            lifecycle_state: dto.lifecycle_state,
            availability_domain: dto.availability_domain,
            time_created: dto.time_created,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageDto {
    id: String,
    display_name: String,
    time_created: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VcnDto {
    id: String,
    display_name: String,
    cidr_block: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubnetDto {
    id: String,
    display_name: String,
    cidr_block: Option<String>,
    availability_domain: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VnicAttachmentDto {
    id: String,
    instance_id: String,
    vnic_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VnicDto {
    id: String,
    public_ip: Option<String>,
    private_ip: Option<String>,
}

#[derive(Deserialize)]
struct AvailabilityDomainDto {
    name: String,
}

#[async_trait]
impl ComputeApi for OciClient {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRef>> {
        let mut query = vec![
            ("compartmentId", self.compartment_id.as_str()),
            ("operatingSystem", filter.os_family.as_str()),
            ("operatingSystemVersion", filter.os_version.as_str()),
            ("sortBy", "TIMECREATED"),
            ("sortOrder", "DESC"),
        ];
        if let Some(shape) = filter.shape.as_deref() {
            query.push(("shape", shape));
        }
        let url = self.url("list_images", &self.compute_base, "/images", &query)?;
        let images: Vec<ImageDto> = self
            .request_json("list_images", Method::GET, url, None, None)
            .await?;
        Ok(images
            .into_iter()
            .map(|dto| ImageRef {
                id: dto.id,
                display_name: dto.display_name,
                time_created: dto.time_created,
            })
            .collect())
    }

    async fn launch_instance(&self, spec: &LaunchSpec) -> Result<Instance> {
        let mut details = json!({
            "availabilityDomain": spec.availability_domain,
            "compartmentId": self.compartment_id,
            "displayName": spec.display_name,
            "imageId": spec.image_id,
            "shape": spec.shape,
            "createVnicDetails": {
                "subnetId": spec.subnet_id,
                "assignPublicIp": spec.assign_public_ip,
            },
            "metadata": {
                "ssh_authorized_keys": spec.ssh_public_key,
            },
        });
        if let (Some(ocpus), Some(memory_gb)) = (spec.ocpus, spec.memory_gb) {
            details["shapeConfig"] = json!({
                "ocpus": ocpus,
                "memoryInGBs": memory_gb,
            });
        }

        let url = self.url("launch_instance", &self.compute_base, "/instances/", &[])?;
        let instance: InstanceDto = self
            .request_json("launch_instance", Method::POST, url, Some(details), None)
            .await?;
        Ok(instance.into())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let url = self.url(
            "get_instance",
            &self.compute_base,
            &format!("/instances/{instance_id}"),
            &[],
        )?;
        let instance: InstanceDto = self
            .request_json(
                "get_instance",
                Method::GET,
                url,
                None,
                Some(("instance", instance_id)),
            )
            .await?;
        Ok(instance.into())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let url = self.url(
            "list_instances",
            &self.compute_base,
            "/instances",
            &[("compartmentId", self.compartment_id.as_str())],
        )?;
        let instances: Vec<InstanceDto> = self
            .request_json("list_instances", Method::GET, url, None, None)
            .await?;
        Ok(instances.into_iter().map(Instance::from).collect())
    }

    async fn list_vnic_attachments(&self, instance_id: &str) -> Result<Vec<VnicAttachment>> {
        let url = self.url(
            "list_vnic_attachments",
            &self.compute_base,
            "/vnicAttachments",
            &[
                ("compartmentId", self.compartment_id.as_str()),
                ("instanceId", instance_id),
            ],
        )?;
        let attachments: Vec<VnicAttachmentDto> = self
            .request_json("list_vnic_attachments", Method::GET, url, None, None)
            .await?;
        // Attachments still being created have no vnicId yet; skip them.
        Ok(attachments
            .into_iter()
            .filter_map(|dto| {
                dto.vnic_id.map(|vnic_id| VnicAttachment {
                    id: dto.id,
                    instance_id: dto.instance_id,
                    vnic_id,
                })
            })
            .collect())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let url = self.url(
            "terminate_instance",
            &self.compute_base,
            &format!("/instances/{instance_id}"),
            &[],
        )?;
        self.request(
            "terminate_instance",
            Method::DELETE,
            url,
            None,
            Some(("instance", instance_id)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for OciClient {
    async fn list_vcns(&self) -> Result<Vec<Vcn>> {
        let url = self.url(
            "list_vcns",
            &self.compute_base,
            "/vcns",
            &[("compartmentId", self.compartment_id.as_str())],
        )?;
        let vcns: Vec<VcnDto> = self
            .request_json("list_vcns", Method::GET, url, None, None)
            .await?;
        Ok(vcns
            .into_iter()
            .map(|dto| Vcn {
                id: dto.id,
                display_name: dto.display_name,
                cidr_block: dto.cidr_block,
            })
            .collect())
    }

    async fn list_subnets(&self, vcn_id: &str) -> Result<Vec<Subnet>> {
        let url = self.url(
            "list_subnets",
            &self.compute_base,
            "/subnets",
            &[
                ("compartmentId", self.compartment_id.as_str()),
                ("vcnId", vcn_id),
            ],
        )?;
        let subnets: Vec<SubnetDto> = self
            .request_json("list_subnets", Method::GET, url, None, None)
            .await?;
        Ok(subnets
            .into_iter()
            .map(|dto| Subnet {
                id: dto.id,
                display_name: dto.display_name,
                cidr_block: dto.cidr_block,
                availability_domain: dto.availability_domain,
            })
            .collect())
    }

    async fn get_vnic(&self, vnic_id: &str) -> Result<Vnic> {
        let url = self.url(
            "get_vnic",
            &self.compute_base,
            &format!("/vnics/{vnic_id}"),
            &[],
        )?;
        let vnic: VnicDto = self
            .request_json("get_vnic", Method::GET, url, None, Some(("vnic", vnic_id)))
            .await?;
        Ok(Vnic {
            id: vnic.id,
            public_ip: vnic.public_ip,
            private_ip: vnic.private_ip,
        })
    }
}

#[async_trait]
impl IdentityApi for OciClient {
    async fn list_availability_domains(&self) -> Result<Vec<AvailabilityDomain>> {
        let url = self.url(
            "list_availability_domains",
            &self.identity_base,
            "/availabilityDomains/",
            &[("compartmentId", self.compartment_id.as_str())],
        )?;
        let domains: Vec<AvailabilityDomainDto> = self
            .request_json("list_availability_domains", Method::GET, url, None, None)
            .await?;
        Ok(domains
            .into_iter()
            .map(|dto| AvailabilityDomain { name: dto.name })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_extraction() {
        let body = r#"{"code":"LimitExceeded","message":"quota exceeded for shape"}"#;
        assert_eq!(
            extract_api_message(body).unwrap(),
            "LimitExceeded: quota exceeded for shape"
        );
        assert_eq!(extract_api_message("not json"), None);
    }

    #[test]
    fn instance_dto_decodes_wire_form() {
        let body = r#"{
            "id": "ocid1.instance.oc1..abc",
            "displayName": "staging-server",
            "shape": "VM.Standard.A1.Flex",
            "lifecycleState": "PROVISIONING",
            "availabilityDomain": "xyz:PHX-AD-1",
            "timeCreated": "2024-03-05T12:00:00Z",
            "region": "phx"
        }"#;
        let dto: InstanceDto = serde_json::from_str(body).unwrap();
        let instance: Instance = dto.into();
        assert_eq!(instance.lifecycle_state, LifecycleState::Provisioning);
        assert_eq!(instance.availability_domain.as_deref(), Some("xyz:PHX-AD-1"));
    }
}
