use serde_json::{json, Value};

/// Tool schemas advertised on `tools/list`.
pub fn tool_schemas() -> Value {
    json!({
        "tools": [
            launch_schema(),
            list_schema(),
            terminate_schema(),
            get_schema(),
            network_list_schema(),
            config_check_schema()
        ]
    })
}

fn launch_schema() -> Value {
    json!({
        "name": "oci_instance_launch",
        "description": "Launch a compute instance and wait until it is RUNNING. Returns the instance id, public IP and a ready-made SSH command.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Display name for the new instance"
                },
                "shape": {
                    "type": "string",
                    "description": "Compute shape (default VM.Standard.A1.Flex)"
                },
                "ocpus": {
                    "type": "number",
                    "description": "OCPU count for flexible shapes (default 1)"
                },
                "memory_gb": {
                    "type": "number",
                    "description": "Memory in GB for flexible shapes (default 6)"
                },
                "image_os": {
                    "type": "string",
                    "description": "Operating system family (default 'Canonical Ubuntu')"
                },
                "image_version": {
                    "type": "string",
                    "description": "Operating system version (default '22.04')"
                },
                "ssh_key_path": {
                    "type": "string",
                    "description": "Path to the SSH public key (default ~/.ssh/id_rsa.pub)"
                },
                "subnet": {
                    "type": "string",
                    "description": "Prefer the first subnet whose name contains this"
                }
            },
            "required": ["name"]
        }
    })
}

fn list_schema() -> Value {
    json!({
        "name": "oci_instance_list",
        "description": "List compute instances in the compartment with their lifecycle state and public IP.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "state": {
                    "type": "string",
                    "description": "Keep only instances in this exact lifecycle state (e.g. RUNNING, STOPPED)"
                }
            }
        }
    })
}

fn terminate_schema() -> Value {
    json!({
        "name": "oci_instance_terminate",
        "description": "Request termination of an instance by id. Termination proceeds asynchronously after the call returns.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "instance_id": {
                    "type": "string",
                    "description": "Instance OCID"
                }
            },
            "required": ["instance_id"]
        }
    })
}

fn get_schema() -> Value {
    json!({
        "name": "oci_instance_get",
        "description": "Fetch details for a single instance: state, shape, addresses, availability domain.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "instance_id": {
                    "type": "string",
                    "description": "Instance OCID"
                }
            },
            "required": ["instance_id"]
        }
    })
}

fn network_list_schema() -> Value {
    json!({
        "name": "oci_network_list",
        "description": "List virtual cloud networks and their subnets.",
        "inputSchema": {
            "type": "object",
            "properties": {}
        }
    })
}

fn config_check_schema() -> Value {
    json!({
        "name": "oci_config_check",
        "description": "Report how credentials were resolved and whether the API is reachable.",
        "inputSchema": {
            "type": "object",
            "properties": {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_has_a_name_and_object_schema() {
        let schemas = tool_schemas();
        let tools = schemas["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 6);
        for tool in tools {
            assert!(tool["name"].as_str().unwrap().starts_with("oci_"));
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[test]
    fn launch_requires_only_name() {
        let schemas = tool_schemas();
        let launch = &schemas["tools"][0];
        assert_eq!(launch["name"], "oci_instance_launch");
        assert_eq!(launch["inputSchema"]["required"], json!(["name"]));
    }
}
