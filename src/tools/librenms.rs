//! Read-only monitoring queries against the LibreNMS REST API
//!
//! Every tool here is a single stateless GET (two for interface lookup);
//! nothing is cached, so repeated calls always reach the backend.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_args, Tool, ToolError};
use crate::agent::types::ToolDefinition;

/// Errors from the monitoring API
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("monitoring API returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<QueryError> for ToolError {
    fn from(e: QueryError) -> Self {
        ToolError::Failed(e.to_string())
    }
}

/// `GET path?query` returning a JSON document
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, QueryError>;
}

/// HTTP client for the LibreNMS v0 API
#[derive(Clone)]
pub struct LibreNmsClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl LibreNmsClient {
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://librenms.example.net/api/v0"
    /// * `token` - value sent in the `X-Auth-Token` header
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl QueryBackend for LibreNmsClient {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, QueryError> {
        let endpoint = format!("{}{}", self.base_url, path);
        debug!(endpoint = %endpoint, params = query.len(), "monitoring API request");

        let response = self
            .client
            .get(&endpoint)
            .header("X-Auth-Token", &self.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Device or port identifier; the agent sends either numbers or strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Ident {
    Number(u64),
    Text(String),
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Number(n) => write!(f, "{}", n),
            Ident::Text(s) => f.write_str(s),
        }
    }
}

/// The monitoring queries exposed to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibreNmsQuery {
    DeviceInfo,
    Bgp,
    Arp,
    Syslog,
    ListNetworks,
    PortInfo,
    SearchIfAlias,
    InterfaceInfo,
}

impl LibreNmsQuery {
    pub const ALL: [LibreNmsQuery; 8] = [
        LibreNmsQuery::DeviceInfo,
        LibreNmsQuery::Bgp,
        LibreNmsQuery::Arp,
        LibreNmsQuery::Syslog,
        LibreNmsQuery::ListNetworks,
        LibreNmsQuery::PortInfo,
        LibreNmsQuery::SearchIfAlias,
        LibreNmsQuery::InterfaceInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LibreNmsQuery::DeviceInfo => "librenms_get_device_info",
            LibreNmsQuery::Bgp => "librenms_bgp",
            LibreNmsQuery::Arp => "librenms_arp",
            LibreNmsQuery::Syslog => "librenms_syslog",
            LibreNmsQuery::ListNetworks => "librenms_list_networks",
            LibreNmsQuery::PortInfo => "librenms_port_info",
            LibreNmsQuery::SearchIfAlias => "librenms_search_ifalias",
            LibreNmsQuery::InterfaceInfo => "librenms_get_interface_info",
        }
    }
}

/// One monitoring query registered as a tool
pub struct LibreNmsTool {
    query: LibreNmsQuery,
    backend: Arc<dyn QueryBackend>,
}

impl LibreNmsTool {
    pub fn new(query: LibreNmsQuery, backend: Arc<dyn QueryBackend>) -> Self {
        Self { query, backend }
    }

    /// A tool for every monitoring query, all sharing `backend`
    pub fn all(backend: Arc<dyn QueryBackend>) -> Vec<Arc<dyn Tool>> {
        LibreNmsQuery::ALL
            .iter()
            .map(|q| Arc::new(LibreNmsTool::new(*q, backend.clone())) as Arc<dyn Tool>)
            .collect()
    }

    async fn run(&self, args: Value) -> Result<Value, ToolError> {
        match self.query {
            LibreNmsQuery::DeviceInfo => {
                let args: HostnameArgs = parse_args(args)?;
                let path = match args.hostname {
                    Some(host) if !host.is_empty() => format!("/devices/{}", host),
                    _ => "/devices".to_string(),
                };
                Ok(self.backend.get(&path, &[]).await?)
            }
            LibreNmsQuery::Bgp => {
                let args: BgpArgs = parse_args(args)?;
                Ok(self.backend.get("/bgp", &args.query()).await?)
            }
            LibreNmsQuery::Arp => {
                let args: ArpArgs = parse_args(args)?;
                match args.device {
                    Some(device) if args.query == "all" => Ok(self
                        .backend
                        .get("/resources/ip/arp/all", &[("device", device.to_string())])
                        .await?),
                    _ => Ok(self
                        .backend
                        .get(&format!("/resources/ip/arp/{}", args.query), &[])
                        .await?),
                }
            }
            LibreNmsQuery::Syslog => {
                let args: SyslogArgs = parse_args(args)?;
                let path = match &args.hostname {
                    Some(host) if !host.to_string().is_empty() => format!("/logs/syslog/{}", host),
                    _ => "/logs/syslog".to_string(),
                };
                let mut query = Vec::new();
                if let Some(limit) = args.limit {
                    query.push(("limit", limit.to_string()));
                }
                if let Some(from) = args.from_time {
                    query.push(("from", from));
                }
                if let Some(to) = args.to_time {
                    query.push(("to", to));
                }
                Ok(self.backend.get(&path, &query).await?)
            }
            LibreNmsQuery::ListNetworks => Ok(self.backend.get("/resources/ip/networks", &[]).await?),
            LibreNmsQuery::PortInfo => {
                let args: PortArgs = parse_args(args)?;
                Ok(self
                    .backend
                    .get(&format!("/ports/{}", args.port_id), &[])
                    .await?)
            }
            LibreNmsQuery::SearchIfAlias => {
                let args: DeviceIdArgs = parse_args(args)?;
                Ok(self
                    .backend
                    .get(&format!("/ports/search/device_id/{}/", args.device_id), &[])
                    .await?)
            }
            LibreNmsQuery::InterfaceInfo => {
                let args: InterfaceArgs = parse_args(args)?;
                self.interface_info(&args.device_id, &args.interface_name).await
            }
        }
    }

    /// Resolve an interface by name or alias, then fetch its port record
    async fn interface_info(&self, device_id: &Ident, interface_name: &str) -> Result<Value, ToolError> {
        let search = self
            .backend
            .get(&format!("/ports/search/device_id/{}/", device_id), &[])
            .await?;
        let ports = search["ports"].as_array().cloned().unwrap_or_default();

        let wanted = normalize_interface(interface_name);
        let matched = ports.iter().find(|port| {
            ["ifName", "ifAlias"]
                .iter()
                .filter_map(|field| port[*field].as_str())
                .any(|name| normalize_interface(name) == wanted)
        });

        let Some(port_id) = matched.map(|port| port["port_id"].clone()) else {
            let available: Vec<String> = ports
                .iter()
                .map(|port| {
                    format!(
                        "{} ({})",
                        port["ifName"].as_str().unwrap_or(""),
                        port["ifAlias"].as_str().unwrap_or("")
                    )
                })
                .collect();
            return Err(ToolError::Failed(format!(
                "interface {} not found on device {}; available interfaces: {}",
                interface_name,
                device_id,
                available.join(", ")
            )));
        };

        let port_id = match port_id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let mut info = self.backend.get(&format!("/ports/{}", port_id), &[]).await?;
        if let Some(obj) = info.as_object_mut() {
            obj.insert("matched_interface".to_string(), json!(interface_name));
        }
        Ok(info)
    }
}

/// Lowercase and drop `/` so "Ethernet0/0" matches "ethernet00"
fn normalize_interface(name: &str) -> String {
    name.to_lowercase().replace('/', "")
}

#[derive(Deserialize)]
struct HostnameArgs {
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Deserialize, Default)]
struct BgpArgs {
    hostname: Option<String>,
    asn: Option<Ident>,
    remote_asn: Option<Ident>,
    bgp_adminstate: Option<String>,
    bgp_family: Option<Ident>,
    bgp_desc: Option<String>,
    bgp_state: Option<String>,
    local_address: Option<String>,
    remote_address: Option<String>,
}

impl BgpArgs {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value {
                query.push((key, v));
            }
        };
        push("hostname", self.hostname.clone());
        push("asn", self.asn.as_ref().map(Ident::to_string));
        push("remote_asn", self.remote_asn.as_ref().map(Ident::to_string));
        push("bgp_adminstate", self.bgp_adminstate.clone());
        push("bgp_family", self.bgp_family.as_ref().map(Ident::to_string));
        push("bgp_desc", self.bgp_desc.clone());
        push("bgp_state", self.bgp_state.clone());
        push("local_address", self.local_address.clone());
        push("remote_address", self.remote_address.clone());
        query
    }
}

#[derive(Deserialize)]
struct ArpArgs {
    query: String,
    #[serde(default)]
    device: Option<Ident>,
}

#[derive(Deserialize)]
struct SyslogArgs {
    #[serde(default)]
    hostname: Option<Ident>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    from_time: Option<String>,
    #[serde(default)]
    to_time: Option<String>,
}

#[derive(Deserialize)]
struct PortArgs {
    port_id: Ident,
}

#[derive(Deserialize)]
struct DeviceIdArgs {
    device_id: Ident,
}

#[derive(Deserialize)]
struct InterfaceArgs {
    device_id: Ident,
    interface_name: String,
}

#[async_trait]
impl Tool for LibreNmsTool {
    fn definition(&self) -> ToolDefinition {
        let (description, parameters) = match self.query {
            LibreNmsQuery::DeviceInfo => (
                "Retrieve device information from LibreNMS, for all devices or for one device by hostname.",
                json!({
                    "type": "object",
                    "properties": {
                        "hostname": {"type": "string", "description": "Device hostname (optional)"}
                    }
                }),
            ),
            LibreNmsQuery::Bgp => (
                "Retrieve BGP sessions from LibreNMS including peering details, state and descriptions.",
                json!({
                    "type": "object",
                    "properties": {
                        "hostname": {"type": "string", "description": "Device hostname or ID"},
                        "asn": {"type": "string", "description": "Local ASN"},
                        "remote_asn": {"type": "string", "description": "Remote peer ASN"},
                        "bgp_adminstate": {"type": "string", "description": "Admin state, e.g. start or stop"},
                        "bgp_family": {"type": "string", "description": "Address family, 4 or 6"},
                        "bgp_desc": {"type": "string", "description": "Peer description"},
                        "bgp_state": {"type": "string", "description": "Session state, e.g. established or idle"},
                        "local_address": {"type": "string", "description": "Local address"},
                        "remote_address": {"type": "string", "description": "Remote peer address"}
                    }
                }),
            ),
            LibreNmsQuery::Arp => (
                "Retrieve ARP entries from LibreNMS for a CIDR network, or all entries of one device.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "CIDR network (e.g. 10.0.0.0/24) or 'all'"},
                        "device": {"type": "string", "description": "Device hostname or ID, required when query is 'all'"}
                    },
                    "required": ["query"]
                }),
            ),
            LibreNmsQuery::Syslog => (
                "Retrieve syslog entries from LibreNMS for all devices or a specific device, optionally bounded by time and count.",
                json!({
                    "type": "object",
                    "properties": {
                        "hostname": {"type": "string", "description": "Either the device's hostname or ID (optional)"},
                        "limit": {"type": "integer", "description": "The maximum number of results to return (optional)"},
                        "from_time": {"type": "string", "description": "The start date and time or the event ID to search from (optional)"},
                        "to_time": {"type": "string", "description": "The end date and time or the event ID to search to (optional)"}
                    }
                }),
            ),
            LibreNmsQuery::ListNetworks => (
                "List all IP networks known to LibreNMS.",
                json!({"type": "object", "properties": {}}),
            ),
            LibreNmsQuery::PortInfo => (
                "Retrieve detailed information about one port by its LibreNMS port ID.",
                json!({
                    "type": "object",
                    "properties": {
                        "port_id": {"type": "integer", "description": "LibreNMS port ID"}
                    },
                    "required": ["port_id"]
                }),
            ),
            LibreNmsQuery::SearchIfAlias => (
                "List the ports of a device with their interface names and aliases.",
                json!({
                    "type": "object",
                    "properties": {
                        "device_id": {"type": "integer", "description": "LibreNMS device ID"}
                    },
                    "required": ["device_id"]
                }),
            ),
            LibreNmsQuery::InterfaceInfo => (
                "Retrieve port information for an interface on a device, matched by interface name or alias.",
                json!({
                    "type": "object",
                    "properties": {
                        "device_id": {"type": "integer", "description": "LibreNMS device ID"},
                        "interface_name": {"type": "string", "description": "Interface name, e.g. Ethernet0/0"}
                    },
                    "required": ["device_id", "interface_name"]
                }),
            ),
        };
        ToolDefinition::function(self.query.name(), description, parameters)
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let value = self.run(args).await?;
        serde_json::to_string_pretty(&value).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Request = (String, Vec<(String, String)>);

    /// Records every request and answers from a path → document table
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<Request>>,
        responses: Vec<(String, Value)>,
    }

    #[async_trait]
    impl QueryBackend for Recorder {
        async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, QueryError> {
            self.requests.lock().unwrap().push((
                path.to_string(),
                query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ));
            Ok(self
                .responses
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| json!({"status": "ok"})))
        }
    }

    fn tool(query: LibreNmsQuery, backend: &Arc<Recorder>) -> LibreNmsTool {
        LibreNmsTool::new(query, backend.clone())
    }

    fn ports_backend() -> Arc<Recorder> {
        Arc::new(Recorder {
            requests: Mutex::default(),
            responses: vec![
                (
                    "/ports/search/device_id/3/".to_string(),
                    json!({"ports": [
                        {"port_id": 11, "ifName": "Ethernet0/0", "ifAlias": "uplink"},
                        {"port_id": 12, "ifName": "Ethernet0/1", "ifAlias": "to-core"}
                    ]}),
                ),
                ("/ports/12".to_string(), json!({"port": [{"ifOperStatus": "up"}]})),
            ],
        })
    }

    #[tokio::test]
    async fn test_device_info_paths() {
        let backend = Arc::new(Recorder::default());
        let t = tool(LibreNmsQuery::DeviceInfo, &backend);
        t.call(json!({})).await.unwrap();
        t.call(json!({"hostname": "router1"})).await.unwrap();
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].0, "/devices");
        assert_eq!(requests[1].0, "/devices/router1");
    }

    #[tokio::test]
    async fn test_arp_all_uses_device_param() {
        let backend = Arc::new(Recorder::default());
        let t = tool(LibreNmsQuery::Arp, &backend);
        t.call(json!({"query": "all", "device": 3})).await.unwrap();
        t.call(json!({"query": "10.0.0.0/24"})).await.unwrap();
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].0, "/resources/ip/arp/all");
        assert_eq!(requests[0].1, vec![("device".to_string(), "3".to_string())]);
        assert_eq!(requests[1].0, "/resources/ip/arp/10.0.0.0/24");
        assert!(requests[1].1.is_empty());
    }

    #[tokio::test]
    async fn test_syslog_and_bgp_only_send_given_filters() {
        let backend = Arc::new(Recorder::default());
        tool(LibreNmsQuery::Syslog, &backend)
            .call(json!({"hostname": "router2", "limit": 10, "to_time": "2024-01-01 00:00:00"}))
            .await
            .unwrap();
        tool(LibreNmsQuery::Bgp, &backend)
            .call(json!({"bgp_state": "idle", "remote_asn": 65001}))
            .await
            .unwrap();
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].0, "/logs/syslog/router2");
        assert_eq!(
            requests[0].1,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("to".to_string(), "2024-01-01 00:00:00".to_string())
            ]
        );
        assert_eq!(requests[1].0, "/bgp");
        assert_eq!(
            requests[1].1,
            vec![
                ("remote_asn".to_string(), "65001".to_string()),
                ("bgp_state".to_string(), "idle".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_interface_lookup_ignores_case_and_slashes() {
        let backend = ports_backend();
        let out = tool(LibreNmsQuery::InterfaceInfo, &backend)
            .call(json!({"device_id": 3, "interface_name": "ethernet01"}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["matched_interface"], "ethernet01");
        assert_eq!(value["port"][0]["ifOperStatus"], "up");
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].0, "/ports/12");
    }

    #[tokio::test]
    async fn test_interface_lookup_by_alias_and_miss() {
        let backend = ports_backend();
        let t = tool(LibreNmsQuery::InterfaceInfo, &backend);
        assert!(t
            .call(json!({"device_id": "3", "interface_name": "TO-CORE"}))
            .await
            .is_ok());

        let err = t
            .call(json!({"device_id": 3, "interface_name": "Gi0/9"}))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Gi0/9 not found on device 3"));
        assert!(msg.contains("Ethernet0/0 (uplink)"));
        assert!(msg.contains("Ethernet0/1 (to-core)"));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let backend = Arc::new(Recorder::default());
        let err = tool(LibreNmsQuery::PortInfo, &backend)
            .call(json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_all_tools_have_distinct_names() {
        let backend: Arc<dyn QueryBackend> = Arc::new(Recorder::default());
        let mut names: Vec<_> = LibreNmsTool::all(backend)
            .iter()
            .map(|t| t.definition().function.name)
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }
}
