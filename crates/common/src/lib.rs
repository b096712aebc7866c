use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Length of a full physical node identifier, e.g. `000048B02D15BC7C`.
pub const NODE_ID_LEN: usize = 16;
/// Length of a VSN tag, e.g. `W08D`.
pub const VSN_LEN: usize = 4;

pub fn is_node_id(identifier: &str) -> bool {
    identifier.chars().count() == NODE_ID_LEN
}

pub fn is_vsn(identifier: &str) -> bool {
    identifier.chars().count() == VSN_LEN
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Id,
    Vsn,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Vsn => write!(f, "vsn"),
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "vsn" => Ok(Self::Vsn),
            other => Err(format!("unknown grouping '{other}', expected 'id' or 'vsn'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    #[serde(rename = "reporting")]
    Reporting,
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "dell node")]
    DellNode,
}

impl NodeStatus {
    pub fn from_liveness(expected_online: bool) -> Self {
        if expected_online {
            Self::Reporting
        } else {
            Self::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reporting => "reporting",
            Self::Offline => "offline",
            Self::DellNode => "dell node",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static registration record from the manifest service (`GET /production`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManifestRecord {
    pub node_id: String,
    #[serde(default)]
    pub vsn: String,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lon: Option<f64>,
    #[serde(default)]
    pub top_camera: Option<String>,
    #[serde(default)]
    pub bottom_camera: Option<String>,
    #[serde(default)]
    pub left_camera: Option<String>,
    #[serde(default)]
    pub right_camera: Option<String>,
    #[serde(default)]
    pub shield: Option<bool>,
    #[serde(default)]
    pub modem: Option<bool>,
    #[serde(default)]
    pub modem_sim: Option<String>,
    #[serde(default)]
    pub nx_agent: Option<bool>,
    #[serde(default)]
    pub build_date: Option<String>,
    #[serde(default)]
    pub commission_date: Option<String>,
}

impl ManifestRecord {
    pub fn key(&self, group_by: GroupBy) -> &str {
        match group_by {
            GroupBy::Id => &self.node_id,
            GroupBy::Vsn => &self.vsn,
        }
    }

    pub fn is_dell(&self) -> bool {
        self.node_type.as_deref() == Some("Dell")
    }
}

/// Node snapshot from the state service (`GET /api/state`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateRecord {
    pub id: String,
    #[serde(default)]
    pub vsn: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub beehive: Option<String>,
    #[serde(default)]
    pub internet_connection: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub server_node: Option<String>,
    #[serde(default)]
    pub registration_event: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lon: Option<f64>,
}

/// Liveness flag from the monitoring service (`GET /monitoring`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorEntry {
    pub node_id: String,
    #[serde(default)]
    pub expected_online: bool,
}

/// Manufacturing and sign-off metadata (`GET /factory`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FactoryRecord {
    pub node_id: String,
    #[serde(default)]
    pub vsn: String,
    #[serde(flatten)]
    pub columns: BTreeMap<String, serde_json::Value>,
}

impl FactoryRecord {
    pub const SIGNOFF_COLUMNS: [&'static str; 6] = [
        "Phase 2 Image Sign-off",
        "Phase 2 Audio Sign-off",
        "Phase 2 Sign-off",
        "Phase 3 Image Sign-off",
        "Phase 3 Audio Sign-off",
        "Final Sign-off",
    ];

    /// A sign-off counts when its column holds a truthy value.
    pub fn signed_off(&self, column: &str) -> bool {
        match self.columns.get(column) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(value)) => *value,
            Some(serde_json::Value::Number(value)) => value.as_f64().is_some_and(|n| n != 0.0),
            Some(serde_json::Value::String(value)) => !value.is_empty(),
            Some(_) => true,
        }
    }

    pub fn matches(&self, identifier: &str) -> bool {
        if is_vsn(identifier) {
            self.vsn == identifier
        } else {
            self.node_id == identifier
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OntologyEntry {
    pub ontology: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub unit: String,
}

/// Joined per-node view built from state, manifest, monitor and factory data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    pub vsn: Option<String>,
    pub node_type: Option<String>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub has_static_gps: bool,
    pub top_camera: Option<String>,
    pub bottom_camera: Option<String>,
    pub left_camera: Option<String>,
    pub right_camera: Option<String>,
    pub shield: Option<bool>,
    pub modem: Option<bool>,
    pub modem_sim: Option<String>,
    pub nx_agent: Option<bool>,
    pub build_date: Option<String>,
    pub commission_date: Option<String>,
    /// Milliseconds since the unix epoch.
    pub registration_event: Option<i64>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub altitude: Option<f64>,
    pub beehive: Option<String>,
    pub internet_connection: Option<String>,
    pub mode: Option<String>,
    pub server_node: Option<String>,
    pub timestamp: Option<String>,
    pub expected_online: bool,
    pub status: NodeStatus,
    pub factory: Option<FactoryRecord>,
}

impl NodeRecord {
    /// Record for a node that is only known from its manifest.
    pub fn from_manifest(manifest: &ManifestRecord, status: NodeStatus) -> Self {
        Self {
            id: manifest.node_id.clone(),
            vsn: Some(manifest.vsn.clone()).filter(|vsn| !vsn.is_empty()),
            node_type: manifest.node_type.clone(),
            project: manifest.project.clone(),
            location: manifest.location.clone(),
            gps_lat: manifest.gps_lat,
            gps_lon: manifest.gps_lon,
            has_static_gps: manifest.gps_lat.is_some() && manifest.gps_lon.is_some(),
            top_camera: manifest.top_camera.clone(),
            bottom_camera: manifest.bottom_camera.clone(),
            left_camera: manifest.left_camera.clone(),
            right_camera: manifest.right_camera.clone(),
            shield: manifest.shield,
            modem: manifest.modem,
            modem_sim: manifest.modem_sim.clone(),
            nx_agent: manifest.nx_agent,
            build_date: manifest.build_date.clone(),
            commission_date: manifest.commission_date.clone(),
            registration_event: None,
            name: None,
            address: None,
            altitude: None,
            beehive: None,
            internet_connection: None,
            mode: None,
            server_node: None,
            timestamp: None,
            expected_online: false,
            status,
            factory: None,
        }
    }

    pub fn with_factory(self, factory: Option<FactoryRecord>) -> Self {
        Self { factory, ..self }
    }
}

/// Parses a coordinate-like string. Empty or non-numeric input yields `None`, never `0`.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(text)) => parse_coordinate(&text),
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        _ => None,
    })
}
