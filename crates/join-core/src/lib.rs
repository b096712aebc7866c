//! Synchronous merge of node state, manifest, monitor and factory data.
//!
//! Everything here works on already-decoded records; fetching lives in `client-sdk`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime};
use common::{
    FactoryRecord, GroupBy, ManifestRecord, MonitorEntry, NodeRecord, NodeStatus, StateRecord,
    is_node_id,
};
use indexmap::IndexMap;

/// Manifests in `/production` order.
pub type ManifestIndex = IndexMap<String, ManifestRecord>;
pub type MonitorIndex = BTreeMap<String, MonitorEntry>;
pub type FactoryIndex = BTreeMap<String, FactoryRecord>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPolicy {
    /// Drop state entries the monitoring service does not know about
    /// (test benches, laptop registrations, placeholder ids).
    pub filter_to_monitored: bool,
    /// Append manifest-only Dell nodes after the state-derived records.
    pub backfill_dell: bool,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            filter_to_monitored: true,
            backfill_dell: true,
        }
    }
}

impl JoinPolicy {
    /// Every state entry, no Dell backfill.
    pub fn unfiltered() -> Self {
        Self {
            filter_to_monitored: false,
            backfill_dell: false,
        }
    }
}

/// Indexes manifests by the requested key, keeping first-seen key order.
/// A later duplicate key replaces the earlier value in place.
pub fn index_manifests(
    records: impl IntoIterator<Item = ManifestRecord>,
    group_by: GroupBy,
) -> ManifestIndex {
    records
        .into_iter()
        .map(|record| (record.key(group_by).to_string(), record))
        .collect()
}

pub fn index_monitor(entries: impl IntoIterator<Item = MonitorEntry>) -> MonitorIndex {
    entries
        .into_iter()
        .map(|entry| (entry.node_id.clone(), entry))
        .collect()
}

pub fn index_factory(
    records: impl IntoIterator<Item = FactoryRecord>,
    group_by: GroupBy,
) -> FactoryIndex {
    records
        .into_iter()
        .map(|record| {
            let key = match group_by {
                GroupBy::Id => record.node_id.clone(),
                GroupBy::Vsn => record.vsn.clone(),
            };
            (key, record)
        })
        .collect()
}

/// Merges one state entry with its (optional) manifest and monitor entries.
///
/// The state entry owns identity and the state-only fields. When a manifest is
/// present it owns vsn, classification, hardware and geo fields, including
/// absent values; without one, vsn and geo fall back to the state entry.
pub fn merge_node(
    state: &StateRecord,
    manifest: Option<&ManifestRecord>,
    monitor: Option<&MonitorEntry>,
) -> NodeRecord {
    let expected_online = monitor.is_some_and(|entry| entry.expected_online);
    let status = NodeStatus::from_liveness(expected_online);

    let base = match manifest {
        Some(manifest) => NodeRecord {
            has_static_gps: false,
            ..NodeRecord::from_manifest(manifest, status)
        },
        None => NodeRecord {
            vsn: state.vsn.clone(),
            gps_lat: state.gps_lat,
            gps_lon: state.gps_lon,
            ..NodeRecord::from_manifest(&ManifestRecord::default(), status)
        },
    };

    NodeRecord {
        id: state.id.clone(),
        registration_event: state
            .registration_event
            .as_deref()
            .and_then(parse_timestamp_millis),
        name: state.name.clone(),
        address: state.address.clone(),
        altitude: state.altitude,
        beehive: state.beehive.clone(),
        internet_connection: state.internet_connection.clone(),
        mode: state.mode.clone(),
        server_node: state.server_node.clone(),
        timestamp: state.timestamp.clone(),
        expected_online,
        ..base
    }
}

/// Builds the joined node list.
///
/// `monitor` is `None` when liveness data is unavailable; every node is then
/// offline and the monitored-only filter is skipped.
pub fn join_node_state(
    states: &[StateRecord],
    manifests: &ManifestIndex,
    monitor: Option<&MonitorIndex>,
    policy: &JoinPolicy,
) -> Vec<NodeRecord> {
    let mut joined: Vec<NodeRecord> = states
        .iter()
        .map(|state| {
            merge_node(
                state,
                manifests.get(&state.id),
                monitor.and_then(|index| index.get(&state.id)),
            )
        })
        .collect();

    if let Some(monitor) = monitor.filter(|_| policy.filter_to_monitored) {
        let before = joined.len();
        joined.retain(|node| monitor.contains_key(&node.id));
        tracing::debug!(
            dropped = before - joined.len(),
            "filtered nodes missing from monitoring"
        );
    }

    if policy.backfill_dell {
        joined.extend(dell_backfills(manifests));
    }
    dedup_by_id(joined)
}

/// Dell nodes are registered only in the manifest, so they never carry state
/// or monitor entries.
pub fn dell_backfills(manifests: &ManifestIndex) -> impl Iterator<Item = NodeRecord> + '_ {
    manifests
        .values()
        .filter(|manifest| manifest.is_dell() && is_node_id(&manifest.node_id))
        .map(|manifest| NodeRecord::from_manifest(manifest, NodeStatus::DellNode))
}

/// Record for a single manifest lookup, carrying the same status the joined
/// view would give it.
pub fn manifest_node(manifest: &ManifestRecord, monitor: Option<&MonitorEntry>) -> NodeRecord {
    let Some(entry) = monitor else {
        let status = if manifest.is_dell() {
            NodeStatus::DellNode
        } else {
            NodeStatus::Offline
        };
        return NodeRecord::from_manifest(manifest, status);
    };

    NodeRecord {
        expected_online: entry.expected_online,
        ..NodeRecord::from_manifest(manifest, NodeStatus::from_liveness(entry.expected_online))
    }
}

/// Keeps the first record for each id, preserving order.
pub fn dedup_by_id(records: Vec<NodeRecord>) -> Vec<NodeRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}

/// Attaches factory records looked up by node id.
pub fn attach_factory(records: Vec<NodeRecord>, factory: &FactoryIndex) -> Vec<NodeRecord> {
    records
        .into_iter()
        .map(|record| {
            let matched = factory.get(&record.id).cloned();
            record.with_factory(matched)
        })
        .collect()
}

/// Accepts RFC 2822 (`Sun, 14 Mar 2021 16:58:57 GMT`), RFC 3339, or a naive
/// `YYYY-MM-DD HH:MM:SS` timestamp taken as UTC.
pub fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|parsed| parsed.timestamp_millis())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(|naive| naive.and_utc().timestamp_millis())
                .ok()
        })
}
