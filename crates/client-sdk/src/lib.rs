//! Async client for the node manifest, state, monitoring and factory services,
//! plus the joined per-node view built from them.

mod config;
mod error;
mod http;
mod snapshot;

use common::{
    FactoryRecord, GroupBy, ManifestRecord, MonitorEntry, NodeRecord, OntologyEntry,
    StateRecord, is_node_id, is_vsn,
};
use join_core::{FactoryIndex, JoinPolicy, ManifestIndex, MonitorIndex};
use serde::Deserialize;

pub use config::{BeekeeperConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{Error, Result};
pub use http::JsonHttp;
pub use snapshot::{NodeSnapshot, SnapshotCache};

#[derive(Debug, Deserialize)]
struct StateEnvelope<T> {
    data: T,
}

#[derive(Debug, Clone)]
pub struct BeekeeperClient {
    http: JsonHttp,
    config: BeekeeperConfig,
}

impl BeekeeperClient {
    pub fn new(config: BeekeeperConfig) -> Result<Self> {
        Ok(Self {
            http: JsonHttp::new(&config)?,
            config,
        })
    }

    pub fn config(&self) -> &BeekeeperConfig {
        &self.config
    }

    pub fn join_policy(&self) -> JoinPolicy {
        JoinPolicy {
            filter_to_monitored: self.config.filter_nodes,
            ..JoinPolicy::default()
        }
    }

    /// All manifests keyed by node id or VSN. GPS strings arrive already parsed.
    pub async fn fetch_manifest_index(&self, group_by: GroupBy) -> Result<ManifestIndex> {
        let records: Vec<ManifestRecord> = self.http.get_json(&["production"]).await?;
        tracing::debug!(count = records.len(), %group_by, "fetched manifests");
        Ok(join_core::index_manifests(records, group_by))
    }

    /// Looks up one node's manifest and attaches its factory record when available.
    ///
    /// Accepts a 16-character node id, or a 4-character VSN when grouping by VSN.
    /// Manifest, monitoring and factory data are fetched concurrently. Only the
    /// manifest is required: without monitoring the status falls back to the
    /// joined view's default, and without factory data `factory` stays empty.
    pub async fn fetch_node(
        &self,
        identifier: &str,
        group_by: GroupBy,
    ) -> Result<Option<NodeRecord>> {
        if !(is_node_id(identifier) || (is_vsn(identifier) && group_by == GroupBy::Vsn)) {
            return Err(Error::InvalidArgument(format!(
                "must supply groupBy=vsn for short identifiers \
                 (got '{identifier}' with groupBy={group_by})"
            )));
        }

        let (index, monitor, factory) = tokio::join!(
            self.fetch_manifest_index(group_by),
            self.fetch_monitor_index(),
            self.fetch_factory(identifier),
        );

        let index = index?;
        let Some(manifest) = index.get(identifier) else {
            return Ok(None);
        };

        let monitor = monitor
            .inspect_err(|err| {
                tracing::warn!(
                    error = %err,
                    %identifier,
                    "monitor lookup failed; liveness unknown"
                );
            })
            .ok();
        let factory = factory
            .inspect_err(|err| {
                tracing::warn!(
                    error = %err,
                    %identifier,
                    "factory lookup failed; continuing without it"
                );
            })
            .ok()
            .flatten();

        let liveness = monitor
            .as_ref()
            .and_then(|index| index.get(&manifest.node_id));
        Ok(Some(
            join_core::manifest_node(manifest, liveness).with_factory(factory),
        ))
    }

    /// Joined per-node view using the configured node filter.
    pub async fn fetch_joined_state(&self) -> Result<Vec<NodeRecord>> {
        self.fetch_joined_state_with(&self.join_policy()).await
    }

    pub async fn fetch_joined_state_with(&self, policy: &JoinPolicy) -> Result<Vec<NodeRecord>> {
        let (states, manifests, monitor) = tokio::try_join!(
            self.fetch_states(),
            self.fetch_manifest_index(GroupBy::Id),
            self.fetch_monitor_index(),
        )?;

        let joined = join_core::join_node_state(&states, &manifests, Some(&monitor), policy);
        tracing::info!(
            states = states.len(),
            manifests = manifests.len(),
            monitored = monitor.len(),
            joined = joined.len(),
            "joined node state"
        );
        Ok(joined)
    }

    /// Every state entry joined with its manifest, liveness and factory record.
    ///
    /// Unlike [`Self::fetch_joined_state`] this keeps unmonitored nodes and adds
    /// no Dell backfill. The factory fetch runs alongside the others but its
    /// failure only drops the factory data.
    pub async fn fetch_joined_state_with_factory(&self) -> Result<Vec<NodeRecord>> {
        let policy = JoinPolicy::unfiltered();
        let (required, factory) = tokio::join!(
            async {
                tokio::try_join!(
                    self.fetch_states(),
                    self.fetch_manifest_index(GroupBy::Id),
                    self.fetch_monitor_index(),
                )
            },
            self.fetch_factory_index(GroupBy::Id),
        );
        let (states, manifests, monitor) = required?;

        let joined = join_core::join_node_state(&states, &manifests, Some(&monitor), &policy);
        match factory {
            Ok(factory) => Ok(join_core::attach_factory(joined, &factory)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "factory index unavailable; returning nodes without it"
                );
                Ok(joined)
            }
        }
    }

    pub async fn fetch_states(&self) -> Result<Vec<StateRecord>> {
        let envelope: StateEnvelope<Vec<StateRecord>> =
            self.http.get_json(&["api", "state"]).await?;
        Ok(envelope.data)
    }

    pub async fn fetch_state(&self, id: &str) -> Result<StateRecord> {
        let envelope: StateEnvelope<StateRecord> =
            self.http.get_json(&["api", "state", id]).await?;
        Ok(envelope.data)
    }

    pub async fn fetch_monitor_index(&self) -> Result<MonitorIndex> {
        let entries: Vec<MonitorEntry> = self.http.get_json(&["monitoring"]).await?;
        Ok(join_core::index_monitor(entries))
    }

    pub async fn fetch_factory_index(&self, group_by: GroupBy) -> Result<FactoryIndex> {
        let records: Vec<FactoryRecord> = self.http.get_json(&["factory"]).await?;
        Ok(join_core::index_factory(records, group_by))
    }

    /// A 4-character identifier matches on VSN, anything else on node id.
    pub async fn fetch_factory(&self, identifier: &str) -> Result<Option<FactoryRecord>> {
        let records: Vec<FactoryRecord> = self.http.get_json(&["factory"]).await?;
        Ok(records.into_iter().find(|record| record.matches(identifier)))
    }

    pub async fn fetch_ontology_list(&self) -> Result<Vec<OntologyEntry>> {
        self.http.get_json(&["ontology"]).await
    }

    pub async fn fetch_ontology(&self, name: &str) -> Result<Option<OntologyEntry>> {
        Ok(self
            .fetch_ontology_list()
            .await?
            .into_iter()
            .find(|entry| entry.ontology == name))
    }
}
