#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, OnceLock};

    use anyhow::{Context, Result, bail};
    use axum::Router;
    use axum::extract::State;
    use axum::http::{StatusCode, Uri, header};
    use axum::response::{IntoResponse, Response};
    use client_sdk::{BeekeeperClient, BeekeeperConfig, Error, SnapshotCache};
    use common::{GroupBy, NodeStatus};
    use join_core::JoinPolicy;
    use serde_json::json;
    use tokio::process::Command;
    use tokio::task::JoinHandle;

    const NODE_A: &str = "000048B02D15BC7C";
    const NODE_B: &str = "000048B02D15BC7D";
    const NODE_TEST: &str = "000000000001";
    const DELL: &str = "00000000000D3117";

    type Routes = Arc<HashMap<String, (StatusCode, String)>>;

    /// In-process stand-in for the portal services, answering fixed bodies per path.
    struct FakePortal {
        base_url: String,
        task: JoinHandle<()>,
    }

    impl FakePortal {
        async fn start(routes: HashMap<String, (StatusCode, String)>) -> Result<Self> {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .context("failed to bind fake portal")?;
            let addr: SocketAddr = listener.local_addr()?;

            let app = Router::new()
                .fallback(serve_fixture)
                .with_state(Arc::new(routes));
            let task = tokio::spawn(async move {
                let _ = axum::serve(listener, app).await;
            });

            Ok(Self {
                base_url: format!("http://{addr}"),
                task,
            })
        }

        fn client(&self, filter_nodes: bool) -> Result<BeekeeperClient> {
            Ok(BeekeeperClient::new(
                BeekeeperConfig::new(&self.base_url).with_filter_nodes(filter_nodes),
            )?)
        }
    }

    impl Drop for FakePortal {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn serve_fixture(State(routes): State<Routes>, uri: Uri) -> Response {
        match routes.get(uri.path()) {
            Some((status, body)) => (
                *status,
                [(header::CONTENT_TYPE, "application/json")],
                body.clone(),
            )
                .into_response(),
            None => (StatusCode::NOT_FOUND, "no such fixture").into_response(),
        }
    }

    fn ok(body: serde_json::Value) -> (StatusCode, String) {
        (StatusCode::OK, body.to_string())
    }

    fn portal_routes() -> HashMap<String, (StatusCode, String)> {
        let mut routes = HashMap::new();
        routes.insert(
            "/production".to_string(),
            ok(json!([
                {"node_id": NODE_A, "vsn": "W08D", "node_type": "WSN", "project": "SAGE",
                 "location": "Chicago", "gps_lat": "41.87", "gps_lon": "-87.62",
                 "top_camera": "XNV-8081Z", "shield": true, "modem": false},
                {"node_id": NODE_B, "vsn": "W08E", "node_type": "WSN", "project": "SAGE",
                 "gps_lat": "", "gps_lon": ""},
                {"node_id": DELL, "vsn": "D001", "node_type": "Dell", "project": "DAWN",
                 "gps_lat": "40.1", "gps_lon": "-88.2"}
            ])),
        );
        routes.insert(
            "/factory".to_string(),
            ok(json!([
                {"node_id": NODE_A, "vsn": "W08D", "Phase 2 Sign-off": true, "Final Sign-off": ""}
            ])),
        );
        routes.insert(
            "/monitoring".to_string(),
            ok(json!([
                {"node_id": NODE_A, "expected_online": true},
                {"node_id": NODE_B, "expected_online": false},
                {"node_id": "FFFFFFFFFFFFFFFF", "expected_online": true}
            ])),
        );
        routes.insert(
            "/api/state".to_string(),
            ok(json!({"data": [
                {
                    "id": NODE_A,
                    "name": "first",
                    "registration_event": "Sun, 14 Mar 2021 16:58:57 GMT"
                },
                {"id": NODE_B, "name": "second", "gps_lat": "1.5"},
                {"id": NODE_TEST, "name": "laptop"},
                {"id": NODE_A, "name": "duplicate"}
            ]})),
        );
        routes.insert(
            format!("/api/state/{NODE_A}"),
            ok(json!({"data": {"id": NODE_A, "name": "first", "mode": "active"}})),
        );
        routes.insert(
            "/ontology".to_string(),
            ok(json!([
                {"ontology": "env.temperature", "description": "Air temperature",
                 "source": "https://example.org/bme680", "unit": "celsius"},
                {"ontology": "sys.uptime", "description": "Uptime", "source": "", "unit": "seconds"}
            ])),
        );
        routes
    }

    #[tokio::test]
    async fn manifest_index_parses_gps_and_keys_both_ways() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let by_id = client.fetch_manifest_index(GroupBy::Id).await?;
        let by_vsn = client.fetch_manifest_index(GroupBy::Vsn).await?;

        assert_eq!(by_id.len(), 3);
        assert_eq!(by_vsn.len(), 3);
        for record in by_id.values() {
            assert_eq!(by_vsn.get(&record.vsn), Some(record));
        }

        assert_eq!(by_id[NODE_A].gps_lat, Some(41.87));
        assert_eq!(by_id[NODE_B].gps_lat, None);
        assert_eq!(by_id[NODE_B].gps_lon, None);
        Ok(())
    }

    #[tokio::test]
    async fn joined_state_filters_backfills_and_dedups() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let nodes = client.fetch_joined_state().await?;
        let ids: Vec<_> = nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec![NODE_A, NODE_B, DELL]);

        assert_eq!(nodes[0].name.as_deref(), Some("first"));
        assert_eq!(nodes[0].status, NodeStatus::Reporting);
        assert_eq!(nodes[0].vsn.as_deref(), Some("W08D"));
        assert_eq!(nodes[0].registration_event, Some(1_615_741_137_000));

        assert_eq!(nodes[1].status, NodeStatus::Offline);
        assert_eq!(nodes[1].gps_lat, None, "manifest geo wins over state geo");

        assert_eq!(nodes[2].status, NodeStatus::DellNode);
        assert!(nodes[2].has_static_gps);
        Ok(())
    }

    #[tokio::test]
    async fn joined_state_without_filter_keeps_unmonitored_nodes() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(false)?;

        let nodes = client.fetch_joined_state().await?;
        let laptop = nodes
            .iter()
            .find(|node| node.id == NODE_TEST)
            .context("unmonitored node should be kept")?;
        assert_eq!(laptop.status, NodeStatus::Offline);
        assert!(!laptop.expected_online);

        let explicit = client
            .fetch_joined_state_with(&JoinPolicy {
                filter_to_monitored: true,
                ..JoinPolicy::default()
            })
            .await?;
        assert!(explicit.iter().all(|node| node.id != NODE_TEST));
        Ok(())
    }

    #[tokio::test]
    async fn joined_state_with_factory_attaches_records() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let nodes = client.fetch_joined_state_with_factory().await?;
        let node_a = nodes.iter().find(|node| node.id == NODE_A).context("node a")?;
        let factory = node_a.factory.as_ref().context("factory attached")?;
        assert!(factory.signed_off("Phase 2 Sign-off"));
        assert!(!factory.signed_off("Final Sign-off"));

        let mut others = nodes.iter().filter(|node| node.id != NODE_A);
        assert!(others.clone().count() > 0);
        assert!(others.all(|node| node.factory.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn joined_state_with_factory_keeps_every_state_entry() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;

        // The monitored-only filter setting does not apply to this view.
        let nodes = portal.client(true)?.fetch_joined_state_with_factory().await?;
        let ids: Vec<_> = nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec![NODE_A, NODE_B, NODE_TEST]);
        assert!(nodes.iter().all(|node| node.status != NodeStatus::DellNode));
        Ok(())
    }

    #[tokio::test]
    async fn joined_state_with_factory_survives_factory_outage() -> Result<()> {
        let mut routes = portal_routes();
        routes.insert(
            "/factory".to_string(),
            (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        );
        let portal = FakePortal::start(routes).await?;

        let nodes = portal.client(true)?.fetch_joined_state_with_factory().await?;
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|node| node.factory.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn node_lookup_attaches_factory_by_id_and_vsn() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let by_id = client
            .fetch_node(NODE_A, GroupBy::Id)
            .await?
            .context("node by id")?;
        assert_eq!(by_id.vsn.as_deref(), Some("W08D"));
        assert!(by_id.factory.is_some());

        let by_vsn = client
            .fetch_node("W08D", GroupBy::Vsn)
            .await?
            .context("node by vsn")?;
        assert_eq!(by_vsn.id, NODE_A);
        assert!(by_vsn.factory.is_some());

        let without_factory = client
            .fetch_node(NODE_B, GroupBy::Id)
            .await?
            .context("node b")?;
        assert!(without_factory.factory.is_none());

        assert!(client.fetch_node("FFFFFFFFFFFFFFFF", GroupBy::Id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn node_lookup_tolerates_factory_failure() -> Result<()> {
        let mut routes = portal_routes();
        routes.insert(
            "/factory".to_string(),
            (StatusCode::BAD_GATEWAY, String::new()),
        );
        let portal = FakePortal::start(routes).await?;

        let node = portal
            .client(true)?
            .fetch_node(NODE_A, GroupBy::Id)
            .await?
            .context("manifest should still resolve")?;
        assert!(node.factory.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn node_lookup_status_matches_joined_state() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let joined = client.fetch_joined_state().await?;
        assert_eq!(joined.len(), 3);
        for node in &joined {
            let single = client
                .fetch_node(&node.id, GroupBy::Id)
                .await?
                .with_context(|| format!("lookup of {}", node.id))?;
            assert_eq!(single.status, node.status, "{}", node.id);
            assert_eq!(single.expected_online, node.expected_online, "{}", node.id);
        }

        let reporting = client
            .fetch_node(NODE_A, GroupBy::Id)
            .await?
            .context("node a")?;
        assert_eq!(reporting.status, NodeStatus::Reporting);
        assert!(reporting.expected_online);
        Ok(())
    }

    #[tokio::test]
    async fn node_lookup_tolerates_monitoring_failure() -> Result<()> {
        let mut routes = portal_routes();
        routes.insert(
            "/monitoring".to_string(),
            (StatusCode::INTERNAL_SERVER_ERROR, "down".to_string()),
        );
        let portal = FakePortal::start(routes).await?;
        let client = portal.client(true)?;

        let node = client
            .fetch_node(NODE_A, GroupBy::Id)
            .await?
            .context("manifest should still resolve")?;
        assert_eq!(node.status, NodeStatus::Offline);
        assert!(node.factory.is_some());

        let dell = client.fetch_node(DELL, GroupBy::Id).await?.context("dell")?;
        assert_eq!(dell.status, NodeStatus::DellNode);
        Ok(())
    }

    #[tokio::test]
    async fn short_identifier_needs_vsn_grouping() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;

        let err = portal
            .client(true)?
            .fetch_node("AB12", GroupBy::Id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        Ok(())
    }

    #[tokio::test]
    async fn error_status_propagates_with_body() -> Result<()> {
        let mut routes = portal_routes();
        routes.insert(
            "/production".to_string(),
            (StatusCode::SERVICE_UNAVAILABLE, "manifest service down".to_string()),
        );
        let portal = FakePortal::start(routes).await?;
        let client = portal.client(true)?;

        let err = client.fetch_manifest_index(GroupBy::Id).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.to_string().contains("manifest service down"));

        let joined = client.fetch_joined_state().await.unwrap_err();
        assert_eq!(joined.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_monitor_body_fails_the_join() -> Result<()> {
        let mut routes = portal_routes();
        routes.insert(
            "/monitoring".to_string(),
            (StatusCode::OK, "{not json".to_string()),
        );
        let portal = FakePortal::start(routes).await?;

        let err = portal.client(true)?.fetch_joined_state().await.unwrap_err();
        match err {
            Error::Fetch { url, status, message } => {
                assert!(url.ends_with("/monitoring"));
                assert_eq!(status, Some(StatusCode::OK));
                assert!(message.contains("malformed JSON"));
            }
            other => bail!("expected fetch error, got {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn state_and_ontology_lookups() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let client = portal.client(true)?;

        let state = client.fetch_state(NODE_A).await?;
        assert_eq!(state.mode.as_deref(), Some("active"));

        let entries = client.fetch_ontology_list().await?;
        assert_eq!(entries.len(), 2);

        let temperature = client
            .fetch_ontology("env.temperature")
            .await?
            .context("known ontology")?;
        assert_eq!(temperature.unit, "celsius");
        assert!(client.fetch_ontology("env.missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_cache_serves_latest_join() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;
        let cache = SnapshotCache::new(portal.client(true)?);

        assert!(cache.latest().await.is_none());
        let first = cache.latest_or_refresh().await?;
        assert_eq!(first.nodes.len(), 3);

        let second = cache.refresh().await?;
        assert!(second.ticket > first.ticket);
        assert_eq!(cache.latest().await.map(|snapshot| snapshot.ticket), Some(second.ticket));
        Ok(())
    }

    #[tokio::test]
    async fn cli_prints_joined_state_summary() -> Result<()> {
        let portal = FakePortal::start(portal_routes()).await?;

        let output = run_cli(&["--server-url", &portal.base_url, "state", "--summary"]).await?;
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(NODE_A));
        assert!(lines[2].contains("dell node"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_formats_sizes_without_network() -> Result<()> {
        let output = run_cli(&["format-bytes", "1024"]).await?;
        assert_eq!(output.trim(), "1.00 KiB");

        let output = run_cli(&["format-bytes", "--si", "1000"]).await?;
        assert_eq!(output.trim(), "1.00 KB");

        let output = run_cli(&["time-ago", "45000"]).await?;
        assert_eq!(output.trim(), "45 sec ago");
        Ok(())
    }

    async fn run_cli(args: &[&str]) -> Result<String> {
        let output = Command::new(cli_binary()?)
            .args(args)
            .env_remove("BEEKEEPER_URL")
            .env_remove("BEEKEEPER_FILTER_NODES")
            .output()
            .await
            .context("failed to execute beekeeper")?;

        if !output.status.success() {
            bail!(
                "beekeeper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Builds the CLI once per test run and returns its path next to this test binary.
    fn cli_binary() -> Result<PathBuf> {
        static BUILT: OnceLock<std::result::Result<PathBuf, String>> = OnceLock::new();

        BUILT
            .get_or_init(|| {
                // Test executables live in `target/<profile>/deps`.
                let exe = std::env::current_exe().map_err(|err| err.to_string())?;
                let profile_dir = exe
                    .parent()
                    .and_then(Path::parent)
                    .ok_or_else(|| format!("unexpected test binary location {}", exe.display()))?;

                let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());
                let status = std::process::Command::new(cargo)
                    .args(["build", "-p", "cli-client", "--bin", "beekeeper"])
                    .current_dir(env!("CARGO_MANIFEST_DIR"))
                    .status()
                    .map_err(|err| format!("could not spawn cargo: {err}"))?;
                if !status.success() {
                    return Err(format!("building beekeeper failed with {status}"));
                }

                let binary = profile_dir.join(format!("beekeeper{}", std::env::consts::EXE_SUFFIX));
                if binary.is_file() {
                    Ok(binary)
                } else {
                    Err(format!("beekeeper not found at {}", binary.display()))
                }
            })
            .clone()
            .map_err(anyhow::Error::msg)
    }
}
