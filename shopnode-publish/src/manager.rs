//! `ShopNode`: one value owning the provisioner, the supervised daemon, and
//! the gateway pool. Collaborators receive it explicitly.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shopnode_core::{Cid, DaemonStatus, InstallMode, NodeConfig, Publication};
use shopnode_daemon::paths::{resolve_data_path, stderr_log_path, stdout_log_path};
use shopnode_daemon::{HttpCoreApi, Located, Provisioner, StartPolicy, Supervisor};
use shopnode_gateway::{GatewayEntry, GatewayPool, LocalNode, NoLocalNode};

use crate::error::PublishError;
use crate::pipeline::{self, Published};

/// Point-in-time view of the node for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub status: DaemonStatus,
    /// Fresh liveness probe result.
    pub running: bool,
    /// The daemon is a child of this process.
    pub owned: bool,
    pub mode: InstallMode,
    pub binary: PathBuf,
    pub installed: bool,
    pub version: Option<String>,
    pub data_path: PathBuf,
    pub api_addr: String,
    pub peer_id: Option<String>,
}

#[derive(Debug)]
pub struct ShopNode {
    home: PathBuf,
    provisioner: Provisioner,
    located: Located,
    custom_binary: bool,
    custom_gateways: Vec<String>,
    supervisor: Supervisor,
    pool: GatewayPool,
}

impl ShopNode {
    /// Node rooted at `home`, searching `PATH` for a system binary.
    pub fn new(home: impl Into<PathBuf>, config: &NodeConfig) -> Result<Self, PublishError> {
        let home = home.into();
        let provisioner = Provisioner::new(&home);
        Self::with_provisioner(home, config, provisioner)
    }

    pub fn with_provisioner(
        home: impl Into<PathBuf>,
        config: &NodeConfig,
        provisioner: Provisioner,
    ) -> Result<Self, PublishError> {
        let home = home.into();
        let provisioner =
            provisioner.with_custom_binary(config.custom_binary().map(Path::to_path_buf));
        let located = provisioner.locate();
        let data_path = config
            .custom_data()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resolve_data_path(&home));
        tracing::debug!(
            binary = %located.path.display(),
            mode = %located.mode,
            data = %data_path.display(),
            "node configured",
        );

        let supervisor = Supervisor::new(&located.path, data_path, config.api_addr())
            .with_log_files(stdout_log_path(&home), stderr_log_path(&home));

        let node = Self {
            home,
            provisioner,
            located,
            custom_binary: config.custom_binary().is_some(),
            custom_gateways: config.gateways.clone(),
            supervisor,
            pool: GatewayPool::new(),
        };
        node.apply_custom_gateways()?;
        Ok(node)
    }

    /// Swap in another pool; configured custom gateways are re-applied.
    pub fn with_pool(mut self, pool: GatewayPool) -> Result<Self, PublishError> {
        self.pool = pool;
        self.apply_custom_gateways()?;
        Ok(self)
    }

    pub fn with_start_policy(mut self, policy: StartPolicy) -> Self {
        self.supervisor = self.supervisor.with_policy(policy);
        self
    }

    fn apply_custom_gateways(&self) -> Result<(), PublishError> {
        for url in &self.custom_gateways {
            self.pool.add_custom_gateway(url)?;
        }
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn located(&self) -> &Located {
        &self.located
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Hand the supervisor to a long-running owner (the foreground runtime).
    pub fn into_supervisor(self) -> Supervisor {
        self.supervisor
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Download the pinned release if the bundled binary is missing.
    ///
    /// System and custom binaries are never downloaded.
    pub fn install(&mut self) -> Result<&Located, PublishError> {
        if self.located.mode == InstallMode::Bundled && !self.custom_binary {
            self.provisioner.ensure_installed(&self.located.path)?;
            if self.located.version.is_none() {
                self.located = self.provisioner.locate();
            }
        }
        Ok(&self.located)
    }

    /// Attach to a running daemon, or install and start one.
    pub fn ensure_started(&mut self) -> Result<(), PublishError> {
        if self.supervisor.is_running() {
            return Ok(());
        }
        if self.supervisor.status() == DaemonStatus::Running {
            tracing::warn!("daemon stopped answering; restarting");
            self.supervisor.stop()?;
        }
        if self.supervisor.attach().is_ok() {
            return Ok(());
        }
        self.install()?;
        self.supervisor.start()?;
        Ok(())
    }

    /// Adopt an already running daemon, if there is one. Never spawns.
    pub fn attach(&mut self) -> bool {
        self.supervisor.attach().is_ok()
    }

    pub fn stop(&mut self) -> Result<(), PublishError> {
        self.supervisor.stop()?;
        Ok(())
    }

    pub fn status(&self) -> NodeStatus {
        let running = self.supervisor.is_running();
        NodeStatus {
            status: self.supervisor.status(),
            running,
            owned: self.supervisor.owns_child(),
            mode: self.located.mode,
            binary: self.located.path.clone(),
            installed: self.located.path.is_file(),
            version: self.located.version.clone(),
            data_path: self.supervisor.data_path().to_path_buf(),
            api_addr: self.supervisor.api_addr().to_string(),
            peer_id: self
                .supervisor
                .handle()
                .filter(|_| running)
                .map(|h| h.identity().peer_id.clone()),
        }
    }

    // -----------------------------------------------------------------------
    // Publication
    // -----------------------------------------------------------------------

    /// Publish the shop whose storefront page is `html_path`.
    ///
    /// The local gateway is only offered when the daemon outlives this value.
    /// A daemon started here is stopped on drop, so a remote gateway is
    /// recorded instead.
    pub fn publish(&mut self, html_path: &Path, shop_path: &Path) -> Result<Published, PublishError> {
        pipeline::shop_dir_of(html_path)?;
        self.ensure_started()?;
        let client = self.supervisor.client()?;
        pipeline::publish(&client, &self.pool, self.gateway_node(), html_path, shop_path)
    }

    fn gateway_node(&self) -> &dyn LocalNode {
        if self.supervisor.owns_child() {
            tracing::debug!("daemon is owned by this process; skipping local gateway");
            &NoLocalNode
        } else {
            &self.supervisor
        }
    }

    pub fn unpublish(&mut self, cid: &Cid) -> Result<(), PublishError> {
        self.ensure_started()?;
        let client = self.supervisor.client()?;
        pipeline::unpublish(&client, cid)
    }

    pub fn inspect(&self, shop_dir: &Path) -> Result<Publication, PublishError> {
        crate::inspector::inspect(shop_dir)
    }

    // -----------------------------------------------------------------------
    // Gateways and core facade
    // -----------------------------------------------------------------------

    /// Returns `true` if the pool grew.
    pub fn add_custom_gateway(&self, url: &str) -> Result<bool, PublishError> {
        Ok(self.pool.add_custom_gateway(url)?)
    }

    /// Probe every gateway and return the pool.
    pub fn gateways(&self) -> Vec<GatewayEntry> {
        self.pool.refresh(&self.supervisor)
    }

    pub fn core_api(&mut self) -> Result<HttpCoreApi, PublishError> {
        self.ensure_started()?;
        Ok(HttpCoreApi::new(self.supervisor.client()?))
    }
}
