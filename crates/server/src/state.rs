use std::sync::Arc;

use services::services::{
    chatbot::{ChatClient, ChatError},
    cluster::{Cluster, ClusterSettings},
    layouts::LayoutStore,
    requests::{RequestError, RequestRouter, RequestSettings},
    venv::VenvService,
};
use thiserror::Error;
use utils::process::ProcessRunner;

use crate::config::DashboardConfig;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Requests(#[from] RequestError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DashboardConfig,
    cluster: Cluster,
    layouts: LayoutStore,
    venvs: VenvService,
    requests: RequestRouter,
    chat: Option<ChatClient>,
}

impl AppState {
    pub fn new(mut config: DashboardConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self, StateError> {
        let cluster = Cluster::new(
            runner,
            ClusterSettings {
                tool_dir: config.tool_dir.clone(),
                timeout: config.command_timeout,
                fanout_limit: config.fanout_limit,
            },
        );
        let requests = RequestRouter::new(
            cluster.clone(),
            RequestSettings {
                user: config.user.clone(),
                cluster_name: config.cluster_name.clone(),
                help_email: config.help_email.clone(),
                request_email: config.request_email.clone(),
                hprcbot_route: config.hprcbot_route.clone(),
                log_dir: config.request_log_dir.clone(),
                sendmail: config.sendmail.clone(),
            },
        )?;
        let chat = config.chat.take().map(ChatClient::new).transpose()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                layouts: LayoutStore::new(config.layout_dir.clone()),
                venvs: VenvService::new(cluster.clone(), config.scratch.clone()),
                cluster,
                requests,
                chat,
                config,
            }),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    pub fn cluster(&self) -> &Cluster {
        &self.inner.cluster
    }

    pub fn layouts(&self) -> &LayoutStore {
        &self.inner.layouts
    }

    pub fn venvs(&self) -> &VenvService {
        &self.inner.venvs
    }

    pub fn requests(&self) -> &RequestRouter {
        &self.inner.requests
    }

    /// `None` when no chat credentials were configured.
    pub fn chat(&self) -> Option<&ChatClient> {
        self.inner.chat.as_ref()
    }
}
