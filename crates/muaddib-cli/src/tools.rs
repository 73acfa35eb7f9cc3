//! Builds the tool roster handed to the session runner for each message.
//!
//! Only tools with no per-message arc/reply-sender dependency are wired
//! into the default roster: `execute_code`, `web_search`, `visit_webpage`,
//! `oracle`, `generate_image`, `share_artifact`, `edit_artifact`.
//! `make_plan`, the chronicle tools, `quest_*`, and `progress_report` are
//! fully implemented but need the triggering arc (and, for
//! `progress_report`, a live reply sender) that `ToolSetBuilder::build`
//! does not carry — see `DESIGN.md`.

use std::path::PathBuf;
use std::sync::Arc;

use muaddib_agent::tools::artifacts::{ArtifactStore, EditArtifactTool, ShareArtifactTool};
use muaddib_agent::tools::execute_code::ExecuteCodeTool;
use muaddib_agent::tools::generate_image::GenerateImageTool;
use muaddib_agent::tools::oracle::OracleTool;
use muaddib_agent::tools::visit_webpage::VisitWebpageTool;
use muaddib_agent::tools::web_search::WebSearchTool;
use muaddib_agent::tools::Tool;
use muaddib_agent::ToolSetBuilder;
use muaddib_core::config::{ToolsConfig, DEFAULT_MAX_ITERATIONS};
use muaddib_sandbox::TerminalManager;

use crate::providers::{DefaultModelResolver, SharedModelResolver};

pub struct DefaultToolSetBuilder {
    config: ToolsConfig,
    resolver: Arc<DefaultModelResolver>,
    artifacts: Option<Arc<ArtifactStore>>,
    http: reqwest::Client,
    workdir: PathBuf,
}

impl DefaultToolSetBuilder {
    pub fn new(
        config: ToolsConfig,
        resolver: Arc<DefaultModelResolver>,
        artifacts: Option<Arc<ArtifactStore>>,
        workdir: PathBuf,
    ) -> Self {
        Self { config, resolver, artifacts, http: reqwest::Client::new(), workdir }
    }

    fn base_roster(&self) -> Vec<Box<dyn Tool>> {
        let mut tools: Vec<Box<dyn Tool>> = Vec::new();

        tools.push(Box::new(ExecuteCodeTool::new(Arc::new(TerminalManager::new()), self.workdir.clone())));

        let api_key = self.config.jina.as_ref().map(|j| j.api_key.clone());
        tools.push(Box::new(WebSearchTool::new(self.http.clone(), "https://s.jina.ai/", api_key)));

        let mut visit = VisitWebpageTool::new(self.http.clone());
        if let Some(artifacts_cfg) = &self.config.artifacts {
            visit = visit.with_artifacts(artifacts_cfg.url.clone(), PathBuf::from(&artifacts_cfg.path));
        }
        tools.push(Box::new(visit));

        if let Some(store) = &self.artifacts {
            tools.push(Box::new(ShareArtifactTool::new(Arc::clone(store))));
            tools.push(Box::new(EditArtifactTool::new(Arc::clone(store))));
        }

        if let Some(image_gen) = &self.config.image_gen {
            if let Ok(provider) = self.resolver.resolve_provider(&image_gen.model) {
                if let Some(store) = &self.artifacts {
                    tools.push(Box::new(GenerateImageTool::new(provider, image_gen.model.clone(), Arc::clone(store))));
                }
            }
        }

        tools
    }
}

impl ToolSetBuilder for DefaultToolSetBuilder {
    fn build(
        &self,
        allowed_tools: Option<&[String]>,
        _active_quest_id: Option<&str>,
        outer_context: &[serde_json::Value],
    ) -> Vec<Box<dyn Tool>> {
        let mut tools = self.base_roster();

        if let Some(oracle_cfg) = &self.config.oracle {
            let inner_tools = self.base_roster();
            let resolver = Box::new(SharedModelResolver(Arc::clone(&self.resolver)));
            tools.push(Box::new(OracleTool::new(
                resolver,
                oracle_cfg.model.clone(),
                oracle_cfg.prompt.clone(),
                inner_tools,
                DEFAULT_MAX_ITERATIONS,
                outer_context.to_vec(),
            )));
        }

        match allowed_tools {
            Some(allowed) => tools.into_iter().filter(|t| allowed.iter().any(|a| a == t.name())).collect(),
            None => tools,
        }
    }
}
