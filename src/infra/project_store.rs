//! 项目存储
//!
//! 发布控制器只通过 `ProjectStore` trait 使用项目；
//! `FsProjectStore` 是基于本地目录的实现

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::project::load_settings;
use crate::domain::project::{BotProject, ProjectLocation};
use crate::error::PublishError;
use crate::infra::fs::{copy_tree, list_files};

/// 目前唯一支持的存储 ID
pub const LOCAL_STORAGE_ID: &str = "default";

/// 项目存储接口
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// 打开项目，同一位置总是返回同一个 ID
    async fn open(&self, location: &ProjectLocation) -> Result<String, PublishError>;

    /// 按 ID 读取项目
    async fn get_by_id(&self, id: &str) -> Result<BotProject, PublishError>;

    /// 另存为新位置并打开，返回新项目 ID
    async fn save_as(
        &self,
        project: &BotProject,
        location: &ProjectLocation,
    ) -> Result<String, PublishError>;
}

#[derive(Default)]
struct OpenProjects {
    /// id -> 规范化后的位置
    by_id: HashMap<String, ProjectLocation>,
    /// 规范化路径 -> id
    by_path: HashMap<PathBuf, String>,
}

/// 本地文件系统项目存储
#[derive(Default)]
pub struct FsProjectStore {
    projects: RwLock<OpenProjects>,
}

impl FsProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_storage(location: &ProjectLocation) -> Result<(), PublishError> {
        if location.storage_id != LOCAL_STORAGE_ID {
            return Err(PublishError::InvalidRequest(format!(
                "unsupported storage '{}'",
                location.storage_id
            )));
        }
        Ok(())
    }

    /// 已打开的项目数量
    pub async fn count(&self) -> usize {
        self.projects.read().await.by_id.len()
    }
}

#[async_trait]
impl ProjectStore for FsProjectStore {
    async fn open(&self, location: &ProjectLocation) -> Result<String, PublishError> {
        Self::check_storage(location)?;

        let path = tokio::fs::canonicalize(&location.path).await.map_err(|_| {
            PublishError::NotFound(format!("Project location '{}'", location.path.display()))
        })?;
        if !path.is_dir() {
            return Err(PublishError::InvalidRequest(format!(
                "project location '{}' is not a directory",
                path.display()
            )));
        }

        let mut projects = self.projects.write().await;
        if let Some(id) = projects.by_path.get(&path) {
            return Ok(id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        projects.by_path.insert(path.clone(), id.clone());
        projects.by_id.insert(
            id.clone(),
            ProjectLocation {
                storage_id: location.storage_id.clone(),
                path: path.clone(),
            },
        );

        info!(project_id = %id, path = %path.display(), "Opened project");
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<BotProject, PublishError> {
        let location = {
            let projects = self.projects.read().await;
            projects
                .by_id
                .get(id)
                .cloned()
                .ok_or_else(|| PublishError::NotFound(format!("Project '{}'", id)))?
        };

        if !location.path.is_dir() {
            return Err(PublishError::NotFound(format!(
                "Project directory '{}'",
                location.path.display()
            )));
        }

        let root = location.path.clone();
        let files = tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?
            .map_err(|e| PublishError::Storage(format!("{:#}", e)))?;

        let settings = load_settings(&location.path).await;
        let name = location
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());

        Ok(BotProject {
            id: id.to_string(),
            name,
            location,
            files,
            settings,
        })
    }

    async fn save_as(
        &self,
        project: &BotProject,
        location: &ProjectLocation,
    ) -> Result<String, PublishError> {
        Self::check_storage(location)?;

        let dest = location.path.clone();
        if dest.exists() {
            let mut entries = tokio::fs::read_dir(&dest)
                .await
                .map_err(|e| PublishError::Storage(e.to_string()))?;
            let occupied = entries
                .next_entry()
                .await
                .map_err(|e| PublishError::Storage(e.to_string()))?
                .is_some();
            if occupied {
                return Err(PublishError::Conflict(format!(
                    "location '{}' already exists and is not empty",
                    dest.display()
                )));
            }
        }

        let src = project.dir().to_path_buf();
        let target = dest.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &target))
            .await
            .map_err(|e| PublishError::Storage(e.to_string()))?
            .map_err(|e| PublishError::Storage(format!("{:#}", e)))?;

        info!(
            project_id = %project.id,
            dest = %dest.display(),
            files = copied,
            "Saved project as new location"
        );

        self.open(location).await
    }
}
