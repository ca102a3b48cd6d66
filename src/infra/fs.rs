//! 文件系统工具

use anyhow::Context;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 列出目录下所有文件（相对路径，使用 `/` 分隔，已排序）
pub fn list_files(root: &Path) -> anyhow::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} escapes {}", entry.path().display(), root.display()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

/// 解析为绝对路径
///
/// 最近的已存在祖先目录会被 canonicalize，不存在的部分原样拼接
fn resolve_path(path: &Path) -> anyhow::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to read current directory")?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(missing.into_iter().rev());
    Ok(resolved)
}

/// 递归复制目录，返回复制的文件数
///
/// 目标目录不存在时自动创建，已存在的同名文件会被覆盖。
/// 目标位于源目录内部时跳过目标子树
pub fn copy_tree(src: &Path, dest: &Path) -> anyhow::Result<usize> {
    let src = resolve_path(src)?;
    let dest = resolve_path(dest)?;
    if src.starts_with(&dest) {
        anyhow::bail!("cannot copy {} into {}", src.display(), dest.display());
    }
    std::fs::create_dir_all(&dest).with_context(|| format!("failed to create {}", dest.display()))?;

    let mut copied = 0;
    let walker = WalkDir::new(&src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(&dest));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let relative = entry.path().strip_prefix(&src)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("failed to copy {} to {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
