use std::path::{Path, PathBuf};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = EmberPath::config_path();                          // ember.toml
/// let shader = EmberPath::resolve(Path::new("shader/bg.spv"));   // <workspace>/shader/bg.spv
/// ```
pub struct EmberPath {}
// 核心路径
impl EmberPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 当前 crate 位于工作区根目录下
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    /// 默认的渲染器配置文件
    pub fn config_path() -> PathBuf {
        Self::workspace_path().join("ember.toml")
    }

    /// 相对路径视为相对于工作区根目录
    pub fn resolve(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Self::workspace_path().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_workspace() {
        let workspace = EmberPath::workspace_path();
        assert!(workspace.join("ember-crate-tools").is_dir());
        assert_eq!(EmberPath::config_path(), workspace.join("ember.toml"));
        assert_eq!(EmberPath::resolve(Path::new("shader/bg.spv")), workspace.join("shader/bg.spv"));
    }

    #[test]
    fn test_absolute_path_unchanged() {
        let absolute = std::env::temp_dir().join("bg.spv");
        assert_eq!(EmberPath::resolve(&absolute), absolute);
    }
}
