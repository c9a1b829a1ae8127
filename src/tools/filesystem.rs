//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径必须落在 root 下（禁止 ../ 与绝对路径逃逸）；
//! read_file / write_file / list_directory 基于 SafeFs，供报告草稿、笔记等中间产物使用。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，校验路径在根下
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    /// 根目录不存在时创建
    pub fn new(root_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root_dir.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root_dir: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法规整相对路径；.. 越过根或绝对路径视为逃逸
    fn normalize(&self, path: &str) -> Result<PathBuf, AgentError> {
        let mut out = PathBuf::new();
        for comp in Path::new(path.trim()).components() {
            match comp {
                Component::CurDir => {}
                Component::Normal(p) => out.push(p),
                Component::ParentDir => {
                    if !out.pop() {
                        return Err(AgentError::PathEscape(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AgentError::PathEscape(path.to_string()));
                }
            }
        }
        Ok(self.root_dir.join(out))
    }

    /// 解析已存在的路径（跟随符号链接后仍须在根下）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let full = self.normalize(path)?;
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    /// 写入（覆盖或追加）；自动创建父目录
    pub fn write_file(&self, path: &str, content: &str, append: bool) -> Result<PathBuf, AgentError> {
        let target = self.normalize(path)?;
        if target == self.root_dir {
            return Err(AgentError::ToolExecutionFailed("Missing file path".to_string()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Create dir failed: {}", e)))?;
            let parent = parent
                .canonicalize()
                .map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            if !parent.starts_with(&self.root_dir) {
                return Err(AgentError::PathEscape(path.to_string()));
            }
        }
        let result = if append {
            use std::io::Write;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .and_then(|mut f| f.write_all(content.as_bytes()))
        } else {
            std::fs::write(&target, content)
        };
        result.map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        Ok(target)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.trim().is_empty() || path.trim() == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            entries.push(format!("{}{}", name, suffix));
        }
        entries.sort();
        Ok(entries)
    }
}

fn path_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn path_schema(extra: Value, required: &[&str]) -> Value {
    let mut props = json!({
        "file_path": { "type": "string", "description": "Path relative to the sandbox directory" }
    });
    if let (Some(p), Some(e)) = (props.as_object_mut(), extra.as_object()) {
        p.extend(e.clone());
    }
    json!({ "type": "object", "properties": props, "required": required })
}

pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox directory."
    }

    fn parameters_schema(&self) -> Value {
        path_schema(json!({}), &["file_path"])
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, "file_path");
        tracing::info!(path = %path, "read_file");
        self.fs.read_file(path).map_err(|e| e.to_string())
    }
}

pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the sandbox directory (set append=true to append)."
    }

    fn parameters_schema(&self) -> Value {
        path_schema(
            json!({
                "text": { "type": "string", "description": "Text to write" },
                "append": { "type": "boolean", "description": "Append instead of overwrite" }
            }),
            &["file_path", "text"],
        )
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, "file_path");
        let text = path_arg(&args, "text");
        let append = args.get("append").and_then(|v| v.as_bool()).unwrap_or(false);
        tracing::info!(path = %path, chars = text.len(), append, "write_file");
        self.fs
            .write_file(path, text, append)
            .map(|_| format!("File written successfully to {}.", path))
            .map_err(|e| e.to_string())
    }
}

pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files in a sandbox directory (default: the sandbox root)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir_path": { "type": "string", "description": "Directory relative to the sandbox, default '.'" }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, "dir_path");
        tracing::info!(path = %path, "list_directory");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        if entries.is_empty() {
            Ok("No files found in directory".to_string())
        } else {
            Ok(entries.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path().join("sandbox")).unwrap();
        fs.write_file("notes/draft.md", "# Draft\n", false).unwrap();
        fs.write_file("notes/draft.md", "more\n", true).unwrap();
        assert_eq!(fs.read_file("./notes/draft.md").unwrap(), "# Draft\nmore\n");
        assert_eq!(fs.list_dir(".").unwrap(), vec!["notes/"]);
        assert_eq!(fs.list_dir("notes").unwrap(), vec!["draft.md"]);
    }

    #[test]
    fn test_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path().join("sandbox")).unwrap();
        assert!(matches!(fs.write_file("../outside.txt", "x", false), Err(AgentError::PathEscape(_))));
        assert!(matches!(fs.read_file("/etc/passwd"), Err(AgentError::PathEscape(_))));
        assert!(matches!(fs.read_file("a/../../x"), Err(AgentError::PathEscape(_))));
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_tools_report_errors_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path()).unwrap();
        let list = ListDirectoryTool::new(fs.clone());
        assert_eq!(list.execute(json!({})).await.unwrap(), "No files found in directory");

        let write = WriteFileTool::new(fs.clone());
        let out = write.execute(json!({"file_path": "r.md", "text": "hi"})).await.unwrap();
        assert!(out.contains("r.md"));

        let read = ReadFileTool::new(fs);
        assert_eq!(read.execute(json!({"file_path": "r.md"})).await.unwrap(), "hi");
        let err = read.execute(json!({"file_path": "missing.md"})).await.unwrap_err();
        assert!(err.contains("Path not found"));
    }
}
