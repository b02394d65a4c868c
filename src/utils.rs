/// Virtual path utility functions / 虚拟路径工具函数

/// Clean and normalize path / 清理和规范化路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Ensure path starts with / / 确保路径以 / 开头
/// 3. Clean . and .. in path (never climbs above /) / 清理路径中的 . 和 ..
pub fn fix_and_clean_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };

    clean_path(&path)
}

/// Clean path, handle ., .. and duplicate / / 清理路径，处理 . 和 .. 和重复的 /
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Segments of a normalized path / 路径分段
pub fn segments(path: &str) -> Vec<String> {
    fix_and_clean_path(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join a relative path onto a base / 拼接路径
pub fn join(base: &str, path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        return fix_and_clean_path(&path);
    }
    fix_and_clean_path(&format!("{}/{}", base.trim_end_matches('/'), path))
}

/// Split into (parent, name) / 拆分为父目录和名称
/// `/` splits into (`/`, ``).
pub fn split(path: &str) -> (String, String) {
    let path = fix_and_clean_path(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Last segment of a path / 路径最后一段
pub fn basename(path: &str) -> String {
    split(path).1
}

/// Parse a boolean query/config flag / 解析布尔参数
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
