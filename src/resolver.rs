// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 配置解析模块
//!
//! 根据点分隔的配置名在目录中探测配置文件，并将其解析为统一的 `ConfigValue` 树。
//!
//! 探测顺序由 [`CONFIG_EXTENSIONS`] 决定：`json`、`toml`、`xml`、`ini`，先找到者优先。
//! 解析失败与文件不存在是两种不同的错误，名称非法则是第三种，调用方可以据此区分处理。

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use ini::Ini;
use log::{debug, warn};
use quick_xml::{
    events::{BytesStart, Event},
    reader::Reader,
};
use serde_json::{Map, Value};

use crate::{cache::ConfigCache, param::CONFIG_EXTENSIONS};

/// 解析后的配置内容
pub type ConfigValue = Value;

/// 配置解析过程中的错误
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// 配置名为空，或包含会逃逸出目录的片段
    InvalidName(String),
    /// 四种扩展名下都没有找到对应文件
    NotFound(String),
    /// 找到了文件但解析失败
    Parse { path: String, message: String },
    /// 找到了文件但无法读取
    Io { path: String, message: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InvalidName(name) => write!(f, "invalid config name '{}'", name),
            ResolveError::NotFound(name) => write!(f, "config '{}' not found", name),
            ResolveError::Parse { path, message } => {
                write!(f, "failed to parse {}: {}", path, message)
            }
            ResolveError::Io { path, message } => write!(f, "failed to read {}: {}", path, message),
        }
    }
}

/// 支持的配置文件格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Xml,
    Ini,
}

impl ConfigFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            "xml" => Some(ConfigFormat::Xml),
            "ini" => Some(ConfigFormat::Ini),
            _ => None,
        }
    }

    pub fn parse(&self, content: &str) -> Result<ConfigValue, String> {
        match self {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str::<Value>(content).map_err(|e| e.to_string()),
            ConfigFormat::Xml => parse_xml(content),
            ConfigFormat::Ini => parse_ini(content),
        }
    }
}

/// 带缓存的配置解析器，`dir` 缺省时在 `base_dir` 下查找
pub struct Resolver {
    base_dir: PathBuf,
    cache: Mutex<ConfigCache>,
}

impl Resolver {
    pub fn new<P: AsRef<Path>>(base_dir: P, cache_size: usize) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            cache: Mutex::new(ConfigCache::from_capacity(cache_size)),
        }
    }

    pub fn resolve(&self, name: &str, dir: Option<&Path>) -> Result<ConfigValue, ResolveError> {
        let dir = dir.unwrap_or(&self.base_dir);
        let (path, format) = locate(name, dir)?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| io_error(&path, e))?;

        {
            let mut cache = match self.cache.lock() {
                Ok(lock) => lock,
                Err(poisoned) => {
                    warn!("配置缓存锁被污染，恢复并继续");
                    poisoned.into_inner()
                }
            };
            if let Some(value) = cache.find(&path, modified) {
                debug!("配置缓存命中：{}", path.display());
                return Ok(value.clone());
            }
        }

        let value = read_and_parse(&path, format)?;
        let mut cache = match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.push(&path, value.clone(), modified);
        Ok(value)
    }
}

/// 不经过缓存，直接解析 `dir` 下名为 `name` 的配置
pub fn resolve(name: &str, dir: &Path) -> Result<ConfigValue, ResolveError> {
    let (path, format) = locate(name, dir)?;
    read_and_parse(&path, format)
}

/// 按扩展名顺序探测配置文件，返回第一个存在的文件及其格式
pub fn locate(name: &str, dir: &Path) -> Result<(PathBuf, ConfigFormat), ResolveError> {
    let relative = name_to_relative_path(name)?;
    let stem = dir.join(relative);
    for extension in CONFIG_EXTENSIONS {
        let mut candidate = stem.clone().into_os_string();
        candidate.push(".");
        candidate.push(extension);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            debug!("配置{}解析为文件{}", name, candidate.display());
            if let Some(format) = ConfigFormat::from_extension(extension) {
                return Ok((candidate, format));
            }
        }
    }
    Err(ResolveError::NotFound(name.to_string()))
}

/// 将 `a.b.c` 转换为 `a/b/c`，拒绝空片段和路径分隔符
fn name_to_relative_path(name: &str) -> Result<PathBuf, ResolveError> {
    let name_trimmed = name.trim();
    if name_trimmed.is_empty() {
        return Err(ResolveError::InvalidName(name.to_string()));
    }
    let mut path = PathBuf::new();
    for segment in name_trimmed.split('.') {
        if segment.is_empty() || segment.contains(['/', '\\', '\0']) {
            return Err(ResolveError::InvalidName(name.to_string()));
        }
        path.push(segment);
    }
    Ok(path)
}

fn read_and_parse(path: &Path, format: ConfigFormat) -> Result<ConfigValue, ResolveError> {
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    format.parse(&content).map_err(|message| ResolveError::Parse {
        path: path.display().to_string(),
        message,
    })
}

fn io_error(path: &Path, e: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// 按点分隔的键在嵌套配置中查找，数组可以用数字下标，空键返回整个值
pub fn lookup<'a>(value: &'a ConfigValue, key: &str) -> Option<&'a ConfigValue> {
    if key.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for part in key.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

struct XmlNode {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl XmlNode {
    fn open(e: &BytesStart) -> Result<Self, String> {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let mut children = Map::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            children.insert(key, Value::String(value.to_string()));
        }
        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            return Value::String(self.text);
        }
        let mut children = self.children;
        if !self.text.is_empty() {
            children.insert("#text".to_string(), Value::String(self.text));
        }
        Value::Object(children)
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<Value>, node: XmlNode) -> Result<(), String> {
    let name = node.name.clone();
    let value = node.into_value();
    match stack.last_mut() {
        Some(parent) => {
            // 同名兄弟元素合并为数组
            match parent.children.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    parent.children.insert(name, value);
                }
            }
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(format!("存在多个根元素：{}", name));
            }
            *root = Some(value);
            Ok(())
        }
    }
}

fn parse_xml(content: &str) -> Result<ConfigValue, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlNode::open(&e)?),
            Ok(Event::Empty(e)) => {
                let node = XmlNode::open(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| "多余的结束标签".to_string())?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("位置{}：{}", reader.buffer_position(), e)),
        }
    }
    if let Some(node) = stack.last() {
        return Err(format!("元素{}没有闭合", node.name));
    }
    root.ok_or_else(|| "缺少根元素".to_string())
}

fn parse_ini(content: &str) -> Result<ConfigValue, String> {
    let ini = Ini::load_from_str(content).map_err(|e| e.to_string())?;
    let mut root = Map::new();
    for (section, properties) in ini.iter() {
        let mut entries = Map::new();
        for (key, value) in properties.iter() {
            entries.insert(key.to_string(), Value::String(value.to_string()));
        }
        match section {
            None => root.extend(entries),
            Some(name) => {
                root.insert(name.to_string(), Value::Object(entries));
            }
        }
    }
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, content: &str) {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_json() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.json", r#"{"name": "demo", "debug": true}"#);
        let value = resolve("app", dir.path()).unwrap();
        assert_eq!(value, json!({"name": "demo", "debug": true}));
    }

    #[test]
    fn test_dotted_name_maps_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        write(&dir, "db/main.toml", "host = \"localhost\"\nport = 5432\n");
        let value = resolve("db.main", dir.path()).unwrap();
        assert_eq!(value, json!({"host": "localhost", "port": 5432}));
    }

    #[test]
    fn test_first_extension_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.ini", "source = ini\n");
        write(&dir, "app.toml", "source = \"toml\"\n");
        assert_eq!(resolve("app", dir.path()).unwrap(), json!({"source": "toml"}));

        write(&dir, "app.json", r#"{"source": "json"}"#);
        assert_eq!(resolve("app", dir.path()).unwrap(), json!({"source": "json"}));
    }

    #[test]
    fn test_not_found_is_distinct_from_invalid_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve("missing", dir.path()),
            Err(ResolveError::NotFound("missing".to_string()))
        );
        assert_eq!(resolve("", dir.path()), Err(ResolveError::InvalidName("".to_string())));
    }

    #[test]
    fn test_escaping_names_are_invalid() {
        let dir = TempDir::new().unwrap();
        for name in ["a..b", ".a", "a.", "../etc", "a/b", "a\\b", "   "] {
            assert!(
                matches!(resolve(name, dir.path()), Err(ResolveError::InvalidName(_))),
                "{} 应当被判定为非法",
                name
            );
        }
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.json", "{not json");
        match resolve("broken", dir.path()) {
            Err(ResolveError::Parse { path, .. }) => assert!(path.ends_with("broken.json")),
            other => panic!("期望解析错误，得到{:?}", other),
        }
    }

    #[test]
    fn test_xml_mapping() {
        let xml = r#"<?xml version="1.0"?>
            <module>
                <class>Hello</class>
                <render_method/>
                <config lang="en">
                    <title>Hi &amp; welcome</title>
                </config>
                <tag>a</tag>
                <tag>b</tag>
            </module>"#;
        let value = ConfigFormat::Xml.parse(xml).unwrap();
        assert_eq!(
            value,
            json!({
                "class": "Hello",
                "render_method": "",
                "config": {"@lang": "en", "title": "Hi & welcome"},
                "tag": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_xml_unclosed_element() {
        assert!(ConfigFormat::Xml.parse("<module><class>Hello</class>").is_err());
        assert!(ConfigFormat::Xml.parse("").is_err());
    }

    #[test]
    fn test_ini_mapping() {
        let ini = "class = Hello\n\n[config]\ntitle = Greeting\nlimit = 10\n";
        let value = ConfigFormat::Ini.parse(ini).unwrap();
        assert_eq!(
            value,
            json!({"class": "Hello", "config": {"title": "Greeting", "limit": "10"}})
        );
    }

    #[test]
    fn test_lookup() {
        let value = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(lookup(&value, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup(&value, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup(&value, "a.x"), None);
        assert_eq!(lookup(&value, ""), Some(&value));
    }

    #[test]
    fn test_cached_resolver_sees_updates() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.json", r#"{"v": 1}"#);
        let resolver = Resolver::new(dir.path(), 4);
        assert_eq!(resolver.resolve("app", None).unwrap(), json!({"v": 1}));
        assert_eq!(resolver.resolve("app", None).unwrap(), json!({"v": 1}));

        // 修改时间变化后重新解析
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"v": 2}"#).unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert_eq!(resolver.resolve("app", None).unwrap(), json!({"v": 2}));
    }

    #[test]
    fn test_explicit_dir_overrides_base() {
        let base = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        write(&other, "module.ini", "class = X\n");
        let resolver = Resolver::new(base.path(), 2);
        assert!(matches!(
            resolver.resolve("module", None),
            Err(ResolveError::NotFound(_))
        ));
        assert_eq!(
            resolver.resolve("module", Some(other.path())).unwrap(),
            json!({"class": "X"})
        );
    }
}
