// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块分发器
//!
//! 一次请求的完整分发流程：
//! 1. 根据配置的查询参数名取出模块名，缺省时使用配置的默认模块，再退回 `index`。
//! 2. 规范化模块名，定位模块目录与入口脚本。
//! 3. 读取模块元数据，按需从注册表创建处理器。
//! 4. 调用上下文更新方法，再执行动作（若有），最后渲染。
//!
//! 找不到模块、入口脚本、处理类或方法时返回对应的 404 异常；处理器返回的错误原样上抛。

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    config::Config,
    context::{ModuleContext, RequestContext, ResponseContext},
    exception::Exception,
    module::{is_safe_relative_path, normalize_module_name, ModuleMeta},
    param::{CONTENT_TYPE_HTML, CONTENT_TYPE_JSON, MODULE_META_NAME},
    registry::{Module, Registry},
    resolver::{ConfigValue, ResolveError, Resolver},
    view::render_file,
};

/// 模块渲染的结果
#[derive(Debug, Clone)]
pub struct Rendered {
    response: ResponseContext,
    content_type: String,
    body: String,
}

impl Rendered {
    fn from_value(ctx: ModuleContext, value: Value) -> Result<Self, Exception> {
        let response = ctx.into_response();
        let (default_type, body) = match value {
            Value::String(s) => (CONTENT_TYPE_HTML, s),
            other => (
                CONTENT_TYPE_JSON,
                serde_json::to_string(&other)
                    .map_err(|e| Exception::InvalidMetadata(e.to_string()))?,
            ),
        };
        let content_type = response.content_type().unwrap_or(default_type).to_string();
        Ok(Self {
            response,
            content_type,
            body,
        })
    }

    fn html(ctx: ModuleContext, body: String) -> Self {
        let response = ctx.into_response();
        let content_type = response.content_type().unwrap_or(CONTENT_TYPE_HTML).to_string();
        Self {
            response,
            content_type,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status()
    }

    pub fn response(&self) -> &ResponseContext {
        &self.response
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

pub struct Application {
    config: Config,
    resolver: Resolver,
    registry: Registry,
}

impl Application {
    pub fn new(config: Config, registry: Registry) -> Self {
        let resolver = Resolver::new(config.config_dir(), config.cache_size());
        Self {
            config,
            resolver,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 在全局配置目录下解析配置
    pub fn resolve_config(&self, name: &str) -> Result<ConfigValue, ResolveError> {
        self.resolver.resolve(name, None)
    }

    /// 请求中的原始模块名，未指定时为配置的默认模块
    pub fn raw_module_name(&self, request: &RequestContext) -> String {
        match request.query(self.config.module_var()) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.config.default_module().to_string(),
        }
    }

    /// 规范化模块名并定位模块目录
    pub fn module_dir(&self, raw: &str) -> Result<(String, PathBuf), Exception> {
        let name = normalize_module_name(raw);
        if name.is_empty() {
            return Err(Exception::ModuleNotFound(raw.to_string()));
        }
        let dir = self.config.module_root().join(&name);
        if !dir.is_dir() {
            return Err(Exception::ModuleNotFound(name));
        }
        Ok((name, dir))
    }

    /// 读取模块元数据，元数据文件不存在时视为空
    pub fn load_meta(&self, dir: &Path) -> Result<ModuleMeta, Exception> {
        match self.resolver.resolve(MODULE_META_NAME, Some(dir)) {
            Ok(value) => ModuleMeta::from_value(value),
            Err(ResolveError::NotFound(_)) => Ok(ModuleMeta::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn run(&self, request: RequestContext, id: u128) -> Result<Rendered, Exception> {
        let raw = self.raw_module_name(&request);
        let (name, dir) = self.module_dir(&raw)?;
        debug!("[ID{}]模块{}定位到目录{}", id, name, dir.display());

        let entry = dir.join(self.config.entry_script());
        if !entry.is_file() {
            return Err(Exception::ScriptNotFound(entry.display().to_string()));
        }

        let meta = self.load_meta(&dir)?;
        let mut ctx = ModuleContext::new(&name, &dir, meta.config(), request);
        let view = meta.view().unwrap_or(self.config.entry_script()).to_string();
        ctx.set_var("view", Value::String(view));

        let mut handler: Option<Box<dyn Module>> = match meta.class() {
            Some(class) => match self.registry.create(class) {
                Some(h) => {
                    debug!("[ID{}]创建处理类{}", id, class);
                    Some(h)
                }
                None => return Err(Exception::ClassNotFound(class.to_string())),
            },
            None => None,
        };

        let action = ctx
            .request()
            .query(self.config.action_var())
            .filter(|a| !a.trim().is_empty())
            .or(meta.default_action())
            .map(str::to_string);
        if let Some(action) = &action {
            ctx.set_var("action", Value::String(action.clone()));
        }

        if let Some(handler) = handler.as_mut() {
            if let Some(result) = handler.call(meta.update_context_method(), &[], &mut ctx) {
                result?;
                debug!("[ID{}]已调用{}", id, meta.update_context_method());
            }
        }

        if let Some(action) = action {
            let spec = meta
                .action(&action)
                .ok_or_else(|| Exception::ActionNotFound(action.clone()))?;
            let handler = handler
                .as_mut()
                .ok_or_else(|| Exception::MethodNotFound(spec.method.clone()))?;
            let args = spec
                .args
                .iter()
                .map(|arg| arg.extract(&ctx))
                .collect::<Result<Vec<_>, _>>()?;
            debug!("[ID{}]执行动作{} -> {}({:?})", id, action, spec.method, args);
            let result = handler
                .call(&spec.method, &args, &mut ctx)
                .ok_or_else(|| Exception::MethodNotFound(spec.method.clone()))??;
            if !result.is_null() {
                info!("[ID{}]动作{}直接输出结果", id, action);
                return Rendered::from_value(ctx, result);
            }
        }

        if let Some(handler) = handler.as_mut() {
            let method = meta.render_method();
            let result = handler
                .call(method, &[], &mut ctx)
                .ok_or_else(|| Exception::MethodNotFound(method.to_string()))??;
            if !result.is_null() {
                return Rendered::from_value(ctx, result);
            }
        }
        self.render_view(ctx, id)
    }

    fn render_view(&self, ctx: ModuleContext, id: u128) -> Result<Rendered, Exception> {
        let view = ctx.view().unwrap_or(self.config.entry_script()).to_string();
        if !is_safe_relative_path(&view) {
            warn!("[ID{}]模块{}使用了非法的视图路径：{}", id, ctx.module(), view);
            return Err(Exception::InvalidMetadata(format!("非法的视图路径：{}", view)));
        }
        let path = ctx.dir().join(&view);
        if !path.is_file() {
            return Err(Exception::ScriptNotFound(path.display().to_string()));
        }
        let body = render_file(&path, &ctx.view_data()).map_err(|e| {
            warn!("[ID{}]读取视图{}失败：{}", id, path.display(), e);
            Exception::ScriptNotFound(path.display().to_string())
        })?;
        debug!("[ID{}]视图{}渲染完成", id, path.display());
        Ok(Rendered::html(ctx, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MethodTable, ModuleError, ModuleResult};
    use mockall::mock;
    use serde_json::json;
    use std::{
        fs,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };
    use tempfile::TempDir;

    mock! {
        pub Handler {}
        impl Module for Handler {
            fn call(&mut self, method: &str, args: &[Value], ctx: &mut ModuleContext) -> Option<ModuleResult>;
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn app(root: &TempDir, registry: Registry) -> Application {
        let config = Config::default().with_module_root(root.path());
        Application::new(config, registry)
    }

    #[test]
    fn test_default_module_renders_without_query() {
        let root = TempDir::new().unwrap();
        write(root.path(), "index/view.html", "<h1>{{ module }}</h1>");
        let app = app(&root, Registry::new());

        let rendered = app.run(RequestContext::get("/"), 0).unwrap();
        assert_eq!(rendered.status(), 200);
        assert_eq!(rendered.body(), "<h1>index</h1>");
        assert_eq!(rendered.content_type(), CONTENT_TYPE_HTML);
    }

    #[test]
    fn test_configured_default_module() {
        let root = TempDir::new().unwrap();
        write(root.path(), "home/view.html", "home");
        let config = Config::default()
            .with_module_root(root.path())
            .with_default_module("home");
        let app = Application::new(config, Registry::new());
        assert_eq!(app.run(RequestContext::get("/"), 0).unwrap().body(), "home");
    }

    #[test]
    fn test_module_name_is_normalized() {
        let root = TempDir::new().unwrap();
        write(root.path(), "foo/bar/view.html", "nested");
        let app = app(&root, Registry::new());
        let rendered = app
            .run(RequestContext::get("/?module=%2F%2Ffoo%2F%2Fbar%2F"), 0)
            .unwrap();
        assert_eq!(rendered.body(), "nested");
    }

    #[test]
    fn test_unresolvable_module_is_404_without_render() {
        let root = TempDir::new().unwrap();
        write(root.path(), "index/view.html", "index");
        let created = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let counter = Arc::clone(&created);
        registry.register("Never", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut mock = MockHandler::new();
            mock.expect_call().times(0);
            Box::new(mock)
        });
        let app = app(&root, registry);

        for target in ["/?module=missing", "/?module=..%2F..", "/?module=%3C%3E"] {
            let err = app.run(RequestContext::get(target), 0).unwrap_err();
            assert_eq!(err.status_code(), 404, "{}", target);
        }
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_entry_script_is_404() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("empty")).unwrap();
        let app = app(&root, Registry::new());
        let err = app.run(RequestContext::get("/?module=empty"), 0).unwrap_err();
        assert!(matches!(err, Exception::ScriptNotFound(_)));
    }

    #[test]
    fn test_unregistered_class_is_404() {
        let root = TempDir::new().unwrap();
        write(root.path(), "blog/view.html", "");
        write(root.path(), "blog/module.json", r#"{"class": "Blog"}"#);
        let app = app(&root, Registry::new());
        let err = app.run(RequestContext::get("/?module=blog"), 0).unwrap_err();
        assert_eq!(err, Exception::ClassNotFound("Blog".to_string()));
    }

    #[test]
    fn test_missing_render_method_is_404() {
        let root = TempDir::new().unwrap();
        write(root.path(), "blog/view.html", "");
        write(root.path(), "blog/module.toml", "class = \"Blog\"\nrender_method = \"show\"\n");
        let mut registry = Registry::new();
        registry.register("Blog", || Box::new(MethodTable::new().method("render", |_, _| Ok(json!("x")))));
        let app = app(&root, registry);
        let err = app.run(RequestContext::get("/?module=blog"), 0).unwrap_err();
        assert_eq!(err, Exception::MethodNotFound("show".to_string()));
    }

    #[test]
    fn test_class_render_outputs() {
        let root = TempDir::new().unwrap();
        write(root.path(), "api/view.html", "");
        write(root.path(), "api/module.json", r#"{"class": "Api"}"#);
        let mut registry = Registry::new();
        registry.register("Api", || {
            Box::new(MethodTable::new().method("render", |_, ctx| {
                ctx.response_mut().set_status(201).set_header("X-Api", "1");
                Ok(json!({"ok": true, "module": ctx.module()}))
            }))
        });
        let app = app(&root, registry);
        let rendered = app.run(RequestContext::get("/?module=api"), 0).unwrap();
        assert_eq!(rendered.status(), 201);
        assert_eq!(rendered.content_type(), CONTENT_TYPE_JSON);
        assert_eq!(rendered.response().header("x-api"), Some("1"));
        let body: Value = serde_json::from_str(rendered.body()).unwrap();
        assert_eq!(body, json!({"ok": true, "module": "api"}));
    }

    #[test]
    fn test_null_render_falls_back_to_view_with_vars() {
        let root = TempDir::new().unwrap();
        write(root.path(), "page/view.html", "{{ title }} / {{ config.site }}");
        write(root.path(), "page/module.ini", "class = Page\n[config]\nsite = Demo\n");
        let mut registry = Registry::new();
        registry.register("Page", || {
            Box::new(
                MethodTable::new()
                    .method("update_context", |_, ctx| {
                        ctx.set_var("title", json!("Welcome"));
                        Ok(Value::Null)
                    })
                    .method("render", |_, _| Ok(Value::Null)),
            )
        });
        let app = app(&root, registry);
        let rendered = app.run(RequestContext::get("/?module=page"), 0).unwrap();
        assert_eq!(rendered.body(), "Welcome / Demo");
    }

    #[test]
    fn test_handler_can_switch_view() {
        let root = TempDir::new().unwrap();
        write(root.path(), "page/view.html", "default");
        write(root.path(), "page/alt.html", "alternate");
        write(root.path(), "page/module.json", r#"{"class": "Page"}"#);
        let mut registry = Registry::new();
        registry.register("Page", || {
            Box::new(MethodTable::new().method("render", |_, ctx| {
                ctx.set_var("view", json!("alt.html"));
                Ok(Value::Null)
            }))
        });
        let app = app(&root, registry);
        assert_eq!(app.run(RequestContext::get("/?module=page"), 0).unwrap().body(), "alternate");
    }

    #[test]
    fn test_action_with_arguments() {
        let root = TempDir::new().unwrap();
        write(root.path(), "users/view.html", "list");
        write(
            root.path(),
            "users/module.json",
            r#"{
                "class": "Users",
                "config": {"greeting": "Hello"},
                "actions": {
                    "show": {"method": "show", "args": ["query:id|int", "config:greeting"]}
                }
            }"#,
        );
        let mut registry = Registry::new();
        registry.register("Users", || {
            Box::new(MethodTable::new().method("show", |args, ctx| {
                assert_eq!(ctx.action(), Some("show"));
                Ok(json!(format!("{} #{}", args[1].as_str().unwrap_or(""), args[0])))
            }))
        });
        let app = app(&root, registry);
        let rendered = app
            .run(RequestContext::get("/?module=users&action=show&id=42"), 0)
            .unwrap();
        assert_eq!(rendered.body(), "Hello #42");
    }

    #[test]
    fn test_action_null_result_continues_to_render() {
        let root = TempDir::new().unwrap();
        write(root.path(), "users/view.html", "saved={{ saved }}");
        write(
            root.path(),
            "users/module.toml",
            "class = \"Users\"\ndefault_action = \"save\"\n[actions.save]\nmethod = \"save\"\n",
        );
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let log = Arc::clone(&calls);
        registry.register("Users", move || {
            let log = Arc::clone(&log);
            let mut mock = MockHandler::new();
            mock.expect_call().returning(move |method, _args, ctx| {
                log.lock().unwrap().push(method.to_string());
                match method.to_string().as_str() {
                    "save" => {
                        ctx.set_var("saved", json!(true));
                        Some(Ok(Value::Null))
                    }
                    "render" => Some(Ok(Value::Null)),
                    _ => None,
                }
            });
            Box::new(mock)
        });
        let app = app(&root, registry);
        let rendered = app.run(RequestContext::get("/?module=users"), 0).unwrap();
        assert_eq!(rendered.body(), "saved=true");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["update_context".to_string(), "save".to_string(), "render".to_string()]
        );
    }

    #[test]
    fn test_unknown_action_is_404() {
        let root = TempDir::new().unwrap();
        write(root.path(), "users/view.html", "");
        let app = app(&root, Registry::new());
        let err = app
            .run(RequestContext::get("/?module=users&action=drop"), 0)
            .unwrap_err();
        assert_eq!(err, Exception::ActionNotFound("drop".to_string()));
    }

    #[test]
    fn test_module_error_is_rethrown() {
        let root = TempDir::new().unwrap();
        write(root.path(), "bad/view.html", "");
        write(root.path(), "bad/module.json", r#"{"class": "Bad"}"#);
        let mut registry = Registry::new();
        registry.register("Bad", || {
            Box::new(MethodTable::new().method("render", |_, _| Err(ModuleError::new("数据库不可用"))))
        });
        let app = app(&root, registry);
        let err = app.run(RequestContext::get("/?module=bad"), 0).unwrap_err();
        assert_eq!(err, Exception::Module(ModuleError::new("数据库不可用")));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_broken_metadata_is_500() {
        let root = TempDir::new().unwrap();
        write(root.path(), "broken/view.html", "");
        write(root.path(), "broken/module.json", "{");
        let app = app(&root, Registry::new());
        let err = app.run(RequestContext::get("/?module=broken"), 0).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_xml_metadata_view() {
        let root = TempDir::new().unwrap();
        write(root.path(), "docs/view.html", "entry");
        write(root.path(), "docs/page.html", "page {{ config.lang }}");
        write(
            root.path(),
            "docs/module.xml",
            "<module><view>page.html</view><config><lang>en</lang></config></module>",
        );
        let app = app(&root, Registry::new());
        assert_eq!(app.run(RequestContext::get("/?module=docs"), 0).unwrap().body(), "page en");
    }

    #[test]
    fn test_custom_module_var() {
        let root = TempDir::new().unwrap();
        write(root.path(), "shop/view.html", "shop");
        let config = Config::from_toml_str("module_var = \"m\"").with_module_root(root.path());
        let app = Application::new(config, Registry::new());
        assert_eq!(app.run(RequestContext::get("/?m=shop"), 0).unwrap().body(), "shop");
        // 旧的参数名不再生效，回退到默认模块
        assert!(app.run(RequestContext::get("/?module=shop"), 0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_global_config() {
        let root = TempDir::new().unwrap();
        write(root.path(), "config/site.toml", "name = \"demo\"\n[db]\nport = 5432\n");
        write(root.path(), "config/mail/smtp.ini", "host = localhost\n");
        let config = Config::from_toml_str(&format!(
            "config_dir = '{}'",
            root.path().join("config").display()
        ));
        let app = Application::new(config, Registry::new());

        let site = app.resolve_config("site").unwrap();
        assert_eq!(site["db"]["port"], json!(5432));
        assert_eq!(app.resolve_config("mail.smtp").unwrap(), json!({"host": "localhost"}));
        assert_eq!(
            app.resolve_config("missing"),
            Err(ResolveError::NotFound("missing".to_string()))
        );
        assert!(matches!(app.resolve_config(""), Err(ResolveError::InvalidName(_))));
    }
}
