// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块处理器注册表
//!
//! 模块元数据中的 `class` 通过注册表映射到一个工厂函数，每个请求都会创建新的处理器实例。
//! 处理器以方法名被调用，方法不存在时返回 `None`，由分发器决定是否视为 404。

use std::{collections::HashMap, fmt};

use serde_json::Value;

use crate::context::ModuleContext;

/// 模块处理器返回的错误，分发器会将其交给顶层处理（500）
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleError {
    message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ModuleError {}

pub type ModuleResult = Result<Value, ModuleError>;

/// 模块处理器
pub trait Module: Send {
    /// 调用名为 `method` 的方法；处理器不提供该方法时返回 `None`
    fn call(&mut self, method: &str, args: &[Value], ctx: &mut ModuleContext) -> Option<ModuleResult>;
}

type Method = Box<dyn FnMut(&[Value], &mut ModuleContext) -> ModuleResult + Send>;

/// 以闭包表的形式实现 `Module`，免去为简单模块单独定义类型
#[derive(Default)]
pub struct MethodTable {
    methods: HashMap<String, Method>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnMut(&[Value], &mut ModuleContext) -> ModuleResult + Send + 'static,
    {
        self.methods.insert(name.to_string(), Box::new(f));
        self
    }
}

impl Module for MethodTable {
    fn call(&mut self, method: &str, args: &[Value], ctx: &mut ModuleContext) -> Option<ModuleResult> {
        self.methods.get_mut(method).map(|f| f(args, ctx))
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// 处理类名到工厂函数的映射
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记处理类，同名的旧登记会被覆盖
    pub fn register<F>(&mut self, class: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(class.to_string(), Box::new(factory));
        self
    }

    pub fn create(&self, class: &str) -> Option<Box<dyn Module>> {
        self.factories.get(class).map(|factory| factory())
    }

    pub fn classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use serde_json::json;

    fn ctx() -> ModuleContext {
        ModuleContext::new("test", ".", json!({}), RequestContext::get("/"))
    }

    #[test]
    fn test_method_table_dispatch() {
        let mut module = MethodTable::new()
            .method("render", |_, _| Ok(json!("hello")))
            .method("sum", |args, _| {
                Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
            });
        let mut ctx = ctx();
        assert_eq!(module.call("render", &[], &mut ctx), Some(Ok(json!("hello"))));
        assert_eq!(
            module.call("sum", &[json!(1), json!(2)], &mut ctx),
            Some(Ok(json!(3)))
        );
        assert_eq!(module.call("missing", &[], &mut ctx), None);
    }

    #[test]
    fn test_method_can_mutate_context() {
        let mut module = MethodTable::new().method("update_context", |_, ctx| {
            ctx.set_var("title", json!("Hi"));
            ctx.response_mut().set_status(201);
            Ok(Value::Null)
        });
        let mut ctx = ctx();
        module.call("update_context", &[], &mut ctx);
        assert_eq!(ctx.var("title"), Some(&json!("Hi")));
        assert_eq!(ctx.response().status(), 201);
    }

    #[test]
    fn test_registry_creates_fresh_instances() {
        let mut registry = Registry::new();
        registry.register("Counter", || {
            let mut count = 0;
            Box::new(MethodTable::new().method("render", move |_, _| {
                count += 1;
                Ok(json!(count))
            }))
        });
        assert_eq!(registry.classes(), vec!["Counter"]);
        assert!(registry.create("Missing").is_none());

        let mut ctx = ctx();
        for _ in 0..2 {
            let mut module = registry.create("Counter").unwrap();
            assert_eq!(module.call("render", &[], &mut ctx), Some(Ok(json!(1))));
        }
    }

    #[test]
    fn test_registry_classes_sorted() {
        let mut registry = Registry::new();
        registry
            .register("B", || Box::new(MethodTable::new()))
            .register("A", || Box::new(MethodTable::new()));
        assert_eq!(registry.classes(), vec!["A", "B"]);
    }
}
