// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 服务器自带的处理类，模块元数据中通过 `class` 引用：
//!
//! - `Status`：以 JSON 返回服务器名称、版本、运行时长和已登记的处理类。
//! - `Echo`：演示上下文更新与带参数的动作。

use std::time::Instant;

use serde_json::{json, Value};

use crate::{
    context::ModuleContext,
    param::{CONTENT_TYPE_TEXT, SERVER_NAME},
    registry::{MethodTable, ModuleError, ModuleResult, Registry},
};

pub fn register_builtins(registry: &mut Registry) {
    let started = Instant::now();
    let classes: Vec<String> = ["Echo", "Status"].iter().map(|s| s.to_string()).collect();
    registry
        .register("Status", move || {
            let classes = classes.clone();
            Box::new(MethodTable::new().method("render", move |_, ctx| {
                Ok(status(ctx, started, &classes))
            }))
        })
        .register("Echo", || {
            Box::new(
                MethodTable::new()
                    .method("update_context", |_, ctx| {
                        let greeting = ctx
                            .config("greeting")
                            .and_then(Value::as_str)
                            .unwrap_or("Hello")
                            .to_string();
                        ctx.set_var("greeting", Value::String(greeting));
                        Ok(Value::Null)
                    })
                    .method("echo", |args, _| Ok(json!({ "args": args })))
                    .method("repeat", repeat)
                    .method("render", |_, _| Ok(Value::Null)),
            )
        });
}

fn status(ctx: &ModuleContext, started: Instant, classes: &[String]) -> Value {
    json!({
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "module": ctx.module(),
        "uptime": started.elapsed().as_secs(),
        "classes": classes,
    })
}

// repeat(text, times)
fn repeat(args: &[Value], ctx: &mut ModuleContext) -> ModuleResult {
    let text = args.first().and_then(Value::as_str).unwrap_or("");
    let times = match args.get(1) {
        None | Some(Value::Null) => 1,
        Some(v) => match v.as_u64() {
            Some(n) if n <= 100 => n as usize,
            _ => return Err(ModuleError::new(format!("非法的重复次数：{}", v))),
        },
    };
    ctx.response_mut().set_content_type(CONTENT_TYPE_TEXT);
    Ok(Value::String(text.repeat(times)))
}
