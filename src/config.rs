// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::param::{
    DEFAULT_ACTION_VAR, DEFAULT_ENTRY_SCRIPT, DEFAULT_MODULE, DEFAULT_MODULE_VAR,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_module_root")]
    module_root: String,
    #[serde(default = "default_config_dir")]
    config_dir: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_module_var")]
    module_var: String,
    #[serde(default = "default_action_var")]
    action_var: String,
    // 为空时退回 param::DEFAULT_MODULE
    #[serde(default)]
    default_module: Option<String>,
    #[serde(default = "default_entry_script")]
    entry_script: String,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
}

fn default_module_root() -> String {
    "modules".to_string()
}

fn default_config_dir() -> String {
    "config".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_cache_size() -> usize {
    5
}

fn default_local() -> bool {
    true
}

fn default_module_var() -> String {
    DEFAULT_MODULE_VAR.to_string()
}

fn default_action_var() -> String {
    DEFAULT_ACTION_VAR.to_string()
}

fn default_entry_script() -> String {
    DEFAULT_ENTRY_SCRIPT.to_string()
}

fn default_max_body_size() -> usize {
    1048576 // 1MB
}

impl Config {
    pub fn new() -> Self {
        Self {
            module_root: default_module_root(),
            config_dir: default_config_dir(),
            port: default_port(),
            worker_threads: 0,
            cache_size: default_cache_size(),
            local: default_local(),
            module_var: default_module_var(),
            action_var: default_action_var(),
            default_module: None,
            entry_script: default_entry_script(),
            max_body_size: default_max_body_size(),
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut str_val = String::new();
        let read = File::open(filename).and_then(|mut file| file.read_to_string(&mut str_val));
        if let Err(e) = read {
            error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
            return Config::new().normalized();
        }
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(s: &str) -> Self {
        let raw_config = match toml::from_str::<Config>(s) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用配置缓存，因此该值将被改为5。");
            self.cache_size = default_cache_size();
        }
        if self.module_var.trim().is_empty() {
            warn!("module_var为空，使用默认值{}", DEFAULT_MODULE_VAR);
            self.module_var = default_module_var();
        }
        if self.action_var.trim().is_empty() {
            warn!("action_var为空，使用默认值{}", DEFAULT_ACTION_VAR);
            self.action_var = default_action_var();
        }
        if self.entry_script.trim().is_empty() {
            warn!("entry_script为空，使用默认值{}", DEFAULT_ENTRY_SCRIPT);
            self.entry_script = default_entry_script();
        }
        self
    }

    /// 测试和嵌入场景下直接指定模块根目录
    pub fn with_module_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.module_root = root.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn with_default_module(mut self, module: &str) -> Self {
        self.default_module = Some(module.to_string());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new().normalized()
    }
}

impl Config {
    pub fn module_root(&self) -> PathBuf {
        PathBuf::from(&self.module_root)
    }

    pub fn config_dir(&self) -> PathBuf {
        PathBuf::from(&self.config_dir)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn module_var(&self) -> &str {
        &self.module_var
    }

    pub fn action_var(&self) -> &str {
        &self.action_var
    }

    /// 配置中的默认模块，未配置或为空时为 `index`
    pub fn default_module(&self) -> &str {
        match &self.default_module {
            Some(m) if !m.trim().is_empty() => m,
            _ => DEFAULT_MODULE,
        }
    }

    pub fn entry_script(&self) -> &str {
        &self.entry_script
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}
