pub mod application;
pub mod builtin;
pub mod cache;
pub mod config;
pub mod context;
pub mod exception;
pub mod module;
pub mod param;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod response;
pub mod server;
pub mod view;

pub use application::{Application, Rendered};
pub use cache::ConfigCache;
pub use config::Config;
pub use context::{ModuleContext, RequestContext, ResponseContext};
pub use exception::Exception;
pub use module::{normalize_module_name, ArgSource, ArgSpec, ModuleMeta};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use registry::{MethodTable, Module, ModuleError, ModuleResult, Registry};
pub use request::Request;
pub use resolver::{lookup, ConfigFormat, ConfigValue, ResolveError, Resolver};
pub use response::Response;
pub use view::HtmlBuilder;
