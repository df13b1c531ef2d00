//! Request instrumentation: middleware, response interceptor and the
//! byte-counting stream handed out on protocol upgrade.

pub mod endpoint;
pub mod interceptor;
pub mod layer;
pub mod stream;

pub use endpoint::{EndpointResolver, NamespacedNameResolver};
pub use interceptor::{ResponseInterceptor, UpgradedStream};
pub use layer::{MetricsLayer, MetricsService};
pub use stream::MeteredStream;
