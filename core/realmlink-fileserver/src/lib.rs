//! Virtual resources served across realms.
//!
//! The privileged realm owns a [`VirtualResourceStore`] and exposes it
//! through a [`FileServer`]. Sandboxed realms install a
//! [`NetworkInterceptor`] that turns requests under a reserved prefix into
//! `fileRequest` RPCs:
//!
//! | Outcome                         | Response |
//! |---------------------------------|----------|
//! | body found                      | 200      |
//! | not-found marker                | 404      |
//! | no answer before the timeout    | 504      |
//! | messenger failure               | 502      |

mod content_type;
mod error;
mod formatter;
mod inject;
mod interceptor;
mod server;
mod store;

pub use content_type::{ContentType, extension};
pub use error::{StoreError, StoreResult};
pub use formatter::{ContentFormatter, IndentFormatter, NoopFormatter};
pub use inject::{BodyTransform, HtmlInjection, inject_html, inject_html_bytes};
pub use interceptor::{
    InterceptorConfig, NetworkInterceptor, ResourceRequest, ServerAvailability, SyntheticResponse,
};
pub use server::{FileServer, PublishOptions};
pub use store::{PERSISTENCE_PREFIX, VirtualResource, VirtualResourceStore};
